//! camera_manager - list cameras and manage their stored credentials

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

use timelapse_capture::cameras::{DEFAULT_CAMERAS_PATH, DEFAULT_CREDENTIALS_PATH};
use timelapse_capture::{CameraRegistry, CredentialStore, Credentials};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Camera registry file.
    #[arg(long, env = "TIMELAPSE_CAMERAS", default_value = DEFAULT_CAMERAS_PATH)]
    cameras: PathBuf,
    /// Credential store file.
    #[arg(long, env = "TIMELAPSE_CREDENTIALS", default_value = DEFAULT_CREDENTIALS_PATH)]
    credentials: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show configured cameras and whether credentials are saved.
    List,
    /// Save credentials for a camera (username and password are read from stdin).
    Save { camera: String },
    /// Delete stored credentials for a camera.
    Delete { camera: String },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    match &args.command {
        Command::List => list(&args),
        Command::Save { camera } => save(&args, camera),
        Command::Delete { camera } => delete(&args, camera),
    }
}

fn list(args: &Args) -> Result<()> {
    let registry = CameraRegistry::load(&args.cameras)?;
    let store = CredentialStore::load(&args.credentials)?;
    if registry.is_empty() {
        println!("no cameras configured in {}", args.cameras.display());
        return Ok(());
    }

    let rows: Vec<[String; 3]> = registry
        .iter()
        .map(|(id, camera)| {
            let address = match camera.port {
                Some(port) => format!("{}:{}", camera.ip, port),
                None => camera.ip.clone(),
            };
            let saved = if store.contains(id) { "Yes" } else { "No" };
            [id.to_string(), address, saved.to_string()]
        })
        .collect();
    print_table(["Camera Name", "IP Address", "Credentials Saved"], &rows);
    Ok(())
}

fn save(args: &Args, camera: &str) -> Result<()> {
    let stdin = std::io::stdin();
    let interactive = stdin.is_terminal();
    let mut lines = stdin.lock().lines();
    eprintln!("Enter credentials for {}:", camera);
    let username = prompt(&mut lines, "Username: ")?;
    let password = read_password(&mut lines, interactive)?;

    let mut store = CredentialStore::load(&args.credentials)?;
    store.set(camera, Credentials { username, password })?;
    store.save(&args.credentials)?;
    println!("Credentials saved for {}", camera);
    Ok(())
}

fn delete(args: &Args, camera: &str) -> Result<()> {
    let mut store = CredentialStore::load(&args.credentials)?;
    if !store.remove(camera) {
        return Err(anyhow!("no credentials stored for {}", camera));
    }
    store.save(&args.credentials)?;
    println!("Credentials deleted for {}", camera);
    Ok(())
}

fn prompt<B: BufRead>(lines: &mut std::io::Lines<B>, label: &str) -> Result<String> {
    eprint!("{}", label);
    std::io::stderr().flush()?;
    let line = lines
        .next()
        .ok_or_else(|| anyhow!("input closed before {}", label.trim_end_matches(": ")))??;
    Ok(line.trim().to_string())
}

/// Terminal input is read without echo; piped input falls back to a plain line.
fn read_password<B: BufRead>(lines: &mut std::io::Lines<B>, interactive: bool) -> Result<String> {
    if interactive {
        return Ok(rpassword::prompt_password("Password: ")?);
    }
    prompt(lines, "Password: ")
}

fn print_table(headers: [&str; 3], rows: &[[String; 3]]) {
    let mut widths = headers.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    let rule = widths
        .iter()
        .map(|w| "-".repeat(w + 2))
        .collect::<Vec<_>>()
        .join("+");
    println!("+{}+", rule);
    println!("{}", format_row(&headers, &widths));
    println!("+{}+", rule);
    for row in rows {
        println!("{}", format_row(row, &widths));
    }
    println!("+{}+", rule);
}

fn format_row<S: AsRef<str>>(cells: &[S; 3], widths: &[usize; 3]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!(" {:<width$} ", cell.as_ref(), width = *width))
        .collect();
    format!("|{}|", padded.join("|"))
}
