//! Corpdesk CLI.
//!
//! Usage:
//!   corpdesk serve --port 8080
//!   corpdesk stripe-setup --dry-run

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing env file is normal in containers.
    match dotenvy::from_filename(&cli.env_file) {
        Ok(path) => print_info(&format!("Loaded {}", path.display())),
        Err(e) if e.not_found() => {}
        Err(e) => return Err(e.into()),
    }

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args).await?,
        Commands::StripeSetup(args) => commands::stripe_setup::run(args).await?,
    }

    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "→".blue(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "!".yellow().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}
