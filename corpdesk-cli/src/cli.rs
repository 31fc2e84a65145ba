//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "corpdesk")]
#[command(version)]
#[command(about = "Run and administer the Corpdesk backend", long_about = None)]
pub struct Cli {
    /// Env file loaded before reading configuration
    #[arg(long, global = true, default_value = ".env")]
    pub env_file: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve(ServeArgs),

    /// Create the Stripe products, prices, features and portal configuration
    StripeSetup(StripeSetupArgs),
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Override CORPDESK_HOST
    #[arg(long)]
    pub host: Option<String>,

    /// Override CORPDESK_PORT
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Parser, Debug)]
pub struct StripeSetupArgs {
    /// Print what would be created without touching Stripe
    #[arg(long, default_value = "false")]
    pub dry_run: bool,

    /// Allow running against a live-mode key
    #[arg(long, default_value = "false")]
    pub live: bool,

    /// Print the report as JSON
    #[arg(long, default_value = "false")]
    pub json: bool,
}
