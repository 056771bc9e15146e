//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Request-time identity gate for encrypted bearer credentials
#[derive(Parser, Debug)]
#[command(name = "authgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "AUTHGATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "AUTHGATE_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "AUTHGATE_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "AUTHGATE_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "AUTHGATE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gate server (default)
    Serve,

    /// Certificate material commands
    #[command(subcommand)]
    Keys(KeysCommand),

    /// Credential commands
    #[command(subcommand)]
    Token(TokenCommand),
}

/// Certificate material subcommands
#[derive(Subcommand, Debug)]
pub enum KeysCommand {
    /// Generate the signing and encryption material for the parameter store
    Generate {
        /// Directory to write `signing.pem` and `encryption.pem` to
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Certificate validity in days
        #[arg(long, default_value_t = 365)]
        validity_days: u32,
    },
}

/// Credential subcommands
#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Mint a signed, encrypted credential for local testing
    Issue {
        /// Path to the signing dual-PEM file
        #[arg(long)]
        signing: PathBuf,

        /// Path to the encryption dual-PEM file
        #[arg(long)]
        encryption: PathBuf,

        /// Subject (`sub`) claim
        #[arg(long)]
        subject: String,

        /// Email claim (omitted from the token when not set)
        #[arg(long)]
        email: Option<String>,

        /// Issuer (`iss`) claim
        #[arg(long)]
        issuer: String,

        /// Token lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        lifetime_secs: u64,
    },
}
