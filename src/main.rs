//! authgate - request-time identity gate
//!
//! Validates encrypted bearer credentials in front of an HTTP origin.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use authgate::{
    cli::{Cli, Command, KeysCommand, TokenCommand},
    config::Config,
    gate::Gate,
    keygen,
    material::CertificateMaterial,
    setup_tracing,
    token::{CredentialRequest, issue_credential},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Keys(cmd)) => run_keys_command(&cmd),
        Some(Command::Token(cmd)) => run_token_command(&cmd),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Generate and write the two dual-PEM store records.
fn run_keys_command(cmd: &KeysCommand) -> ExitCode {
    let KeysCommand::Generate {
        out_dir,
        validity_days,
    } = cmd;

    let roles = [("signing", "authgate signing"), ("encryption", "authgate encryption")];
    for (stem, common_name) in roles {
        let material = match keygen::generate_self_signed(common_name, *validity_days) {
            Ok(material) => material,
            Err(e) => {
                eprintln!("❌ Failed to generate {stem} material: {e}");
                return ExitCode::FAILURE;
            }
        };

        let path = out_dir.join(format!("{stem}.pem"));
        if let Err(e) = std::fs::write(&path, material.dual_pem()) {
            eprintln!("❌ Failed to write {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
        println!("✅ {} written", path.display());
    }

    println!("\nUpload each file as one parameter-store record (value = file contents).");
    ExitCode::SUCCESS
}

/// Mint a credential from local dual-PEM files.
fn run_token_command(cmd: &TokenCommand) -> ExitCode {
    let TokenCommand::Issue {
        signing,
        encryption,
        subject,
        email,
        issuer,
        lifetime_secs,
    } = cmd;

    let signing_blob = match std::fs::read_to_string(signing) {
        Ok(blob) => blob,
        Err(e) => {
            eprintln!("❌ Failed to read {}: {e}", signing.display());
            return ExitCode::FAILURE;
        }
    };
    let encryption_blob = match std::fs::read_to_string(encryption) {
        Ok(blob) => blob,
        Err(e) => {
            eprintln!("❌ Failed to read {}: {e}", encryption.display());
            return ExitCode::FAILURE;
        }
    };

    let (signing_material, encryption_material) = match (
        CertificateMaterial::split(&signing_blob),
        CertificateMaterial::split(&encryption_blob),
    ) {
        (Ok(s), Ok(e)) => (s, e),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("❌ Invalid dual-PEM material: {e}");
            return ExitCode::FAILURE;
        }
    };

    let request = CredentialRequest {
        subject,
        email: email.as_deref(),
        issuer,
        lifetime: Duration::from_secs(*lifetime_secs),
    };

    match issue_credential(
        &request,
        &signing_material.private_key_pem,
        &encryption_material.certificate_pem,
    ) {
        Ok(credential) => {
            println!("{credential}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Failed to issue credential: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the gate server
async fn run_server(cli: Cli) -> ExitCode {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        store = %config.store.base_url,
        "Starting authgate"
    );

    let gate = match Gate::new(config) {
        Ok(gate) => gate,
        Err(e) => {
            error!("Failed to create gate: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gate.run().await {
        error!("Gate error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gate shutdown complete");
    ExitCode::SUCCESS
}
