//! Nova Operator - reconciles NovaAPI resources into a running nova-api service

mod config;
mod controller_runner;

use std::sync::Arc;

use clap::Parser;
use kube::{Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nova_common::crd::{KeystoneEndpoint, NovaAPI};

use crate::config::{Cli, Commands, ControllerArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider - aws-lc-rs backs every TLS connection to the API server
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install aws-lc-rs crypto provider: {:?}", e);
        std::process::exit(1);
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if cli.crd {
        for crd in [NovaAPI::crd(), KeystoneEndpoint::crd()] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    let args = match cli.command {
        Some(Commands::Controller(args)) => args,
        None => ControllerArgs::from_env()?,
    };
    run_controller(args).await
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create kube client: {}", e))?;
    let renderer = Arc::new(args.renderer()?);

    tracing::info!(
        field_manager = %args.field_manager,
        templates = ?args.templates_dir,
        "Starting Nova operator controllers"
    );
    controller_runner::build_nova_api_controller(client, &args, renderer).await;
    tracing::info!("Controllers stopped");
    Ok(())
}
