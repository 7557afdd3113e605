use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "adsctl",
    about = "Provision and operate the classifieds backend",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to classifieds.toml
    #[arg(short, long, global = true, default_value = "classifieds.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// Embedded control plane persisted in a local state file
    Local,
    /// The AWS account of the ambient credentials
    Aws,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the deployment to its desired state.
    ///
    /// Safe to re-run at any time: existing resources are left alone and
    /// only missing ones are created.
    Provision {
        #[arg(short, long, value_enum, default_value = "local")]
        target: Target,
        /// State file of the local control plane
        #[arg(short, long, default_value = commands::DEFAULT_STATE_PATH)]
        state: PathBuf,
        /// Exit non-zero when any item failed or was skipped
        #[arg(long)]
        strict: bool,
    },
    /// Serve the locally deployed stage over HTTP
    Serve {
        #[arg(short, long, default_value = commands::DEFAULT_STATE_PATH)]
        state: PathBuf,
        #[arg(short, long, default_value = commands::DEFAULT_LISTEN)]
        listen: String,
    },
    /// Print the route surface with example requests
    Routes {
        /// Base URL of the stage, e.g. the URL printed by `provision`
        #[arg(short, long, default_value = "http://127.0.0.1:3000")]
        base_url: String,
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },
    /// Package every function's code payload into a directory
    Pack {
        #[arg(short, long, default_value = "dist")]
        out: PathBuf,
        /// Package local descriptors instead of the bootstrap executable
        #[arg(long)]
        local: bool,
    },
    /// Write a classifieds.toml scaffold
    Init {
        #[arg(short, long, default_value = "classifieds")]
        name: String,
        #[arg(short, long, default_value = ads_core::config::DEFAULT_REGION)]
        region: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,adsctl=info,ads=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Provision { target, state, strict } => {
            let code = commands::provision::provision(&cli.config, target, &state, strict).await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Serve { state, listen } => commands::serve::serve(&cli.config, &state, &listen).await,
        Commands::Routes { base_url, format } => commands::routes::routes(&cli.config, &base_url, format),
        Commands::Pack { out, local } => commands::pack::pack(&cli.config, &out, local),
        Commands::Init { name, region, force } => commands::init::init(&cli.config, &name, &region, force),
    }
}
