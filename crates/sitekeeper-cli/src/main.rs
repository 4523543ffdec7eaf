use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sitekeeper_cli::{Session, SessionConfig};

#[derive(Parser)]
#[command(
    name = "sitekeeper",
    about = "Tracks installed features and plug-ins across configured sites"
)]
struct Cli {
    /// Configuration area holding platform.json
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Installation root to track
    #[arg(long, value_name = "DIR")]
    install_dir: PathBuf,

    /// Shared parent configuration consulted on first run
    #[arg(long, value_name = "DIR")]
    shared_dir: Option<PathBuf>,

    /// Do not keep timestamped copies of replaced configurations
    #[arg(long)]
    no_history: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the configured sites and features without persisting anything.
    Status,
    /// Run the startup reconciliation and persist the result.
    Reconcile,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => SessionConfig::default_config_dir()?,
    };
    let mut config = SessionConfig::new(config_dir, cli.install_dir);
    config.shared_dir = cli.shared_dir;
    config.retain_history = !cli.no_history;

    let session = Session::start(config)?;
    print_summary(&session);
    match cli.command {
        Commands::Status => {}
        Commands::Reconcile => session.shutdown(),
    }
    Ok(())
}

fn print_summary(session: &Session) {
    let registry = session.registry();
    for site in registry.enabled_sites() {
        let mode = if site.updateable { "R/W" } else { "R/O" };
        println!(
            "{} [{}] ({} features, {} plug-ins)",
            site.key(),
            mode,
            site.features.len(),
            site.plugins.len()
        );
        for feature in site.features.values() {
            println!(
                "  {} {}{}",
                feature.id,
                feature.version.as_deref().unwrap_or("(unversioned)"),
                if feature.primary { " [primary]" } else { "" }
            );
        }
    }
    if let Some(primary) = registry.primary_feature_id() {
        println!("primary feature: {primary} (application {})", registry.application_id());
    }
}
