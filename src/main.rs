use clap::{Parser, Subcommand};
use colored::Colorize;
use permsweep::cmd;
use permsweep::config::ConfigManager;
use permsweep::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "permsweep",
    about = "Find and remove a user's SharePoint permissions across a whole tenant",
    version,
    long_about = "Tenant-wide SharePoint permission sweep for Microsoft 365\n\n\
                  Lists every site collection, checks group membership, site admin status and\n\
                  role assignments for a target identity, and optionally removes what it finds."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage tenant configurations
    #[command(subcommand)]
    Tenant(TenantCommands),

    /// List site collections
    Sites(cmd::sites::SitesArgs),

    /// Check a single site for a user's permissions
    Probe(cmd::sweep::ProbeArgs),

    /// Check every site for a user's permissions, optionally removing them
    Sweep(cmd::sweep::SweepArgs),

    /// Resolve people by first and last name to user principal names
    Lookup(cmd::lookup::LookupArgs),
}

#[derive(Subcommand, Debug)]
enum TenantCommands {
    /// Add a new tenant configuration
    Add(cmd::tenant::TenantAddArgs),

    /// List configured tenants
    List(cmd::tenant::TenantListArgs),

    /// Switch the active tenant
    Switch(cmd::tenant::TenantSwitchArgs),

    /// Remove a tenant configuration
    Remove(cmd::tenant::TenantRemoveArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// `--verbose` wins, then `RUST_LOG`, then the configured level
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("permsweep=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = ConfigManager::new()
                .and_then(|m| m.load_config())
                .map(|c| c.log_level)
                .unwrap_or_default();
            let level = if level.is_empty() { "warn".to_string() } else { level };
            EnvFilter::new(format!("permsweep={}", level))
        })
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> error::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Tenant(tenant_cmd) => match tenant_cmd {
            TenantCommands::Add(args) => cmd::tenant::add(args).await?,
            TenantCommands::List(args) => cmd::tenant::list(args).await?,
            TenantCommands::Switch(args) => cmd::tenant::switch(args).await?,
            TenantCommands::Remove(args) => cmd::tenant::remove(args).await?,
        },
        Commands::Sites(args) => cmd::sites::list(args).await?,
        Commands::Probe(args) => cmd::sweep::probe(args).await?,
        Commands::Sweep(args) => cmd::sweep::sweep(args).await?,
        Commands::Lookup(args) => cmd::lookup::lookup(args).await?,
    }

    Ok(())
}
