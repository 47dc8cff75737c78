use crate::config::{ConfigManager, TenantConfig};
use crate::error::Result;
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct TenantAddArgs {
    /// Tenant name
    name: String,

    /// Tenant ID (Entra ID tenant ID)
    #[arg(long)]
    tenant_id: String,

    /// Client ID (Application ID) of an app with Sites.FullControl.All
    #[arg(long)]
    client_id: String,

    /// Client secret for the client credentials grant
    #[arg(long, env = "PERMSWEEP_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Tenant description
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
pub struct TenantListArgs {
    /// Show detailed information
    #[arg(short, long)]
    details: bool,
}

#[derive(Args, Debug)]
pub struct TenantSwitchArgs {
    /// Tenant name to switch to
    name: String,
}

#[derive(Args, Debug)]
pub struct TenantRemoveArgs {
    /// Tenant name to remove
    name: String,
}

pub async fn add(args: TenantAddArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;

    let tenant = TenantConfig {
        name: args.name.clone(),
        tenant_id: args.tenant_id,
        client_id: args.client_id,
        client_secret: args.client_secret,
        description: args.description,
    };
    let has_secret = tenant.client_secret.is_some();

    config_manager.add_tenant(tenant)?;

    let config = config_manager.load_config()?;
    if config.current_tenant.is_none() {
        config_manager.set_active_tenant(&args.name)?;
    }

    println!("{} Tenant '{}' added successfully", "✓".green(), args.name);
    if !has_secret {
        println!(
            "{} No client secret stored. Set {} to use a pre-issued token instead.",
            "!".yellow(),
            crate::cmd::ACCESS_TOKEN_ENV.bold()
        );
    }
    println!(
        "\n{} Run {} to start a sweep",
        "→".cyan(),
        format!("permsweep sweep --tenant {} --user <upn>", args.name).bold()
    );

    Ok(())
}

pub async fn list(args: TenantListArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let tenants = config_manager.load_tenants()?;
    let config = config_manager.load_config()?;

    if tenants.is_empty() {
        println!("{} No tenants configured", "!".yellow());
        println!(
            "\n{} Run {} to add a tenant",
            "→".cyan(),
            "permsweep tenant add".bold()
        );
        return Ok(());
    }

    println!("\n{}", "Configured Tenants:".bold());
    println!("{}", "─".repeat(60));

    for tenant in &tenants {
        let is_current = config
            .current_tenant
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(&tenant.name));
        let marker = if is_current {
            "●".green()
        } else {
            "○".dimmed()
        };

        println!("\n{} {}", marker, tenant.name.bold());

        if args.details {
            println!("  Tenant ID:    {}", tenant.tenant_id);
            println!("  Client ID:    {}", tenant.client_id);
            if let Some(desc) = &tenant.description {
                println!("  Description:  {}", desc);
            }
            if tenant.client_secret.is_some() {
                println!("  Credentials:  {}", "Client secret stored".green());
            } else {
                println!("  Credentials:  {}", "No client secret".yellow());
            }
        }
    }

    println!("\n{}", "─".repeat(60));
    println!("{} {} tenant(s) total", "→".cyan(), tenants.len());

    if let Some(current) = &config.current_tenant {
        println!("{} Active: {}", "→".cyan(), current.bold());
    }

    Ok(())
}

pub async fn switch(args: TenantSwitchArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;

    // env files are imported on first use
    let tenant = config_manager.get_tenant_or_env(&args.name)?;
    config_manager.set_active_tenant(&tenant.name)?;

    println!("{} Switched to tenant '{}'", "✓".green(), tenant.name);

    Ok(())
}

pub async fn remove(args: TenantRemoveArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    config_manager.remove_tenant(&args.name)?;

    println!("{} Tenant '{}' removed", "✓".green(), args.name);

    Ok(())
}
