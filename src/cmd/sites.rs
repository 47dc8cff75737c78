use crate::cmd::progress::{create_spinner, finish_spinner_error, finish_spinner_success};
use crate::cmd::{open_session, OutputFormat};
use crate::error::Result;
use crate::sweep::enumerator::{list_sites, EnumerateOptions};
use crate::sweep::model::SiteDescriptor;
use crate::sweep::TenantSession;
use clap::Args;
use colored::Colorize;
use futures::TryStreamExt;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct SitesArgs {
    /// Include OneDrive personal sites
    #[arg(long)]
    pub include_personal: bool,

    /// Stop after this many sites
    #[arg(long)]
    pub max_sites: Option<usize>,

    /// Tenant name (defaults to the active tenant)
    #[arg(short, long)]
    pub tenant: Option<String>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

/// Drain the enumerator; any page failure fails the whole listing
async fn collect_sites(
    tenant: Arc<dyn TenantSession>,
    options: EnumerateOptions,
) -> Result<Vec<SiteDescriptor>> {
    list_sites(tenant, options)
        .try_collect::<Vec<SiteDescriptor>>()
        .await
}

pub async fn list(args: SitesArgs) -> Result<()> {
    let session = open_session(args.tenant.as_deref())?;
    let options = EnumerateOptions {
        include_personal_sites: args.include_personal || session.defaults.include_personal_sites,
        max_sites: args.max_sites,
    };

    let spinner = create_spinner("Listing site collections...");
    if args.format == OutputFormat::Json {
        spinner.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let sites = match collect_sites(Arc::new(session.tenant), options).await {
        Ok(sites) => {
            finish_spinner_success(&spinner, &format!("{} site(s) found", sites.len()));
            sites
        }
        Err(e) => {
            finish_spinner_error(&spinner, "Site listing failed");
            return Err(e);
        }
    };

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&sites)?);
        return Ok(());
    }

    if sites.is_empty() {
        println!("No sites found.");
        return Ok(());
    }

    println!(
        "\n{} SharePoint Sites ({} found)",
        "=".repeat(60),
        sites.len()
    );
    println!("{:<40} {:<70} {}", "NAME".bold(), "URL".bold(), "TYPE".bold());
    println!("{}", "-".repeat(120));

    for site in &sites {
        let kind = if site.is_personal_site {
            "personal".dimmed()
        } else {
            "site".normal()
        };
        println!("{:<40} {:<70} {}", site.display_name, site.url, kind);
    }

    Ok(())
}
