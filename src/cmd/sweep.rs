//! `sweep` and `probe` commands

use crate::cmd::progress::{create_scan_bar, finish_spinner_error, finish_spinner_success};
use crate::cmd::report::{outcome_label, print_probe_report, print_sweep_result, write_json};
use crate::cmd::{open_session, prompts, OutputFormat};
use crate::error::{Result, SweepError};
use crate::graph::sharepoint::is_personal_url;
use crate::sweep::identity::{IdentityMatcher, MatchStrategy};
use crate::sweep::model::{SiteDescriptor, SiteOutcome};
use crate::sweep::probe::{probe_site, ProbeOptions};
use crate::sweep::{SweepCoordinator, SweepOptions, SweepProgress};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Target identity (UPN, login name, email or object id); repeat for several identities
    #[arg(short, long = "user", required = true)]
    pub users: Vec<String>,

    /// How principals are compared with the target
    #[arg(short = 'm', long = "match", value_enum, default_value_t = MatchStrategy::Exact)]
    pub strategy: MatchStrategy,

    /// Number of sites probed in parallel (default from config)
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Remove every permission found (default is a dry run)
    #[arg(long)]
    pub remove: bool,

    /// Allow --remove together with --match substring
    #[arg(long, requires = "remove")]
    pub allow_heuristic_removal: bool,

    /// Stop after this many sites
    #[arg(long)]
    pub max_sites: Option<usize>,

    /// Include OneDrive personal sites
    #[arg(long)]
    pub include_personal: bool,

    /// Tenant name (defaults to the active tenant)
    #[arg(short, long)]
    pub tenant: Option<String>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Also write the full result as JSON to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Site URL (e.g. https://contoso.sharepoint.com/sites/hr)
    #[arg(short, long)]
    pub site: String,

    /// Target identity; repeat for several identities
    #[arg(short, long = "user", required = true)]
    pub users: Vec<String>,

    #[arg(short = 'm', long = "match", value_enum, default_value_t = MatchStrategy::Exact)]
    pub strategy: MatchStrategy,

    /// Remove every permission found
    #[arg(long)]
    pub remove: bool,

    /// Allow --remove together with --match substring
    #[arg(long, requires = "remove")]
    pub allow_heuristic_removal: bool,

    /// Tenant name (defaults to the active tenant)
    #[arg(short, long)]
    pub tenant: Option<String>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

fn build_matcher(users: &[String], strategy: MatchStrategy) -> Result<IdentityMatcher> {
    let matcher = IdentityMatcher::new(strategy, users);
    if matcher.is_empty() {
        return Err(SweepError::InvalidConfig(
            "at least one non-empty --user is required".into(),
        ));
    }
    Ok(matcher)
}

/// Removal with a heuristic matcher could strip the wrong person's access
fn check_removal_allowed(matcher: &IdentityMatcher, remove: bool, allow_heuristic: bool) -> Result<()> {
    if remove && matcher.is_heuristic() && !allow_heuristic {
        return Err(SweepError::InvalidConfig(
            "--remove with --match substring needs --allow-heuristic-removal; review a dry run first"
                .into(),
        ));
    }
    Ok(())
}

/// Ask before removing; returns false when the operator declined
fn confirm_removal(scope: &str, matcher: &IdentityMatcher, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    println!(
        "{} Permissions of {} will be removed from {}.",
        "Warning:".yellow().bold(),
        matcher.targets().join(", ").bold(),
        scope
    );
    prompts::confirm("Continue?", false)
}

pub async fn sweep(args: SweepArgs) -> Result<()> {
    let matcher = build_matcher(&args.users, args.strategy)?;
    check_removal_allowed(&matcher, args.remove, args.allow_heuristic_removal)?;

    let session = open_session(args.tenant.as_deref())?;

    if args.remove && !confirm_removal("every matching site", &matcher, args.yes)? {
        println!("Aborted.");
        return Ok(());
    }

    let options = SweepOptions {
        concurrency: args
            .concurrency
            .unwrap_or(session.defaults.concurrency)
            .max(1),
        include_personal_sites: args.include_personal || session.defaults.include_personal_sites,
        max_sites: args.max_sites,
        remove_on_match: args.remove,
    };

    let interactive = args.format == OutputFormat::Table;
    if interactive {
        println!(
            "{} Sweeping tenant {} with {} workers{}",
            "SharePoint".cyan().bold(),
            session.label.bold(),
            options.concurrency,
            if args.remove {
                " (removal enabled)".red().to_string()
            } else {
                " (dry run)".dimmed().to_string()
            }
        );
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{} Cancelling: waiting for running probes to finish...",
                "!".yellow().bold()
            );
            ctrl_c.cancel();
        }
    });

    let bar = create_scan_bar(args.max_sites);
    if !interactive {
        bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }
    let progress_bar = bar.clone();

    let coordinator = SweepCoordinator::new(
        Arc::new(session.tenant),
        Arc::new(matcher),
        options,
    )
    .with_cancellation(cancel)
    .on_progress(Arc::new(move |p: &SweepProgress| {
        progress_bar.set_position(p.sites_completed as u64);
        progress_bar.set_message(format!("{} match(es)", p.matches_found));
        if p.outcome != SiteOutcome::Clean {
            progress_bar.println(format!("  {} {}", outcome_label(p.outcome), p.site_url));
        }
    }));

    let result = match coordinator.run().await {
        Ok(result) => {
            finish_spinner_success(
                &bar,
                &format!(
                    "{} sites processed",
                    result.sites_scanned + result.sites_inconclusive
                ),
            );
            result
        }
        Err(e) => {
            finish_spinner_error(&bar, "Sweep failed");
            return Err(e);
        }
    };

    if let Some(path) = &args.output {
        write_json(path, &result)?;
        if interactive {
            prompts::success(&format!("Result written to {}", path.display()));
        }
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Table => print_sweep_result(&result),
    }

    if interactive && result.needs_confirmation() > 0 {
        prompts::warning("Substring matches must be checked by hand before acting on them.");
    }

    Ok(())
}

pub async fn probe(args: ProbeArgs) -> Result<()> {
    let matcher = build_matcher(&args.users, args.strategy)?;
    check_removal_allowed(&matcher, args.remove, args.allow_heuristic_removal)?;

    let session = open_session(args.tenant.as_deref())?;

    if args.remove && !confirm_removal(&args.site, &matcher, args.yes)? {
        println!("Aborted.");
        return Ok(());
    }

    let site = SiteDescriptor::new(&args.site, &args.site, is_personal_url(&args.site));
    let report = probe_site(
        &session.tenant,
        &site,
        &matcher,
        &ProbeOptions {
            remove_on_match: args.remove,
        },
    )
    .await;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "site": report.site,
                "outcome": report.outcome(),
                "userPresent": report.user_present,
                "matches": report.matches,
                "failures": report.failures,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => print_probe_report(&report, args.remove),
    }

    Ok(())
}
