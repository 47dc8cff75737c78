//! Human-readable rendering of sweep results

use crate::error::Result;
use crate::sweep::model::{PermissionMatch, SiteOutcome, StopReason, SweepResult};
use crate::sweep::probe::ProbeReport;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use std::path::Path;

pub fn outcome_label(outcome: SiteOutcome) -> ColoredString {
    match outcome {
        SiteOutcome::Clean => "clean".green(),
        SiteOutcome::Matched => "matched".yellow().bold(),
        SiteOutcome::Inconclusive => "inconclusive".red(),
    }
}

/// Removal state of one match as shown in the table
pub fn match_status(m: &PermissionMatch, removal_enabled: bool) -> String {
    if m.removed {
        return "removed".to_string();
    }
    if let Some(error) = &m.removal_error {
        return format!("removal failed: {}", error);
    }
    if let Some(group) = &m.via_group {
        return format!("via group '{}'", group);
    }
    if m.needs_confirmation {
        return "needs confirmation".to_string();
    }
    if removal_enabled {
        "not removed".to_string()
    } else {
        "found".to_string()
    }
}

pub fn stop_reason_text(reason: &StopReason) -> String {
    match reason {
        StopReason::Exhausted => "all sites processed".to_string(),
        StopReason::SiteCap => "site cap reached".to_string(),
        StopReason::Cancelled => "cancelled; unfinished sites were not probed".to_string(),
        StopReason::EnumerationFailed(e) => format!("site listing failed: {}", e),
        StopReason::WorkerFailed(n) => {
            format!("{} sweep worker(s) failed; their unfinished sites are listed as errors", n)
        }
    }
}

fn truncate_chars(s: &str, n: usize) -> String {
    if s.chars().count() <= n {
        return s.to_string();
    }
    let mut out: String = s.chars().take(n.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn print_matches(matches: &[PermissionMatch], removal_enabled: bool) {
    println!(
        "{:<48} {:<16} {:<24} {:<36} {}",
        "SITE".bold(),
        "KIND".bold(),
        "GROUP / ROLE".bold(),
        "PRINCIPAL".bold(),
        "STATUS".bold()
    );
    println!("{}", "-".repeat(140));

    for m in matches {
        let status = match_status(m, removal_enabled);
        let status = if m.removed {
            status.green()
        } else if m.removal_error.is_some() {
            status.red()
        } else if m.needs_confirmation {
            status.yellow()
        } else {
            status.normal()
        };
        println!(
            "{:<48} {:<16} {:<24} {:<36} {}",
            truncate_chars(&m.site.url, 48),
            m.match_kind.as_str(),
            truncate_chars(&m.group_or_role_name, 24),
            truncate_chars(crate::sweep::identity::claim_value(&m.principal_login_name), 36),
            status
        );
    }
}

pub fn print_sweep_result(result: &SweepResult) {
    println!(
        "\n{} Sweep for {} ({} match)",
        "=".repeat(60),
        result.targets.join(", ").bold(),
        result.strategy
    );

    if result.matches.is_empty() {
        println!("\n{} No permissions found for the target.", "✓".green());
    } else {
        println!();
        print_matches(&result.matches, result.removal_enabled);
    }

    if !result.errors.is_empty() {
        println!("\n{} ({})", "Sites with errors".red().bold(), result.errors.len());
        for error in &result.errors {
            let tag = if error.unreachable {
                "unreachable".red()
            } else {
                "partial".yellow()
            };
            println!("  {} [{}] {}", error.site.url, tag, error.message);
        }
    }

    println!("\n{}", "Summary".bold());
    println!("{}", "-".repeat(60));
    println!("  Sites scanned:       {}", result.sites_scanned);
    println!(
        "  Sites with match:    {}",
        result.sites_with_match.to_string().yellow()
    );
    println!(
        "  Sites inconclusive:  {}",
        if result.sites_inconclusive > 0 {
            result.sites_inconclusive.to_string().red()
        } else {
            "0".normal()
        }
    );
    println!("  Matches:             {}", result.matches.len());
    if result.removal_enabled {
        println!(
            "  Removed:             {}",
            result.removed_count().to_string().green()
        );
        if result.removal_failures() > 0 {
            println!(
                "  Removal failures:    {}",
                result.removal_failures().to_string().red()
            );
        }
    }
    if result.needs_confirmation() > 0 {
        println!(
            "  Need confirmation:   {}",
            result.needs_confirmation().to_string().yellow()
        );
    }
    println!("  Elapsed:             {:.1}s", result.elapsed.as_secs_f64());
    println!("  Stopped:             {}", stop_reason_text(&result.stop_reason));
}

pub fn print_probe_report(report: &ProbeReport, removal_enabled: bool) {
    println!(
        "\n{} {} [{}]",
        "Site".cyan().bold(),
        report.site.url,
        outcome_label(report.outcome())
    );
    match report.user_present {
        Some(true) => println!("  Target is in the site user list"),
        Some(false) => println!("  Target is not in the site user list; group check skipped"),
        None => println!("  Site user list unavailable; all checks ran"),
    }

    if !report.matches.is_empty() {
        println!();
        print_matches(&report.matches, removal_enabled);
    }

    for failure in &report.failures {
        println!(
            "  {} {}: {}",
            "✗".red(),
            failure.step,
            failure.message
        );
    }
}

/// Write a value as pretty JSON
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}
