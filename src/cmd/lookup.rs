use crate::cmd::progress::{create_spinner, finish_spinner_success};
use crate::cmd::{open_session, OutputFormat};
use crate::error::{Result, SweepError};
use crate::graph::users::{lookup_names, parse_name_list, LookupResult, LookupStatus, PersonName};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct LookupArgs {
    /// Person to resolve, as "First Last"; repeatable
    #[arg(short, long = "name", required_unless_present = "file")]
    pub names: Vec<String>,

    /// File with one person per line ("First Last" or "|First |Last |")
    #[arg(long, conflicts_with = "names")]
    pub file: Option<PathBuf>,

    /// Tenant name (defaults to the active tenant)
    #[arg(short, long)]
    pub tenant: Option<String>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

fn collect_names(args: &LookupArgs) -> Result<Vec<PersonName>> {
    let names = match &args.file {
        Some(path) => parse_name_list(&std::fs::read_to_string(path)?),
        None => args
            .names
            .iter()
            .map(|n| {
                PersonName::parse(n).ok_or_else(|| {
                    SweepError::InvalidConfig(format!("'{}' is not a \"First Last\" name", n))
                })
            })
            .collect::<Result<Vec<_>>>()?,
    };

    if names.is_empty() {
        return Err(SweepError::InvalidConfig("no names to look up".into()));
    }
    Ok(names)
}

pub async fn lookup(args: LookupArgs) -> Result<()> {
    let names = collect_names(&args)?;
    let session = open_session(args.tenant.as_deref())?;
    let graph = session.tenant.graph().await?;

    let spinner = create_spinner(&format!("Searching {} name(s)...", names.len()));
    if args.format == OutputFormat::Json {
        spinner.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }
    let results = lookup_names(&graph, &names).await;
    finish_spinner_success(&spinner, "Lookup complete");

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        OutputFormat::Table => print_summary(&results),
    }

    Ok(())
}

fn with_status(results: &[LookupResult], status: LookupStatus) -> Vec<&LookupResult> {
    results.iter().filter(|r| r.status == status).collect()
}

fn print_summary(results: &[LookupResult]) {
    let found = with_status(results, LookupStatus::Found);
    let multiple = with_status(results, LookupStatus::Multiple);
    let not_found = with_status(results, LookupStatus::NotFound);

    println!("\n{}", "=".repeat(80));
    println!("{}", "SUMMARY OF RESULTS".bold());
    println!("{}", "=".repeat(80));

    println!("\n{} ({}):", "Found".green().bold(), found.len());
    println!("{}", "-".repeat(80));
    for result in &found {
        let upn = result
            .users
            .first()
            .and_then(|u| u.user_principal_name.as_deref())
            .unwrap_or("N/A");
        println!("{:<30} -> {}", result.name.to_string(), upn);
    }

    if !multiple.is_empty() {
        println!("\n{} ({}):", "Multiple matches".yellow().bold(), multiple.len());
        println!("{}", "-".repeat(80));
        for result in &multiple {
            println!("\n{} ({} matches):", result.name, result.users.len());
            for user in &result.users {
                println!(
                    "  - {} ({})",
                    user.user_principal_name.as_deref().unwrap_or("N/A"),
                    user.display_name.as_deref().unwrap_or("N/A")
                );
            }
        }
    }

    if !not_found.is_empty() {
        println!("\n{} ({}):", "Not found".red().bold(), not_found.len());
        println!("{}", "-".repeat(80));
        for result in &not_found {
            match &result.error {
                Some(error) => println!("  - {} ({})", result.name, error.dimmed()),
                None => println!("  - {}", result.name),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(names: &[&str], file: Option<PathBuf>) -> LookupArgs {
        LookupArgs {
            names: names.iter().map(|n| n.to_string()).collect(),
            file,
            tenant: None,
            format: OutputFormat::Table,
        }
    }

    #[test]
    fn test_collect_names_from_args() {
        let names = collect_names(&args(&["Jack McClean", "Alexandra Van Heel"], None)).unwrap();
        assert_eq!(names[1], PersonName::new("Alexandra", "Van Heel"));
        assert!(collect_names(&args(&["Madonna"], None)).is_err());
    }

    #[test]
    fn test_collect_names_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.txt");
        std::fs::write(&path, "|Jack |McClean |\n|Mike |Cartwright |\n").unwrap();

        let names = collect_names(&args(&[], Some(path))).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], PersonName::new("Jack", "McClean"));
    }

    #[test]
    fn test_empty_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "\n\n").unwrap();
        assert!(collect_names(&args(&[], Some(path))).is_err());
    }
}
