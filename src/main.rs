use std::{env, path::PathBuf, process::ExitCode};

use clap::{CommandFactory, Parser, error::ErrorKind};
use lean_daily_export::{ExportArgs, ExportError, export};
use tracing_subscriber::EnvFilter;

const DEFAULT_DATA_DIR: &str = "./Data";

fn apply_export_defaults(args: &mut ExportArgs) {
    if args.data_dir.is_none() {
        args.data_dir = Some(
            env::var_os("LEAN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        );
    }
    if args.base_url.is_none() {
        args.base_url = env::var("YAHOO_CHART_URL").ok();
    }
}

fn usage() -> String {
    let bin = ExportArgs::command().get_name().to_string();
    format!(
        "Usage: {bin} <symbol> <start_date> <end_date>\nExample: {bin} AAPL 2023-01-01 2023-12-31"
    )
}

/// Where a failure is reported and what is printed.
#[derive(Debug, PartialEq)]
enum Report {
    Stdout(String),
    Stderr(String),
}

/// Usage text followed by clap's own complaint (its first paragraph only).
fn report_parse_error(e: &clap::Error) -> Report {
    let rendered = e.to_string();
    let reason = rendered.split("\n\n").next().unwrap_or_default().trim_end();
    Report::Stdout(format!("{}\n{}", usage(), reason))
}

fn report(e: &anyhow::Error) -> Report {
    match e.downcast_ref::<ExportError>() {
        Some(err @ ExportError::Usage(_)) => Report::Stdout(format!("{}\n{}", usage(), err)),
        Some(err @ ExportError::NoData { .. }) => Report::Stdout(err.to_string()),
        None => Report::Stderr(format!("Error: {:#}", e)),
    }
}

fn emit(report: Report) -> ExitCode {
    match report {
        Report::Stdout(text) => println!("{}", text),
        Report::Stderr(text) => eprintln!("{}", text),
    }
    ExitCode::FAILURE
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut args = match ExportArgs::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => return emit(report_parse_error(&e)),
    };
    apply_export_defaults(&mut args);

    match export::execute(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => emit(report(&e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn missing_arguments_print_usage_and_reason() {
        let err = ExportArgs::try_parse_from(["lean-daily-export", "AAPL"]).unwrap_err();
        let Report::Stdout(text) = report_parse_error(&err) else {
            panic!("usage goes to stdout");
        };
        assert!(text.starts_with("Usage: lean-daily-export <symbol>"), "{text}");
        assert!(text.contains("error:"), "{text}");
        assert!(text.contains("required"), "{text}");
    }

    #[test]
    fn validation_errors_print_usage() {
        let err: anyhow::Error = ExportError::Usage("start_date 2023-01-05 is after end_date 2023-01-03".into()).into();
        let Report::Stdout(text) = report(&err) else {
            panic!("usage goes to stdout");
        };
        assert!(text.starts_with("Usage:"));
        assert!(text.ends_with("start_date 2023-01-05 is after end_date 2023-01-03"));
    }

    #[test]
    fn no_data_has_its_own_message() {
        let err: anyhow::Error = ExportError::NoData {
            symbol: "ZZZZ".into(),
        }
        .into();
        assert_eq!(
            report(&err),
            Report::Stdout("No data found for ZZZZ in this date range.".into())
        );
    }

    #[test]
    fn other_failures_print_the_chain_to_stderr() {
        let err = Err::<(), _>(std::io::Error::other("permission denied"))
            .context("create /data/equity/usa/daily")
            .unwrap_err();
        assert_eq!(
            report(&err),
            Report::Stderr("Error: create /data/equity/usa/daily: permission denied".into())
        );
    }
}
