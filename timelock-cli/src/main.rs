use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use timelock_protocol::api::EnqueueExecutionRequest;
use timelock_protocol::execution::{ExecutionStatus, PayloadCall};

mod client;
mod output;

use client::{CliError, SchedulerClient};
use output::{
    print_cancelled, print_enqueued, print_list, print_outcome, print_request, print_reset,
};

const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:8095";

#[derive(Parser)]
#[command(name = "timelock")]
#[command(about = "Operator console for the timelock execution scheduler", long_about = None)]
struct Cli {
    #[arg(long, global = true, env = "TIMELOCK_SERVICE_URL", default_value = DEFAULT_SERVICE_URL)]
    service: String,
    /// Log HTTP traffic
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue an approved proposal for execution
    Enqueue(EnqueueArgs),
    /// Show the execution state of a proposal
    Status {
        proposal: String,
    },
    /// List executions, optionally filtered by status
    List {
        #[arg(long)]
        status: Option<ExecutionStatus>,
    },
    /// Execute a due proposal now
    Execute(OperatorArgs),
    /// Cancel a queued execution
    Cancel(OperatorArgs),
    /// Re-queue a failed execution with a fresh attempt budget
    Retry {
        proposal: String,
    },
    /// Check that the scheduler service is reachable
    Health,
    /// Show version information
    Version,
}

#[derive(Args)]
struct EnqueueArgs {
    #[arg(long)]
    proposal: String,
    /// RFC 3339 instant or an offset from now such as `+90s`, `+2h`, `+1d`
    #[arg(long, value_parser = parse_eta)]
    eta: DateTime<Utc>,
    /// JSON file holding the array of calls
    #[arg(long)]
    calls: PathBuf,
}

#[derive(Args)]
struct OperatorArgs {
    proposal: String,
    #[arg(long, env = "TIMELOCK_ACTOR")]
    actor: String,
}

fn parse_eta(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("now") {
        return Ok(Utc::now());
    }
    if let Some(offset) = raw.strip_prefix('+') {
        let offset = parse_offset(offset)?;
        return Utc::now()
            .checked_add_signed(offset)
            .ok_or_else(|| format!("eta `{raw}` is out of range"));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|eta| eta.with_timezone(&Utc))
        .map_err(|err| format!("invalid eta `{raw}`: {err}"))
}

fn parse_offset(raw: &str) -> Result<Duration, String> {
    let split = raw
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let amount: i64 = digits
        .parse()
        .map_err(|_| format!("invalid offset `+{raw}`"))?;
    let unit_secs: i64 = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        other => return Err(format!("unknown offset unit `{other}`")),
    };
    amount
        .checked_mul(unit_secs)
        .and_then(Duration::try_seconds)
        .ok_or_else(|| format!("offset `+{raw}` is out of range"))
}

fn load_calls(path: &Path) -> Result<Vec<PayloadCall>, CliError> {
    let calls: Vec<PayloadCall> = timelock_core::serde_utils::from_json_file(path)?;
    if calls.is_empty() {
        return Err(CliError::Validation(format!(
            "{} contains no calls",
            path.display()
        )));
    }
    Ok(calls)
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    if cli.verbose {
        if let Err(err) = timelock_core::logging::init_tracing(Some("debug")) {
            eprintln!("failed to initialise tracing: {err}");
        }
    }

    if let Commands::Version = cli.command {
        println!("timelock v{}", env!("CARGO_PKG_VERSION"));
        println!("Time-locked proposal execution scheduler");
        return Ok(());
    }

    let client = SchedulerClient::new(&cli.service)?;

    match cli.command {
        Commands::Enqueue(args) => {
            let request = EnqueueExecutionRequest {
                proposal_id: args.proposal,
                eta: args.eta,
                payload: load_calls(&args.calls)?,
            };
            let stored = client.enqueue(&request).await?;
            print_enqueued(&stored);
        }
        Commands::Status { proposal } => {
            let request = client.status(&proposal).await?;
            print_request(&request);
        }
        Commands::List { status } => {
            let requests = client.list(status).await?;
            print_list(&requests);
        }
        Commands::Execute(args) => {
            let outcome = client.execute(&args.proposal, &args.actor).await?;
            print_outcome(&outcome);
        }
        Commands::Cancel(args) => {
            let request = client.cancel(&args.proposal, &args.actor).await?;
            print_cancelled(&request);
        }
        Commands::Retry { proposal } => {
            let request = client.retry(&proposal).await?;
            print_reset(&request);
        }
        Commands::Health => {
            let body = client.health().await?;
            println!("{} {}", cli.service, body["status"].as_str().unwrap_or("unknown"));
        }
        Commands::Version => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_absolute_and_relative_eta() {
        let absolute = parse_eta("2030-01-02T03:04:05Z").expect("rfc3339");
        assert_eq!(absolute.to_rfc3339(), "2030-01-02T03:04:05+00:00");

        let before = Utc::now();
        let relative = parse_eta("+2h").expect("offset");
        assert!(relative - before >= Duration::hours(2));
        assert!(relative - before < Duration::hours(2) + Duration::seconds(5));

        assert!(parse_eta("+3w").is_err());
        assert!(parse_eta("tomorrow").is_err());
    }

    #[test_case::test_case("+9999999999999d" ; "duration overflow")]
    #[test_case::test_case("+99999999999999999999s" ; "integer overflow")]
    #[test_case::test_case("+9000000000000s" ; "date overflow")]
    fn oversized_offsets_are_rejected(raw: &str) {
        let err = parse_eta(raw).unwrap_err();
        assert!(err.contains("out of range") || err.contains("invalid offset"), "{err}");
    }

    #[test]
    fn loads_calls_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"[{{"target": "0xgov", "call_data": "0xabcdef"}}]"#
        )
        .expect("write calls");

        let calls = load_calls(file.path()).expect("calls");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].value, "0");
    }

    #[test]
    fn empty_call_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "[]").expect("write calls");
        assert!(matches!(
            load_calls(file.path()),
            Err(CliError::Validation(_))
        ));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
