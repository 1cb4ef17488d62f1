use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use txfetch::api::FetchMode;

#[derive(Parser, Debug)]
#[command(name = "txfetch", version, about = "Transaction job-fetch client")]
pub struct Cli {
    #[arg(short, long, global = true, help = "Path to the YAML config file")]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check whether the backend session is authorized
    Status,
    /// Log in and print the issued session token
    Login {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Start a fetch job for a date range
    Start {
        #[command(flatten)]
        range: DateRange,
    },
    /// Read transactions for a date range
    Fetch {
        #[command(flatten)]
        range: DateRange,
        #[arg(long, default_value_t = FetchMode::Cached, help = "cached, force-empty or force-refresh")]
        mode: FetchMode,
    },
}

#[derive(Args, Debug)]
pub struct DateRange {
    #[arg(long, help = "First day, YYYY-MM-DD")]
    pub from: NaiveDate,
    #[arg(long, help = "Last day, YYYY-MM-DD")]
    pub to: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::parse_from([
            "txfetch",
            "fetch",
            "--from",
            "2024-01-01",
            "--to",
            "2024-01-31",
            "--mode",
            "force-refresh",
        ]);
        match cli.command {
            Commands::Fetch { range, mode } => {
                assert_eq!(range.from, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
                assert_eq!(range.to, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
                assert_eq!(mode, FetchMode::ForceRefresh);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_fetch_mode_defaults_to_cached() {
        let cli = Cli::parse_from([
            "txfetch", "-c", "conf.yaml", "fetch", "--from", "2024-01-01", "--to", "2024-01-02",
        ]);
        assert_eq!(cli.conf.as_deref(), Some("conf.yaml"));
        assert!(matches!(
            cli.command,
            Commands::Fetch {
                mode: FetchMode::Cached,
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_bad_date() {
        let parsed = Cli::try_parse_from([
            "txfetch", "start", "--from", "01/01/2024", "--to", "2024-01-02",
        ]);
        assert!(parsed.is_err());
    }
}
