//! CLI argument definitions for laddertrack.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `providers` | Show effective provider configuration |
//! | `health` | Show persisted provider health scores |
//! | `season` | Resolve a ladder season, falling back to local data |
//! | `vars` | Dump the variable store |
//!
//! # Examples
//!
//! ```bash
//! laddertrack providers --format table
//! laddertrack season EU 58 --pretty
//! RUST_LOG=laddertrack=debug laddertrack season KR 58
//! laddertrack vars --prefix twitch_
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Resilient provider client tooling for the ladder tracker.
#[derive(Debug, Parser)]
#[command(name = "laddertrack", author, version, about)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Warehouse home directory (defaults to LADDERTRACK_HOME or ~/.laddertrack).
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON document.
    Json,
    /// Aligned text columns.
    Table,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show effective configuration of every provider (or one).
    Providers(ProvidersArgs),

    /// Show the last persisted health score per provider.
    Health(HealthArgs),

    /// Resolve a ladder season from Battle.net, falling back to the local store.
    ///
    ///   laddertrack season EU 58
    ///   laddertrack season us 58 --deadline-ms 5000
    Season(SeasonArgs),

    /// Dump raw variables, optionally filtered by key prefix.
    Vars(VarsArgs),
}

#[derive(Debug, Args)]
pub struct ProvidersArgs {
    /// Restrict output to one provider.
    #[arg(long)]
    pub provider: Option<String>,
}

#[derive(Debug, Args)]
pub struct HealthArgs {
    /// Restrict output to one provider.
    #[arg(long)]
    pub provider: Option<String>,
}

#[derive(Debug, Args)]
pub struct SeasonArgs {
    /// Region code: US, EU, KR or CN.
    pub region: String,

    /// Battle.net season id.
    pub season: i32,

    /// Overall deadline for the external fetch, retries included.
    #[arg(long, default_value_t = 15_000)]
    pub deadline_ms: u64,
}

#[derive(Debug, Args)]
pub struct VarsArgs {
    /// Only keys starting with this prefix.
    #[arg(long, default_value = "")]
    pub prefix: String,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn season_arguments_parse() {
        let cli = Cli::try_parse_from(["laddertrack", "--pretty", "season", "eu", "58"])
            .expect("parse");

        assert!(cli.pretty);
        match cli.command {
            Command::Season(args) => {
                assert_eq!(args.region, "eu");
                assert_eq!(args.season, 58);
                assert_eq!(args.deadline_ms, 15_000);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
