//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// mimirform - declarative Grafana Mimir rules and Alertmanager configuration.
#[derive(Parser, Debug)]
#[command(name = "mimirform")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the manifest.
    #[arg(short, long, global = true, env = "MIMIRFORM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter manifest and .env.example.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the manifest without contacting Mimir.
    Validate {
        /// Show warnings as well as errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Refresh state and show what apply would do.
    Plan {
        /// Show spec hashes for each change.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Apply the plan.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Continue on errors.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Re-read every managed object and update state.
    Refresh,

    /// Report objects changed outside mimirform.
    Drift,

    /// Delete every managed object.
    Destroy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Adopt an existing object under a manifest address.
    Import {
        /// Address, `<kind>.<label>`.
        address: String,

        /// Remote identity (`namespace/name`, `org/namespace/name`, `org`, ...).
        id: String,
    },

    /// Inspect or edit state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },

    /// Read objects from Mimir without managing them.
    Get {
        /// What to read.
        #[command(subcommand)]
        command: GetCommands,
    },

    /// Validate and pretty-print a PromQL expression.
    FmtExpr {
        /// Expression to format.
        expr: String,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show a state summary and recent history.
    Show,

    /// List managed addresses.
    List,

    /// Forget an address without deleting the remote object.
    Rm {
        /// Address to forget.
        address: String,
    },

    /// Release the state lock.
    Unlock {
        /// Lock ID to release.
        #[arg(long)]
        lock_id: Option<String>,

        /// Remove the lock whoever holds it.
        #[arg(long)]
        force: bool,
    },
}

/// Read-only lookups.
#[derive(Subcommand, Debug)]
pub enum GetCommands {
    /// One rule group.
    RuleGroup {
        /// Rule namespace.
        namespace: String,

        /// Group name.
        name: String,

        /// Tenant, defaults to the provider's.
        #[arg(long)]
        org_id: Option<String>,
    },

    /// A tenant's Alertmanager configuration.
    AlertmanagerConfig {
        /// Tenant, defaults to the provider's.
        #[arg(long)]
        org_id: Option<String>,
    },

    /// Per-tenant ingestion statistics from the distributor.
    Stats,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_apply_flags() {
        let cli = Cli::try_parse_from(["mimirform", "apply", "-y", "--continue-on-error"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Commands::Apply {
                yes: true,
                continue_on_error: true
            }
        ));
    }

    #[test]
    fn test_parse_get_rule_group() {
        let cli = Cli::try_parse_from([
            "mimirform",
            "--output",
            "json",
            "get",
            "rule-group",
            "infra",
            "cpu",
            "--org-id",
            "t2",
        ])
        .expect("parse");
        assert_eq!(cli.output, OutputFormat::Json);
        let Commands::Get {
            command: GetCommands::RuleGroup { namespace, name, org_id },
        } = cli.command
        else {
            panic!("unexpected command");
        };
        assert_eq!((namespace.as_str(), name.as_str()), ("infra", "cpu"));
        assert_eq!(org_id.as_deref(), Some("t2"));
    }

    #[test]
    fn test_parse_state_rm() {
        let cli = Cli::try_parse_from(["mimirform", "state", "rm", "mimir_rules.infra"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Commands::State {
                command: StateCommands::Rm { .. }
            }
        ));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
