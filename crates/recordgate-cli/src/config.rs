//! Command-line configuration.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RECORDGATE_URL` | | Endpoint of the default connection |
//! | `RECORDGATE_CONNECTION_PREFIX` | RECORDGATE_CONNECTION | Prefix of connection variables |
//! | `RECORDGATE_LOG_LEVEL` | warn | Log level |
//!
//! Named connections come from `<PREFIX>` and `<PREFIX>__<NAME>` variables;
//! `RECORDGATE_URL` overrides the default one.

use clap::{Args, Parser, Subcommand};
use recordgate::connection::{DEFAULT_CONNECTION, DEFAULT_SETTINGS_PREFIX};
use recordgate::{ConnectionRegistry, Endpoint, StorageResult};

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Command-line configuration for the `recordgate` tool.
#[derive(Debug, Clone, Parser)]
#[command(name = "recordgate")]
#[command(about = "Inspect and maintain recordgate collections")]
pub struct CliConfig {
    /// Endpoint URL of the default connection.
    #[arg(long, env = "RECORDGATE_URL", global = true)]
    pub url: Option<String>,

    /// Prefix of the environment variables that name connections.
    #[arg(
        long,
        env = "RECORDGATE_CONNECTION_PREFIX",
        default_value = DEFAULT_SETTINGS_PREFIX,
        global = true
    )]
    pub connection_prefix: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "RECORDGATE_LOG_LEVEL", default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Which collection a command acts on.
#[derive(Debug, Clone, Args)]
pub struct Target {
    /// Connection name.
    #[arg(long, default_value = DEFAULT_CONNECTION)]
    pub connection: String,

    /// Collection name.
    #[arg(long)]
    pub collection: String,
}

/// Subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List configured connections.
    Connections,

    /// Count documents.
    Count {
        #[command(flatten)]
        target: Target,

        /// Filter document as JSON. Counts everything when omitted.
        #[arg(long)]
        filter: Option<String>,
    },

    /// Print matching documents, one JSON object per line.
    Find {
        #[command(flatten)]
        target: Target,

        /// Filter document as JSON. Matches everything when omitted.
        #[arg(long)]
        filter: Option<String>,

        /// Sort keys, e.g. `Priority:-1,Name`.
        #[arg(long)]
        sort: Option<String>,

        /// Leading matches to skip.
        #[arg(long)]
        skip: Option<u64>,

        /// Maximum documents to print.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Delete matching documents.
    Delete {
        #[command(flatten)]
        target: Target,

        /// Filter document as JSON.
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        filter: Option<String>,

        /// Delete every document.
        #[arg(long)]
        all: bool,
    },

    /// Drop a collection.
    Drop {
        #[command(flatten)]
        target: Target,
    },

    /// Ensure an index.
    Index {
        #[command(flatten)]
        target: Target,

        /// Index keys, e.g. `LastName:1,Age:-1`.
        #[arg(long)]
        keys: String,

        /// Explicit index name.
        #[arg(long)]
        name: Option<String>,

        /// Reject duplicate keys.
        #[arg(long)]
        unique: bool,

        /// Skip documents without the indexed fields.
        #[arg(long)]
        sparse: bool,
    },
}

impl CliConfig {
    /// Validates the configuration, returning every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(format!(
                "Log level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.log_level
            ));
        }

        if self.connection_prefix.trim().is_empty() {
            errors.push("Connection prefix cannot be empty".to_string());
        }

        if let Some(url) = &self.url {
            if let Err(e) = Endpoint::parse(url) {
                errors.push(e.to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Builds the connection registry from the environment and `--url`.
    pub fn registry(&self) -> StorageResult<ConnectionRegistry> {
        let registry = ConnectionRegistry::from_env(&self.connection_prefix)?;
        if let Some(url) = &self.url {
            registry.set_connection(DEFAULT_CONNECTION, Some(url))?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliConfig {
        CliConfig::try_parse_from(std::iter::once("recordgate").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["count", "--collection", "Person"]);
        assert_eq!(config.connection_prefix, DEFAULT_SETTINGS_PREFIX);
        match config.command {
            Command::Count { target, filter } => {
                assert_eq!(target.connection, "default");
                assert_eq!(target.collection, "Person");
                assert!(filter.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_delete_requires_filter_or_all() {
        let missing =
            CliConfig::try_parse_from(["recordgate", "delete", "--collection", "Person"]);
        assert!(missing.is_err());

        let both = CliConfig::try_parse_from([
            "recordgate",
            "delete",
            "--collection",
            "Person",
            "--all",
            "--filter",
            "{}",
        ]);
        assert!(both.is_err());

        let config = parse(&["delete", "--collection", "Person", "--all"]);
        assert!(matches!(config.command, Command::Delete { all: true, .. }));
    }

    #[test]
    fn test_validate_collects_every_error() {
        let mut config = parse(&["connections"]);
        config.log_level = "loud".to_string();
        config.connection_prefix = " ".to_string();
        config.url = Some("ftp://nowhere".to_string());

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_url_overrides_default_connection() {
        let mut config = parse(&["connections"]);
        config.connection_prefix = "RECORDGATE_CLI_TEST_UNSET".to_string();
        config.url = Some("memory://cli".to_string());
        assert!(config.validate().is_ok());

        let registry = config.registry().unwrap();
        assert_eq!(registry.endpoint("default").unwrap().database(), "cli");
    }
}
