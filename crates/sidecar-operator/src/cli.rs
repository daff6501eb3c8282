//! Command line interface of the operator binary.
//!
//! Every flag can also be provided through the environment variable of the same name, e.g.
//! `--watch-namespace` is read from `WATCH_NAMESPACE`.
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::{logging::LogFormat, namespace::WatchNamespace};

pub const DEFAULT_FIELD_MANAGER: &str = "sidecar-operator";

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(
    name = "sidecar-operator",
    version,
    about = "Injects a sidecar container into every Deployment"
)]
pub struct Opts {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the operator.
    Run(RunArguments),
}

/// Arguments of the [`Command::Run`] subcommand.
#[derive(Debug, PartialEq, Eq, Args)]
pub struct RunArguments {
    /// Provides a specific namespace to watch (instead of watching all namespaces)
    #[arg(long, env, default_value = "")]
    pub watch_namespace: WatchNamespace,

    /// Field manager recorded for the writes this operator performs
    #[arg(long, env, default_value = DEFAULT_FIELD_MANAGER)]
    pub field_manager: String,

    /// Delay before a Deployment is reconciled again after a write conflict
    #[arg(long, env, default_value = "1s", value_parser = humantime::parse_duration)]
    pub conflict_requeue_delay: Duration,

    /// Delay before a Deployment is reconciled again after a failed reconciliation
    #[arg(long, env, default_value = "30s", value_parser = humantime::parse_duration)]
    pub error_requeue_delay: Duration,

    /// Format of the log output
    #[arg(long, env, value_enum, default_value = "plain")]
    pub log_format: LogFormat,
}
