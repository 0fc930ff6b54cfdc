use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "szero",
    author,
    version,
    about = "Temporarily scale down Deployments, StatefulSets and DaemonSets, and scale them back up"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output format of log messages written to stderr
    #[arg(long, global = true, value_enum, default_value_t, env = "SZERO_LOG_FORMAT")]
    pub log_format: LogFormat,

    // IMPORTANT: All (flattened) sub structs should be placed at the end to ensure the help
    // headings are correct.
    #[command(flatten)]
    pub cluster: ClusterOptions,

    #[command(flatten)]
    pub kinds: KindOptions,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Scale workloads down to zero, remembering their replica counts.
    #[command(visible_alias = "downscale")]
    Down(ToggleArguments),

    /// Scale previously downscaled workloads back up.
    #[command(visible_alias = "upscale")]
    Up(ToggleArguments),

    /// Restart the pods of Deployments and StatefulSets.
    Restart,

    /// Print the version of szero.
    Version,
}

#[derive(Debug, PartialEq, Eq, Args)]
#[command(next_help_heading = "Cluster Options")]
pub struct ClusterOptions {
    /// Path to the kubeconfig file, defaults to $KUBECONFIG or ~/.kube/config
    #[arg(short, long, global = true, value_name = "FILE")]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use instead of the current one
    #[arg(short, long, global = true)]
    pub context: Option<String>,

    /// Namespaces to operate on, defaults to the namespace of the selected context
    #[arg(
        short,
        long = "namespace",
        global = true,
        value_name = "NAMESPACE",
        value_delimiter = ','
    )]
    pub namespaces: Vec<String>,
}

#[derive(Debug, PartialEq, Eq, Args)]
#[command(next_help_heading = "Workload Options")]
pub struct KindOptions {
    /// Leave Deployments untouched
    #[arg(long, global = true)]
    pub skip_deployments: bool,

    /// Leave StatefulSets untouched
    #[arg(long, global = true)]
    pub skip_statefulsets: bool,

    /// Leave DaemonSets untouched
    #[arg(long, global = true)]
    pub skip_daemonsets: bool,
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct ToggleArguments {
    /// Wait until all workloads reached their new state
    #[arg(short, long)]
    pub wait: bool,

    /// How long to wait at most, for example `90s` or `10m`
    #[arg(short, long, default_value = "5m")]
    pub timeout: humantime::Duration,
}

impl ToggleArguments {
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait.then(|| self.timeout.into())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}
