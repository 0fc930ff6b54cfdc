use clap::{Parser, crate_version};
use snafu::{ResultExt, Snafu};
use szero::{client::KubeAccessor, toggle::Operation};

use crate::{
    cli::{Cli, Command},
    commands::RunConfig,
};

mod cli;
mod commands;
mod kubeconfig;
mod logging;

/// Recorded as the field manager of every write.
const FIELD_MANAGER: &str = "szero";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to connect to the cluster"))]
    Connect { source: kubeconfig::Error },

    #[snafu(display("failed to {operation} workloads"))]
    Run {
        source: commands::Error,
        operation: Operation,
    },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    let (operation, wait_timeout) = match &cli.command {
        Command::Version => {
            println!("szero {}", crate_version!());
            return Ok(());
        }
        Command::Down(arguments) => (Operation::Downscale, arguments.wait_timeout()),
        Command::Up(arguments) => (Operation::Upscale, arguments.wait_timeout()),
        Command::Restart => (Operation::Restart, None),
    };

    logging::initialize(cli.log_format);

    let cluster = kubeconfig::connect(
        cli.cluster.kubeconfig.as_deref(),
        cli.cluster.context.as_deref(),
    )
    .await
    .context(ConnectSnafu)?;
    let config = RunConfig::new(
        &cli.cluster,
        &cli.kinds,
        &cluster.default_namespace,
        wait_timeout,
    );
    tracing::info!(%operation, namespaces = ?config.namespaces, "Running command");

    let accessor = KubeAccessor::new(cluster.client, Some(FIELD_MANAGER.to_owned()));
    match operation {
        Operation::Downscale => commands::downscale(accessor, &config).await,
        Operation::Upscale => commands::upscale(accessor, &config).await,
        Operation::Restart => commands::restart(accessor, &config).await,
    }
    .context(RunSnafu { operation })
}
