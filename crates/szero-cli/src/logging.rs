use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, Registry, filter::Directive, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::cli::LogFormat;

/// Environment variable holding the log filter directives, for example `szero=debug`.
pub const LOG_ENV_VAR: &str = "SZERO_LOG";

/// Installs the global subscriber writing log events to stderr.
///
/// Stdout stays reserved for command output.
pub fn initialize(format: LogFormat) {
    let registry = Registry::default().with(env_filter_builder(LOG_ENV_VAR, LevelFilter::INFO));

    match format {
        LogFormat::Plain => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

fn env_filter_builder(env_var: &str, default_directive: impl Into<Directive>) -> EnvFilter {
    EnvFilter::builder()
        .with_env_var(env_var)
        .with_default_directive(default_directive.into())
        .from_env_lossy()
}
