//! Structured logging setup. stdio MCP transport uses stdin/stdout for the
//! JSON-RPC stream, so all log output is forced to stderr regardless of
//! verbosity.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_logging() -> Result<()> {
    init_logging_with_level(false, false)
}

pub fn init_logging_with_level(verbose: bool, quiet: bool) -> Result<()> {
    let filter_level = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("qpg=debug,info")
    } else {
        EnvFilter::new("qpg=warn,error")
    };

    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(!quiet)
        .with_ansi(false);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => Ok(()),
        Err(_) => Ok(()), // already initialized, fine under tests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_strings_parse() {
        for f in ["qpg=warn,error", "qpg=debug,info", "error"] {
            assert!(EnvFilter::try_new(f).is_ok());
        }
    }
}
