use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, ErrorDetails};

/// Set up logs. The level comes from the config (overridable with
/// `RUST_LOG`); the format is `text` or `json` per `log_format`.
pub fn setup_logs(log_level: &str, log_format: &str) -> Result<(), Error> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().or_else(|_| {
        tracing_subscriber::EnvFilter::try_new(format!("openmodel={log_level},warn")).map_err(
            |e| {
                Error::new(ErrorDetails::Observability {
                    message: format!("Invalid log level {log_level:?}: {e}"),
                })
            },
        )
    })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match log_format {
        "json" => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_target(false),
            )
            .try_init(),
        "text" => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        other => {
            return Err(Error::new(ErrorDetails::Observability {
                message: format!("Invalid log format {other:?} (expected \"text\" or \"json\")"),
            }))
        }
    };
    result.map_err(|e| {
        Error::new(ErrorDetails::Observability {
            message: format!("Failed to initialize logging: {e}"),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_format() {
        let error = setup_logs("info", "xml").unwrap_err();
        assert!(error.to_string().contains("xml"));
    }

    #[test]
    fn test_rejects_bad_level() {
        let error = setup_logs("not a level!!", "text").unwrap_err();
        assert!(error.to_string().contains("Invalid log level"));
    }
}
