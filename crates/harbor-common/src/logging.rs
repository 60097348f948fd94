//! `tracing` subscriber setup for Harbor binaries and tests.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::HarborError;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for terminals.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// Newline-delimited JSON, for log shippers.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = HarborError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(HarborError::InvalidArgument(format!(
                "unknown log format '{other}'"
            ))),
        }
    }
}

/// How the global subscriber is built.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level used when neither `filter` nor `RUST_LOG` is set.
    pub level: Level,
    pub format: LogFormat,
    /// Source file and line on each event (pretty only).
    pub include_location: bool,
    /// Thread names on each event (pretty only).
    pub include_thread_names: bool,
    /// Emit span enter/close events.
    pub include_span_events: bool,
    /// Directive string such as `"harbor_sw=debug,reqwest=warn"`. Overrides
    /// `RUST_LOG`.
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            include_location: false,
            include_thread_names: false,
            include_span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn debug() -> Self {
        Self {
            level: Level::DEBUG,
            include_location: true,
            include_span_events: true,
            ..Default::default()
        }
    }

    pub fn trace() -> Self {
        Self {
            level: Level::TRACE,
            include_location: true,
            include_thread_names: true,
            include_span_events: true,
            ..Default::default()
        }
    }

    /// JSON at `info`.
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Json,
            ..Default::default()
        }
    }

    /// Map a `-v` count to a config: none is `warn`, one `debug`, more `trace`.
    pub fn for_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => Self {
                level: Level::WARN,
                ..Default::default()
            },
            1 => Self::debug(),
            _ => Self::trace(),
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string());
        match self.filter {
            Some(ref custom) => EnvFilter::try_new(custom).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let span_events = if self.include_span_events {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        match self.format {
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_file(self.include_location)
                .with_line_number(self.include_location)
                .with_thread_names(self.include_thread_names)
                .with_span_events(span_events)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .compact()
                .with_target(true)
                .with_span_events(span_events)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_events(span_events)
                .boxed(),
        }
    }
}

/// Install the global subscriber.
///
/// Fails if a global subscriber has already been installed.
pub fn init_logging(config: LogConfig) -> Result<(), HarborError> {
    tracing_subscriber::registry()
        .with(config.fmt_layer())
        .with(config.env_filter())
        .try_init()
        .map_err(|e| HarborError::config_with_source("logging already initialized", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(LogConfig::default().level, Level::INFO);
        assert!(!LogConfig::default().include_location);
        assert!(LogConfig::debug().include_location);
        assert_eq!(LogConfig::production().format, LogFormat::Json);
    }

    #[test]
    fn test_for_verbosity() {
        assert_eq!(LogConfig::for_verbosity(0).level, Level::WARN);
        assert_eq!(LogConfig::for_verbosity(1).level, Level::DEBUG);
        assert_eq!(LogConfig::for_verbosity(5).level, Level::TRACE);
    }

    #[test]
    fn test_filter_and_format_builders() {
        let config = LogConfig::default()
            .with_filter("harbor_sw=debug")
            .with_format(LogFormat::Compact);
        assert_eq!(config.filter.as_deref(), Some("harbor_sw=debug"));
        assert_eq!(config.format, LogFormat::Compact);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = LogConfig::default().with_filter("off");
        assert!(init_logging(config.clone()).is_ok());
        assert!(init_logging(config).is_err());
    }
}
