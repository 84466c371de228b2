//! Logging initialisation
//!
//! Installs a `tracing-subscriber` registry whose filter sits behind a
//! reload layer, so the MCP `logging/setLevel` method can change verbosity
//! while the process runs.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::config::{LogConfig, LogFormat};
use crate::error::{Error, Result};

/// MCP logging levels (RFC 5424 names)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LoggingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoggingLevel::Debug => "debug",
            LoggingLevel::Info => "info",
            LoggingLevel::Notice => "notice",
            LoggingLevel::Warning => "warning",
            LoggingLevel::Error => "error",
            LoggingLevel::Critical => "critical",
            LoggingLevel::Alert => "alert",
            LoggingLevel::Emergency => "emergency",
        }
    }

    pub fn to_tracing(self) -> Level {
        match self {
            LoggingLevel::Debug => Level::DEBUG,
            LoggingLevel::Info | LoggingLevel::Notice => Level::INFO,
            LoggingLevel::Warning => Level::WARN,
            LoggingLevel::Error
            | LoggingLevel::Critical
            | LoggingLevel::Alert
            | LoggingLevel::Emergency => Level::ERROR,
        }
    }
}

impl FromStr for LoggingLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LoggingLevel::Debug),
            "info" => Ok(LoggingLevel::Info),
            "notice" => Ok(LoggingLevel::Notice),
            "warning" | "warn" => Ok(LoggingLevel::Warning),
            "error" => Ok(LoggingLevel::Error),
            "critical" => Ok(LoggingLevel::Critical),
            "alert" => Ok(LoggingLevel::Alert),
            "emergency" => Ok(LoggingLevel::Emergency),
            other => Err(Error::invalid_argument(format!("unknown logging level: {}", other))),
        }
    }
}

/// Handle for changing the active log filter at runtime
#[derive(Clone)]
pub struct LogHandle {
    inner: reload::Handle<EnvFilter, Registry>,
    current: Arc<Mutex<String>>,
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle")
            .field("current", &self.current_filter())
            .finish()
    }
}

impl LogHandle {
    /// Replace the filter with a single level directive
    pub fn set_level(&self, level: LoggingLevel) -> Result<()> {
        let directive = level.to_tracing().as_str().to_ascii_lowercase();
        self.inner
            .reload(EnvFilter::new(&directive))
            .map_err(|e| Error::config(format!("failed to reload log filter: {}", e)))?;
        if let Ok(mut current) = self.current.lock() {
            *current = directive;
        }
        Ok(())
    }

    pub fn current_filter(&self) -> String {
        self.current
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

fn make_filter(level: &str) -> (EnvFilter, String) {
    match EnvFilter::try_new(level) {
        Ok(filter) => (filter, level.to_string()),
        Err(_) => (EnvFilter::new("info"), "info".to_string()),
    }
}

fn make_writer(output: &str, force_stderr: bool) -> Result<BoxMakeWriter> {
    let writer = match output {
        "stdout" if force_stderr => BoxMakeWriter::new(std::io::stderr),
        "stdout" | "" => BoxMakeWriter::new(std::io::stdout),
        "stderr" => BoxMakeWriter::new(std::io::stderr),
        path => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
    };
    Ok(writer)
}

/// Build the subscriber without installing it globally
pub fn build_subscriber(
    config: &LogConfig,
    force_stderr: bool,
) -> Result<(Box<dyn tracing::Subscriber + Send + Sync>, LogHandle)> {
    let (filter, directive) = make_filter(&config.level);
    let (filter_layer, inner) = reload::Layer::new(filter);
    let writer = make_writer(&config.output, force_stderr)?;
    let handle = LogHandle {
        inner,
        current: Arc::new(Mutex::new(directive)),
    };

    let registry = tracing_subscriber::registry().with(filter_layer);
    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = match config.format {
        LogFormat::Json => Box::new(
            registry.with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_current_span(false),
            ),
        ),
        LogFormat::Text => Box::new(
            registry.with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true)),
        ),
    };
    Ok((subscriber, handle))
}

/// Install the global subscriber. `force_stderr` redirects a `stdout`
/// destination to stderr (stdio transport owns stdout).
pub fn init_logging(config: &LogConfig, force_stderr: bool) -> Result<LogHandle> {
    let (subscriber, handle) = build_subscriber(config, force_stderr)?;
    subscriber
        .try_init()
        .map_err(|e| Error::config(format!("failed to install log subscriber: {}", e)))?;
    if handle.current_filter() != config.level {
        tracing::warn!("Invalid log level {:?}, falling back to info", config.level);
    }
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(LoggingLevel::Debug.to_tracing(), Level::DEBUG);
        assert_eq!(LoggingLevel::Notice.to_tracing(), Level::INFO);
        assert_eq!(LoggingLevel::Warning.to_tracing(), Level::WARN);
        assert_eq!(LoggingLevel::Emergency.to_tracing(), Level::ERROR);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("critical".parse::<LoggingLevel>().unwrap(), LoggingLevel::Critical);
        assert_eq!("WARN".parse::<LoggingLevel>().unwrap(), LoggingLevel::Warning);
        assert!("verbose".parse::<LoggingLevel>().is_err());
    }

    #[test]
    fn test_set_level_reloads_filter() {
        let config = LogConfig {
            output: "stderr".into(),
            ..LogConfig::default()
        };
        let (subscriber, handle) = build_subscriber(&config, false).unwrap();
        assert_eq!(handle.current_filter(), "info");

        tracing::subscriber::with_default(subscriber, || {
            handle.set_level(LoggingLevel::Warning).unwrap();
            assert_eq!(handle.current_filter(), "warn");
        });
    }

    #[test]
    fn test_invalid_level_falls_back_to_info() {
        let config = LogConfig {
            level: "svcmgr=loud".into(),
            output: "stderr".into(),
            ..LogConfig::default()
        };
        let (_subscriber, handle) = build_subscriber(&config, false).unwrap();
        assert_eq!(handle.current_filter(), "info");
    }

    #[test]
    fn test_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svcmgr.log");
        let config = LogConfig {
            output: path.to_string_lossy().into_owned(),
            format: LogFormat::Text,
            ..LogConfig::default()
        };
        let (subscriber, _handle) = build_subscriber(&config, false).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("hello from the test");
        });
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("hello from the test"));
    }
}
