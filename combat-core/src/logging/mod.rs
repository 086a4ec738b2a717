//! Structured logging via `tracing`.
//!
//! Conventions used across the combat crates: state transitions at `trace`,
//! silently rejected actions and requests at `debug`, hit outcomes at
//! `debug`, anomaly corrections at `warn`.
//!
//! Environment:
//! - `RUST_LOG` replaces the configured filter entirely
//! - `DUEL_LOG_LEVEL` sets the default level (`trace` .. `error`)
//! - `DUEL_VERBOSE=1` selects [`TracingConfig::verbose`]

use std::str::FromStr;
use std::sync::Once;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Filter and format for the global subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracingConfig {
    pub default_level: LogLevel,
    /// `(module path, level)` overrides, most specific last
    pub module_filters: Vec<(String, LogLevel)>,
    pub show_targets: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: LogLevel::Info,
            module_filters: Vec::new(),
            show_targets: true,
        }
        .with_module("combat_core", LogLevel::Info)
        .with_module("combat_server", LogLevel::Info)
    }
}

impl TracingConfig {
    /// Every state transition of every machine plus authority decisions.
    pub fn verbose() -> Self {
        Self {
            default_level: LogLevel::Debug,
            ..Self::default()
        }
        .with_module("combat_core::machine", LogLevel::Trace)
        .with_module("combat_server::authority", LogLevel::Debug)
    }

    pub fn from_env() -> Self {
        let mut config = if std::env::var("DUEL_VERBOSE").is_ok_and(|v| v == "1") {
            Self::verbose()
        } else {
            Self::default()
        };
        if let Ok(raw) = std::env::var("DUEL_LOG_LEVEL") {
            match raw.parse() {
                Ok(level) => config.default_level = level,
                Err(e) => eprintln!("ignoring DUEL_LOG_LEVEL: {e}"),
            }
        }
        config
    }

    pub fn with_module(mut self, module: impl Into<String>, level: LogLevel) -> Self {
        let module = module.into();
        self.module_filters.retain(|(m, _)| *m != module);
        self.module_filters.push((module, level));
        self
    }

    pub fn to_env_filter_string(&self) -> String {
        std::iter::once(self.default_level.as_str().to_string())
            .chain(
                self.module_filters
                    .iter()
                    .map(|(module, level)| format!("{module}={}", level.as_str())),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

static TRACING_INIT: Once = Once::new();

/// Install the global subscriber. Only the first call in a process has an
/// effect; later calls are no-ops.
pub fn init_tracing(config: &TracingConfig) {
    let filter_str = config.to_env_filter_string();
    let show_targets = config.show_targets;
    TRACING_INIT.call_once(move || {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));
        // Bevy's LogPlugin may already own the global slot
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(show_targets)
            .compact()
            .try_init();
    });
}

pub fn init_tracing_default() {
    init_tracing(&TracingConfig::default());
}

/// Installs the subscriber as soon as it is added to an app.
#[derive(Debug, Clone, Default)]
pub struct LoggingPlugin {
    pub config: TracingConfig,
}

impl LoggingPlugin {
    pub fn from_env() -> Self {
        Self {
            config: TracingConfig::from_env(),
        }
    }
}

impl Plugin for LoggingPlugin {
    fn build(&self, _app: &mut App) {
        init_tracing(&self.config);
    }
}

/// Keeps a `debug` span named after a combat operation entered until dropped.
pub struct TimingSpan {
    _span: tracing::span::EnteredSpan,
}

impl TimingSpan {
    pub fn new(operation: &'static str) -> Self {
        Self {
            _span: tracing::debug_span!("combat_op", operation).entered(),
        }
    }
}
