// src/error.rs
// Fatal error taxonomy and non-fatal run warnings

use serde::Serialize;

/// Fatal errors, returned as values before any simulation runs.
///
/// A run either refuses to start with one of these, or completes (possibly
/// cancelled) with a result. Nothing is ever thrown across the run boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// The graph itself is malformed: a flow cycle outside a loop construct,
    /// an edge between incompatible port kinds, or multiple writers into one
    /// non-flow input.
    #[error("structural graph error: {reason}")]
    StructuralGraph { reason: String },

    /// The run request is unusable: missing settings, empty data series,
    /// empty optimization parameter space.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl EngineError {
    pub fn structural(reason: impl Into<String>) -> Self {
        EngineError::StructuralGraph {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        EngineError::Configuration {
            reason: reason.into(),
        }
    }
}

/// Custom indicator import failure with a human-readable reason.
#[derive(Debug, Clone, thiserror::Error)]
#[error("indicator import failed: {reason}")]
pub struct ImportError {
    pub reason: String,
}

impl ImportError {
    pub fn new(reason: impl Into<String>) -> Self {
        ImportError {
            reason: reason.into(),
        }
    }
}

/// A non-fatal condition collected during a run.
///
/// Warnings never stop the simulation; they ride along on the result so the
/// caller can surface them next to the trades and metrics.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    /// Bar time the warning was raised at (0 for pre-run validation warnings).
    pub time: i64,
    pub message: String,
}

impl Warning {
    pub fn new(time: i64, message: impl Into<String>) -> Self {
        Warning {
            time,
            message: message.into(),
        }
    }

    /// Warning raised before the bar loop starts.
    pub fn pre_run(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = EngineError::structural("cycle through and_1 -> or_2 -> and_1");
        assert!(e.to_string().contains("structural graph error"));

        let e = EngineError::config("no bars in requested range");
        assert!(e.to_string().contains("configuration error"));
    }

    #[test]
    fn test_warning_serializes_camel_case() {
        let w = Warning::new(1000, "loop cap exceeded");
        let json = serde_json::to_string(&w).unwrap();
        assert!(json.contains("\"message\""));
        assert!(json.contains("\"time\""));
    }
}
