use thiserror::Error;

/// Errors surfaced by the control side of the engine.
///
/// Nothing on the per-block audio path returns one of these; they come from
/// preparation, parameter lookup, configuration and state persistence.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid sample rate {0} (must be finite and > 0)")]
    InvalidSampleRate(f64),

    #[error("Invalid block size {0} (must be > 0)")]
    InvalidBlockSize(usize),

    #[error("Invalid channel count {0} (must be > 0)")]
    InvalidChannelCount(usize),

    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("Malformed state: {0}")]
    State(#[source] serde_json::Error),

    #[error("Unsupported state version {0}")]
    StateVersion(u32),

    #[error("Invalid engine config: {0}")]
    Config(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::State(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        let e = EngineError::UnknownParameter("warp".to_string());
        assert_eq!(e.to_string(), "Unknown parameter 'warp'");

        let e = EngineError::InvalidSampleRate(-1.0);
        assert!(e.to_string().contains("-1"), "got {e}");
    }

    #[test]
    fn json_errors_convert_to_state_errors() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let e: EngineError = bad.into();
        assert!(matches!(e, EngineError::State(_)));
    }
}
