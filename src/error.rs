//! Per-tick sampling failures.

use thiserror::Error;

/// Why a tick produced no derived value.
///
/// None of these are fatal: the engine logs them, publishes nothing for the
/// tick and leaves the sampler's previous-sample state untouched.
#[derive(Debug, Error)]
pub enum SampleError {
    /// The counter source could not be opened or read.
    #[error("source {source_name} unavailable: {error}")]
    SourceUnavailable {
        source_name: String,
        #[source]
        error: anyhow::Error,
    },

    /// The source was read but did not contain what we expected.
    #[error("malformed sample: {0}")]
    MalformedSample(String),

    /// Two ticks resolved to the same instant, so no rate is defined.
    #[error("no time elapsed since previous sample")]
    ZeroElapsedTime,
}

impl SampleError {
    pub fn unavailable(source_name: impl Into<String>, error: anyhow::Error) -> Self {
        SampleError::SourceUnavailable {
            source_name: source_name.into(),
            error,
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        SampleError::MalformedSample(msg.into())
    }
}

pub type SampleResult<T> = std::result::Result<T, SampleError>;
