use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChimeError {
    #[error("Invalid share code format: {0:?} (expected DS- followed by 6 of 0-9A-Z)")]
    InvalidCodeFormat(String),

    #[error("Audio output unavailable: {0}")]
    AudioUnavailable(String),

    #[error("Microphone unavailable: {0}")]
    MicrophoneUnavailable(String),

    #[error("End marker heard after only {received} of 6 symbols")]
    IncompleteDecode { received: usize },

    #[error("Symbol index {0} out of range")]
    OutOfRange(usize),

    #[error("No start marker heard before timeout")]
    Timeout,

    #[error("FFT error: {0}")]
    FftError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ChimeError {
    /// True for failures the caller is expected to fix by retrying the whole attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChimeError::IncompleteDecode { .. } | ChimeError::Timeout
        )
    }
}

pub type Result<T> = std::result::Result<T, ChimeError>;
