use thiserror::Error;

#[derive(Debug, Error)]
pub enum TvoError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Degenerate slope fit: {points} point(s) in fit range")]
    DegenerateFit { points: usize },

    #[error("Transmit slope is zero, distortion score undefined")]
    ZeroReferenceSlope,

    #[error("FFT error: {0}")]
    FftError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Trial failed: {0}")]
    Trial(String),
}

impl TvoError {
    /// Errors that only invalidate the sample of a single trial.
    ///
    /// Everything else aborts a calibration run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TvoError::InvalidInput(_) | TvoError::DegenerateFit { .. } | TvoError::FftError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TvoError>;
