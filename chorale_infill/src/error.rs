// Error taxonomy for the infill pipeline.
//
// Every failure is local-origin and surfaced synchronously to the caller.
// Input problems are caught before any sampling begins; model problems are
// caught at the density-model boundary so a bad prediction never reaches the
// grid. There is no retry policy here: re-running an infill with fresh
// randomness is a caller decision.

use thiserror::Error;

/// Result type alias for infill operations.
pub type Result<T> = std::result::Result<T, InfillError>;

#[derive(Error, Debug)]
pub enum InfillError {
    /// Empty sequence, out-of-range voice/step/pitch, or a bad sampling
    /// parameter. Raised before any work is attempted.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The density model returned the wrong shape, or a masked cell's
    /// distribution was negative or not finite.
    #[error("Density model contract violation: {reason}")]
    ModelContractViolation { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("MIDI error: {0}")]
    Midi(#[from] midly::Error),
}

impl InfillError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        InfillError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn contract(reason: impl Into<String>) -> Self {
        InfillError::ModelContractViolation {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code for this error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            InfillError::InvalidInput { .. } => "INVALID_INPUT",
            InfillError::ModelContractViolation { .. } => "MODEL_CONTRACT_VIOLATION",
            InfillError::InvalidConfig { .. } => "INVALID_CONFIG",
            InfillError::Io(_) => "IO_ERROR",
            InfillError::Serialization(_) => "SERIALIZATION_ERROR",
            InfillError::Midi(_) => "MIDI_ERROR",
        }
    }
}
