use thiserror::Error;

/// Everything that can stop a solve before or during the search. Parser and
/// validator failures leave the frontier untouched; `PositionLimitReached`
/// and `UserAborted` are the two in-flight terminations and surface to the
/// host as `Abort` rather than `Error` messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    #[error("invalid vocabulary `{0}`; expected C, E or P")]
    InvalidVocabulary(String),

    #[error("invalid limit `{value}`: {reason}")]
    InvalidLimit { value: String, reason: String },

    #[error("invalid file `{0}`")]
    InvalidFile(String),

    #[error("invalid FEN `{fen}`: {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("invalid steno near `{at}`: {reason}")]
    InvalidSteno { at: String, reason: String },

    #[error("invalid checkpoint chunk: {0}")]
    InvalidCheckpointChunk(String),

    #[error("position limit reached with {0} positions in the frontier")]
    PositionLimitReached(usize),

    #[error("solve aborted by the user")]
    UserAborted,
}

impl SolveError {
    pub fn steno(at: impl Into<String>, reason: impl Into<String>) -> Self {
        SolveError::InvalidSteno {
            at: at.into(),
            reason: reason.into(),
        }
    }

    pub fn fen(fen: impl Into<String>, reason: impl Into<String>) -> Self {
        SolveError::InvalidFen {
            fen: fen.into(),
            reason: reason.into(),
        }
    }

    /// True for the terminations that are reported as `Abort` (the solve ran
    /// and was stopped) rather than `Error` (the solve never started).
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            SolveError::PositionLimitReached(_) | SolveError::UserAborted
        )
    }
}
