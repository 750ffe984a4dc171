#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine is not ready")]
    EngineNotReady,

    #[error("Pack discovery failed: {cause}")]
    PackDiscovery { cause: String },

    #[error("Pack load failed: {cause}")]
    PackLoad { cause: String },

    #[error("No pack loaded")]
    NoPackLoaded,

    #[error("Engine is busy loading a pack")]
    Busy,

    #[error("Pack load cancelled")]
    Cancelled,

    #[error("Engine channel error: {0}")]
    Channel(String),
}

impl EngineError {
    /// Failures of an attempted load step, as opposed to rejected preconditions.
    pub fn is_step_failure(&self) -> bool {
        matches!(
            self,
            EngineError::PackDiscovery { .. } | EngineError::PackLoad { .. }
        )
    }
}
