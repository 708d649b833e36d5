#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {name}")]
    NotFound { entity: &'static str, name: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// A backing component could not answer in time or at all.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn alarm_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "Alarm",
            name: name.into(),
        }
    }
}
