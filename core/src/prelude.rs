/// Common error type for setup and event processing.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("detector mismatch: expected {expected}, found {found}")]
    DetectorMismatch { expected: String, found: String },
    #[error("unknown detector: {0}")]
    UnknownDetector(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Setup-time sanity check. Derived quantities are filled in here, so a
/// component must be validated once before it is used in an event.
pub trait Validate {
    fn validate(&mut self) -> EngineResult<()>;
}
