pub type KinetexResult<T> = Result<T, KinetexError>;

#[derive(thiserror::Error, Debug)]
pub enum KinetexError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authoring error: {0}")]
    Authoring(String),

    #[error("content compile error: {0}")]
    Compile(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KinetexError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn authoring(msg: impl Into<String>) -> Self {
        Self::Authoring(msg.into())
    }

    pub fn compile(msg: impl Into<String>) -> Self {
        Self::Compile(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}
