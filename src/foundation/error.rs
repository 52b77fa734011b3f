pub type CrossfadeResult<T> = Result<T, CrossfadeError>;

#[derive(thiserror::Error, Debug)]
pub enum CrossfadeError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("load error: {0}")]
    Load(String),

    #[error("distribution error: {0}")]
    Distribution(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrossfadeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    pub fn distribution(msg: impl Into<String>) -> Self {
        Self::Distribution(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }
}
