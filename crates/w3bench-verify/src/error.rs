#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("invalid SHA256 hash: {0}")]
    InvalidHash(String),
}

pub type Result<T> = std::result::Result<T, VerifyError>;
