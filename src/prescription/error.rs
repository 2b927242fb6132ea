use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrescriptionError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("failed to load bundled {file}: {message}")]
    Data { file: &'static str, message: String },
}
