use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("http client construction failed: {0}")]
    HttpClient(String),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn http_client(message: impl Into<String>) -> Self {
        Self::HttpClient(message.into())
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
