//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("flow error: {0}")]
    Flow(String),

    #[error("bot error: {0}")]
    Bot(String),

    #[error("portal error: {0}")]
    Portal(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("admin error: {0}")]
    Admin(String),

    #[error("subsystem error: {0}")]
    Subsystem(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<crate::store::StoreError> for AppError {
    fn from(e: crate::store::StoreError) -> Self {
        AppError::Store(e.to_string())
    }
}

impl From<crate::process::ProcessError> for AppError {
    fn from(e: crate::process::ProcessError) -> Self {
        AppError::Process(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("config error"));
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn store_error_display() {
        let e = AppError::Store("collection unreachable".into());
        assert!(e.to_string().contains("collection unreachable"));
    }

    #[test]
    fn portal_error_display() {
        let e = AppError::Portal("bind failed".into());
        assert!(e.to_string().contains("bind failed"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }
}
