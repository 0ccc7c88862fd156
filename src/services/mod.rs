pub mod file_service;
pub mod locks;

use crate::error::AppError;
use std::future::Future;

/// Run `fut` on its own task and wait for it.
///
/// Dropping the caller (a client hanging up) does not cancel the task, so a
/// storage mutation that has started always reaches its metadata step or
/// its compensation.
pub async fn run_to_completion<T, F>(fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| AppError::Internal(format!("File operation task failed: {}", e)))?
}
