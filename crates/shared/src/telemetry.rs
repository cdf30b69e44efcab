use crate::errors::{error_metadata, ErrorSeverity};
use domain::{Caller, TodoError};
use std::error::Error as _;
use tracing::{error, info};

/// 操作失敗をログに記録
///
/// サーバー側の失敗は原因チェーンを含めて error、
/// 呼び出し元起因の失敗は info で出す。
pub fn log_todo_error(caller: &Caller, operation: &str, err: &TodoError) {
    let meta = error_metadata(err);
    let user_id = caller.user_id().as_str();
    let request_id = caller.request_id().unwrap_or("none");

    match meta.severity {
        ErrorSeverity::Error => {
            let cause = err
                .source()
                .and_then(|e| e.source())
                .map(|e| e.to_string())
                .unwrap_or_default();
            error!(
                operation,
                user_id,
                request_id,
                code = meta.code,
                error = %err,
                cause = %cause,
                "Todo operation failed"
            );
        }
        ErrorSeverity::Info => {
            info!(
                operation,
                user_id,
                request_id,
                code = meta.code,
                error = %err,
                "Todo operation rejected"
            );
        }
    }
}

/// ストア操作の所要時間と結果を記録
pub async fn trace_store_operation<T, E, F, Fut>(
    backend: &str,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start_time = std::time::Instant::now();
    let result = operation().await;
    let duration = start_time.elapsed();

    match &result {
        Ok(_) => {
            tracing::debug!(
                backend,
                operation = operation_name,
                duration_ms = duration.as_millis() as u64,
                "Store operation completed"
            );
        }
        Err(e) => {
            error!(
                backend,
                operation = operation_name,
                duration_ms = duration.as_millis() as u64,
                error = %e,
                "Store operation failed"
            );
        }
    }

    result
}
