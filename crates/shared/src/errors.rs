use domain::TodoError;

/// エラーの重要度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// 呼び出し元起因（存在しない・権限なし）
    Info,
    /// サーバー側の失敗
    Error,
}

/// 境界（HTTP 層など）へ渡すエラー情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMetadata {
    /// エラーコード
    pub code: &'static str,
    pub severity: ErrorSeverity,
    /// 呼び出し元に見せてよいメッセージ
    pub public_message: String,
}

/// `TodoError` からメタデータを取得
///
/// ストレージ障害の原因は公開メッセージに含めない。
pub fn error_metadata(error: &TodoError) -> ErrorMetadata {
    match error {
        TodoError::NotFound(id) => ErrorMetadata {
            code: "NOT_FOUND",
            severity: ErrorSeverity::Info,
            public_message: format!("ID '{id}' not found."),
        },
        TodoError::PermissionDenied => ErrorMetadata {
            code: "PERMISSION_DENIED",
            severity: ErrorSeverity::Info,
            public_message: "Permission denied.".to_string(),
        },
        TodoError::Storage(_) => ErrorMetadata {
            code: "STORAGE_FAILURE",
            severity: ErrorSeverity::Error,
            public_message: "Internal server error.".to_string(),
        },
    }
}
