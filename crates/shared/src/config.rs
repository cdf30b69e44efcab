use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub dynamodb_table: String,
    pub environment: String,
    pub aws_region: String,
    /// DynamoDB Local などの接続先（未指定なら AWS 既定のエンドポイント）
    pub dynamodb_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 任意の取得関数から設定を組み立てる（テスト用に環境変数を差し替えられる）
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dynamodb_table = lookup("DYNAMODB_TABLE")
            .unwrap_or_else(|| "todo-records-dev".to_string());
        if dynamodb_table.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "DYNAMODB_TABLE",
                value: dynamodb_table,
            });
        }

        let dynamodb_endpoint = lookup("DYNAMODB_ENDPOINT").filter(|s| !s.trim().is_empty());
        if let Some(endpoint) = &dynamodb_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    key: "DYNAMODB_ENDPOINT",
                    value: endpoint.clone(),
                });
            }
        }

        Ok(Config {
            dynamodb_table,
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "dev".to_string()),
            aws_region: lookup("AWS_REGION").unwrap_or_else(|| "ap-northeast-1".to_string()),
            dynamodb_endpoint,
        })
    }
}
