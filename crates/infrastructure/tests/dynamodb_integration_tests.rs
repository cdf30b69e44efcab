//! DynamoDB Local を使った統合テスト
//!
//! `DYNAMODB_ENDPOINT`（未指定なら http://localhost:8000）に接続できない場合はスキップする。

use anyhow::Result;
use aws_sdk_dynamodb::config::retry::RetryConfig;
use aws_sdk_dynamodb::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
};
use aws_sdk_dynamodb::Client;
use chrono::NaiveDate;
use domain::{Caller, NewTodo, TodoError, TodoFilter, TodoPatch, UserId};
use infrastructure::{DynamoDbClient, DynamoDbTodoStore, TodoRepository};
use std::time::Duration;

const TEST_TABLE: &str = "todo-records-test";

/// 接続できれば、テーブルを用意したうえでリポジトリを返す
async fn setup_test_repository() -> Option<TodoRepository<DynamoDbTodoStore>> {
    let endpoint = std::env::var("DYNAMODB_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:8000".to_string());

    let config = aws_sdk_dynamodb::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("ap-northeast-1"))
        .endpoint_url(&endpoint)
        .credentials_provider(Credentials::new("test", "test", None, None, "test"))
        .retry_config(RetryConfig::disabled())
        .build();
    let client = Client::from_conf(config);

    match tokio::time::timeout(Duration::from_secs(2), ensure_table(&client)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            println!("⚠ 統合テストスキップ (DynamoDB Local未起動?): {e}");
            return None;
        }
        Err(_) => {
            println!("⚠ 統合テストスキップ (DynamoDB Local応答なし): {endpoint}");
            return None;
        }
    }

    let store = DynamoDbTodoStore::new(DynamoDbClient::from_client(client, TEST_TABLE));
    Some(TodoRepository::new(store))
}

async fn ensure_table(client: &Client) -> Result<()> {
    let tables = client.list_tables().send().await?;
    if tables.table_names().iter().any(|name| name == TEST_TABLE) {
        return Ok(());
    }

    client
        .create_table()
        .table_name(TEST_TABLE)
        .billing_mode(BillingMode::PayPerRequest)
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name("PK")
                .key_type(KeyType::Hash)
                .build()?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name("SK")
                .key_type(KeyType::Range)
                .build()?,
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name("PK")
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name("SK")
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .send()
        .await?;
    println!("✓ テストテーブル作成: {TEST_TABLE}");
    Ok(())
}

/// 作成・一覧・更新・削除の一連の流れ
#[tokio::test]
async fn test_dynamodb_todo_lifecycle() -> Result<()> {
    let Some(repo) = setup_test_repository().await else {
        return Ok(());
    };
    let user = Caller::new(UserId::new());

    let created = repo
        .create(&user, NewTodo::new("Buy milk").with_priority(2))
        .await?;
    println!("✓ ToDo作成成功: {}", created.id);

    let fetched = repo.get(&created.id).await?;
    assert_eq!(fetched, created);

    let listed = repo.list_owned(&user, &TodoFilter::new()).await?;
    assert_eq!(listed, vec![created.clone()]);

    let updated = repo
        .update(&user, &created.id, TodoPatch::new().with_completed(true))
        .await?;
    assert!(updated.completed);
    assert!(updated.updated_at > created.updated_at);
    assert_eq!(repo.get(&created.id).await?, updated);
    println!("✓ ToDo更新成功");

    let unchanged = repo.update(&user, &created.id, TodoPatch::new()).await?;
    assert_eq!(unchanged.updated_at, updated.updated_at);

    repo.delete(&user, &created.id).await?;
    let err = repo.get(&created.id).await.unwrap_err();
    assert!(matches!(err, TodoError::NotFound(_)));
    println!("✓ ToDo削除成功");
    Ok(())
}

#[tokio::test]
async fn test_dynamodb_due_date_null_filter() -> Result<()> {
    let Some(repo) = setup_test_repository().await else {
        return Ok(());
    };
    let user = Caller::new(UserId::new());
    let owner = TodoFilter::new().with_owner(user.user_id().clone());

    repo.create(&user, NewTodo::new("undated")).await?;
    repo.create(
        &user,
        NewTodo::new("dated").with_due_date(NaiveDate::from_ymd_opt(2024, 3, 1)),
    )
    .await?;

    let undated = repo.list(&owner.clone().with_due_date(None)).await?;
    assert_eq!(undated.len(), 1);
    assert_eq!(undated[0].subject, "undated");

    let all = repo.list(&owner.with_limit(1).with_offset(1)).await?;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].subject, "undated");
    Ok(())
}

#[tokio::test]
async fn test_dynamodb_foreign_update_is_denied() -> Result<()> {
    let Some(repo) = setup_test_repository().await else {
        return Ok(());
    };
    let owner = Caller::new(UserId::new());
    let stranger = Caller::new(UserId::new());
    let todo = repo.create(&owner, NewTodo::new("mine")).await?;

    let err = repo
        .update(&stranger, &todo.id, TodoPatch::new().with_subject("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, TodoError::PermissionDenied));
    assert_eq!(repo.get(&todo.id).await?, todo);

    let err = repo.delete(&stranger, &todo.id).await.unwrap_err();
    assert!(matches!(err, TodoError::PermissionDenied));
    Ok(())
}

#[tokio::test]
async fn test_dynamodb_concurrent_patches_both_land() -> Result<()> {
    let Some(repo) = setup_test_repository().await else {
        return Ok(());
    };
    let user = Caller::new(UserId::new());
    let todo = repo.create(&user, NewTodo::new("shared")).await?;

    let (first, second) = tokio::join!(
        repo.update(&user, &todo.id, TodoPatch::new().with_completed(true)),
        repo.update(&user, &todo.id, TodoPatch::new().with_priority(9)),
    );
    first?;
    second?;

    let stored = repo.get(&todo.id).await?;
    assert!(stored.completed);
    assert_eq!(stored.priority, 9);
    println!("✓ 同時更新が両方反映された");
    Ok(())
}
