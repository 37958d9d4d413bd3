//! DynamoDB-backed data store.
//!
//! Each scoped client is an `aws_sdk_dynamodb::Client` configured with the
//! region, the static scoped credential and a standard retry policy capped at
//! the configured max attempts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_smithy_types::timeout::TimeoutConfig;
use serde_json::Value;
use tracing::debug;

use super::schema::{Record, RecordKey};
use super::store::{ClientConfig, DataStore, Filter, QueryRequest, StoreConnector, StoreError};

type Item = HashMap<String, AttributeValue>;

/// Builds one DynamoDB client per scoped credential.
#[derive(Debug, Clone, Default)]
pub struct DynamoDbConnector {
    /// Per-operation timeout, including retries.
    pub operation_timeout: Option<Duration>,
}

#[async_trait]
impl StoreConnector for DynamoDbConnector {
    async fn connect(&self, config: &ClientConfig) -> Result<Arc<dyn DataStore>, StoreError> {
        Ok(Arc::new(
            DynamoDbStore::connect(config, self.operation_timeout).await,
        ))
    }
}

#[derive(Clone)]
pub struct DynamoDbStore {
    client: Client,
}

impl std::fmt::Debug for DynamoDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbStore").finish_non_exhaustive()
    }
}

impl DynamoDbStore {
    pub async fn connect(config: &ClientConfig, operation_timeout: Option<Duration>) -> Self {
        let credential = &config.credential;
        let credentials = Credentials::new(
            credential.access_key_id.clone(),
            credential.secret_access_key.clone(),
            credential.session_token.clone(),
            credential.expiration.map(SystemTime::from),
            "deckvault-scoped",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_attempts.max(1)))
            .load()
            .await;

        debug!(
            region = %config.region,
            access_key = %credential.masked_access_key(),
            max_attempts = config.max_attempts,
            "DynamoDB client built"
        );

        Self::from_sdk_config(&sdk_config, config.endpoint.as_deref(), operation_timeout)
    }

    /// Client using the ambient credential chain (environment, profile, instance role).
    pub async fn ambient(
        region: &str,
        endpoint: Option<&str>,
        max_attempts: u32,
        operation_timeout: Option<Duration>,
    ) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .retry_config(RetryConfig::standard().with_max_attempts(max_attempts.max(1)))
            .load()
            .await;

        debug!(region, "DynamoDB client built from ambient credentials");
        Self::from_sdk_config(&sdk_config, endpoint, operation_timeout)
    }

    fn from_sdk_config(
        sdk_config: &aws_config::SdkConfig,
        endpoint: Option<&str>,
        operation_timeout: Option<Duration>,
    ) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

        // Apply endpoint override if configured (e.g. LocalStack)
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if let Some(timeout) = operation_timeout {
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(timeout)
                .build();
            builder = builder.timeout_config(timeout_config);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

/// Map an SDK failure onto a [`StoreError`] by its service error code.
fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = match &err {
        SdkError::ServiceError(service) => service.err().code().map(str::to_string),
        _ => None,
    };
    let message = format!("DynamoDB {operation} failed: {}", DisplayErrorContext(&err));

    match code.as_deref() {
        Some(
            "AccessDeniedException"
            | "UnrecognizedClientException"
            | "ExpiredTokenException"
            | "MissingAuthenticationTokenException"
            | "InvalidSignatureException",
        ) => StoreError::AccessDenied(message),
        Some("ValidationException") => StoreError::Validation(message),
        Some(
            "ProvisionedThroughputExceededException"
            | "ThrottlingException"
            | "RequestLimitExceeded",
        ) => StoreError::Throttled(message),
        Some("ConditionalCheckFailedException") => StoreError::ConditionFailed(message),
        _ => StoreError::Backend(message),
    }
}

/// Convert a single DynamoDB AttributeValue to JSON Value
fn attr_to_json(attr: &AttributeValue) -> Option<Value> {
    match attr {
        AttributeValue::S(s) => Some(Value::String(s.clone())),
        AttributeValue::N(n) => {
            // Try to parse as i64 first, then f64
            if let Ok(i) = n.parse::<i64>() {
                Some(Value::Number(i.into()))
            } else if let Ok(f) = n.parse::<f64>() {
                serde_json::Number::from_f64(f).map(Value::Number)
            } else {
                None
            }
        }
        AttributeValue::Bool(b) => Some(Value::Bool(*b)),
        AttributeValue::Null(_) => Some(Value::Null),
        AttributeValue::L(list) => Some(Value::Array(
            list.iter().filter_map(attr_to_json).collect(),
        )),
        AttributeValue::M(map) => Some(Value::Object(item_to_record(map))),
        AttributeValue::Ss(set) => Some(Value::Array(
            set.iter().cloned().map(Value::String).collect(),
        )),
        _ => None, // Skip binary and other types
    }
}

fn json_to_attr(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(json_to_attr).collect()),
        Value::Object(map) => AttributeValue::M(record_to_item(map)),
    }
}

fn item_to_record(item: &Item) -> Record {
    item.iter()
        .filter_map(|(k, v)| attr_to_json(v).map(|value| (k.clone(), value)))
        .collect()
}

fn record_to_item(record: &Record) -> Item {
    record
        .iter()
        .map(|(k, v)| (k.clone(), json_to_attr(v)))
        .collect()
}

fn key_item(key: &RecordKey) -> Item {
    key.parts()
        .map(|part| (part.name.clone(), json_to_attr(&part.value)))
        .collect()
}

/// Placeholder names and values for an expression.
#[derive(Default)]
struct Expression {
    names: HashMap<String, String>,
    values: Item,
}

impl Expression {
    /// `#<prefix><n> = :<prefix><n>` for one field.
    fn equals(&mut self, prefix: &str, field: &str, value: &Value) -> String {
        let n = self.names.len();
        let name = format!("#{prefix}{n}");
        let placeholder = format!(":{prefix}{n}");
        self.names.insert(name.clone(), field.to_string());
        self.values.insert(placeholder.clone(), json_to_attr(value));
        format!("{name} = {placeholder}")
    }

    fn filter(&mut self, filter: &Filter) -> Option<String> {
        if filter.is_empty() {
            return None;
        }
        let clauses: Vec<String> = filter
            .conditions()
            .iter()
            .map(|(field, value)| self.equals("f", field, value))
            .collect();
        Some(clauses.join(" AND "))
    }

    fn names(&self) -> Option<HashMap<String, String>> {
        (!self.names.is_empty()).then(|| self.names.clone())
    }

    fn values(&self) -> Option<Item> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }
}

#[async_trait]
impl DataStore for DynamoDbStore {
    async fn put_item(&self, table: &str, _key: &RecordKey, item: Record) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(record_to_item(&item)))
            .send()
            .await
            .map_err(|e| classify("PutItem", e))?;
        Ok(())
    }

    async fn get_item(&self, table: &str, key: &RecordKey) -> Result<Option<Record>, StoreError> {
        let response = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(key_item(key)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| classify("GetItem", e))?;

        Ok(response.item().map(item_to_record))
    }

    async fn update_item(
        &self,
        table: &str,
        key: &RecordKey,
        changes: Record,
    ) -> Result<Record, StoreError> {
        if changes.is_empty() {
            return Err(StoreError::Validation("update with no changes".to_string()));
        }

        let mut expr = Expression::default();
        let assignments: Vec<String> = changes
            .iter()
            .map(|(field, value)| expr.equals("u", field, value))
            .collect();
        let pk_name = format!("#pk{}", expr.names.len());
        expr.names.insert(pk_name.clone(), key.partition.name.clone());

        let response = self
            .client
            .update_item()
            .table_name(table)
            .set_key(Some(key_item(key)))
            .update_expression(format!("SET {}", assignments.join(", ")))
            .condition_expression(format!("attribute_exists({pk_name})"))
            .set_expression_attribute_names(expr.names())
            .set_expression_attribute_values(expr.values())
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| classify("UpdateItem", e))?;

        Ok(response.attributes().map(item_to_record).unwrap_or_default())
    }

    async fn delete_item(&self, table: &str, key: &RecordKey) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(table)
            .set_key(Some(key_item(key)))
            .send()
            .await
            .map_err(|e| classify("DeleteItem", e))?;
        Ok(())
    }

    async fn query(&self, table: &str, request: &QueryRequest) -> Result<Vec<Record>, StoreError> {
        let mut expr = Expression::default();
        let key_condition = expr.equals("k", &request.key_name, &request.key_value);
        let filter = expr.filter(&request.filter);

        let mut records = Vec::new();
        let mut last_evaluated_key = None;

        loop {
            let mut builder = self
                .client
                .query()
                .table_name(table)
                .set_index_name(request.index.clone())
                .key_condition_expression(&key_condition)
                .set_filter_expression(filter.clone())
                .set_expression_attribute_names(expr.names())
                .set_expression_attribute_values(expr.values());

            if let Some(key) = last_evaluated_key.take() {
                builder = builder.set_exclusive_start_key(Some(key));
            }

            let response = builder.send().await.map_err(|e| classify("Query", e))?;
            records.extend(response.items().iter().map(item_to_record));

            if let Some(limit) = request.limit
                && records.len() >= limit
            {
                records.truncate(limit);
                break;
            }

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => {
                    last_evaluated_key = Some(key.clone());
                }
                _ => break,
            }
        }

        Ok(records)
    }

    async fn scan(&self, table: &str, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        let mut expr = Expression::default();
        let filter_expression = expr.filter(filter);

        let mut records = Vec::new();
        let mut last_evaluated_key = None;

        loop {
            let mut builder = self
                .client
                .scan()
                .table_name(table)
                .set_filter_expression(filter_expression.clone())
                .set_expression_attribute_names(expr.names())
                .set_expression_attribute_values(expr.values());

            if let Some(key) = last_evaluated_key.take() {
                builder = builder.set_exclusive_start_key(Some(key));
            }

            let response = builder.send().await.map_err(|e| classify("Scan", e))?;
            records.extend(response.items().iter().map(item_to_record));

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => {
                    last_evaluated_key = Some(key.clone());
                }
                _ => break,
            }
        }

        Ok(records)
    }
}
