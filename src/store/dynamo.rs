//! DynamoDB binding for the counter store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use tokio::time::timeout;
use tracing::trace;

use super::{BucketWrite, CounterStore, StoreError};
use crate::bucket::RawBucket;

const ATTR_CLIENT_ID: &str = "clientId";
const ATTR_TOKENS: &str = "tokens";
const ATTR_LAST_REFILL: &str = "lastRefill";
const ATTR_REFILL_RATE: &str = "refillRate";
const ATTR_REFILL_INTERVAL: &str = "refillInterval";
const ATTR_MAX_TOKENS: &str = "maxTokens";

/// Counter store backed by a DynamoDB table keyed by `clientId`.
///
/// Every call is bounded by `call_timeout`; the SDK's connection pool
/// and keep-alive handle the rest.
pub struct DynamoCounterStore {
    client: Client,
    call_timeout: Duration,
}

impl DynamoCounterStore {
    /// Create a store from the ambient AWS configuration (credentials
    /// from environment, config files, instance metadata).
    pub async fn new(call_timeout: Duration) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self {
            client: Client::new(&aws_config),
            call_timeout,
        }
    }

    /// Create a store from an existing SDK configuration.
    pub fn with_aws_config(aws_config: &aws_config::SdkConfig, call_timeout: Duration) -> Self {
        Self {
            client: Client::new(aws_config),
            call_timeout,
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.call_timeout.as_millis() as u64
    }

    /// Numeric attribute, or `None` when absent or unparseable.
    /// Garbage values are sanitized away downstream.
    fn read_number(item: &HashMap<String, AttributeValue>, attr: &str) -> Option<f64> {
        match item.get(attr) {
            Some(AttributeValue::N(n)) => n.parse::<f64>().ok(),
            _ => None,
        }
    }
}

#[async_trait]
impl CounterStore for DynamoCounterStore {
    async fn get(&self, table: &str, client_id: &str) -> Result<Option<RawBucket>, StoreError> {
        trace!(table = %table, client_id = %client_id, "GetItem");

        let call = self
            .client
            .get_item()
            .table_name(table)
            .key(ATTR_CLIENT_ID, AttributeValue::S(client_id.to_string()))
            .send();

        let output = timeout(self.call_timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout_ms()))?
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(output.item.map(|item| RawBucket {
            tokens: Self::read_number(&item, ATTR_TOKENS),
            last_refill: Self::read_number(&item, ATTR_LAST_REFILL)
                .filter(|v| *v >= 0.0)
                .map(|v| v as u64),
            refill_rate: Self::read_number(&item, ATTR_REFILL_RATE),
            refill_interval: Self::read_number(&item, ATTR_REFILL_INTERVAL),
            max_tokens: Self::read_number(&item, ATTR_MAX_TOKENS),
        }))
    }

    async fn update(
        &self,
        table: &str,
        client_id: &str,
        write: &BucketWrite,
        expected_last_refill: Option<u64>,
    ) -> Result<(), StoreError> {
        trace!(
            table = %table,
            client_id = %client_id,
            tokens = write.tokens,
            conditional = expected_last_refill.is_some(),
            "UpdateItem"
        );

        let mut request = self
            .client
            .update_item()
            .table_name(table)
            .key(ATTR_CLIENT_ID, AttributeValue::S(client_id.to_string()))
            .update_expression(
                "SET tokens = :t, lastRefill = :lr, refillRate = :rr, \
                 refillInterval = :ri, maxTokens = :mt",
            )
            .expression_attribute_values(":t", AttributeValue::N(write.tokens.to_string()))
            .expression_attribute_values(":lr", AttributeValue::N(write.last_refill.to_string()))
            .expression_attribute_values(":rr", AttributeValue::N(write.refill_rate.to_string()))
            .expression_attribute_values(
                ":ri",
                AttributeValue::N(write.refill_interval.to_string()),
            )
            .expression_attribute_values(":mt", AttributeValue::N(write.max_tokens.to_string()));

        if let Some(expected) = expected_last_refill {
            request = request
                .condition_expression("attribute_not_exists(lastRefill) OR lastRefill = :expected")
                .expression_attribute_values(":expected", AttributeValue::N(expected.to_string()));
        }

        let result = timeout(self.call_timeout, request.send())
            .await
            .map_err(|_| StoreError::Timeout(self.timeout_ms()))?;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let condition_failed = e
                    .as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false);
                if condition_failed {
                    Err(StoreError::ConditionFailed)
                } else {
                    Err(StoreError::Transport(e.to_string()))
                }
            }
        }
    }
}
