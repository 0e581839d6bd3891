use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One call of an approved proposal. The scheduler never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayloadCall {
    pub target: String,
    /// Decimal amount; wei-scale values do not fit in 64 bits.
    #[serde(default = "zero_value")]
    pub value: String,
    /// Hex-encoded call data.
    #[serde(default)]
    pub call_data: String,
}

fn zero_value() -> String {
    "0".to_string()
}

impl PayloadCall {
    pub fn new(
        target: impl Into<String>,
        value: impl Into<String>,
        call_data: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            value: value.into(),
            call_data: call_data.into(),
        }
    }
}

/// Proof of commitment returned by the executor adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionReceipt {
    pub tx_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ExecutionReceipt {
    pub fn new(tx_hash: impl Into<String>) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            block_number: None,
            metadata: None,
        }
    }

    pub fn with_block(mut self, block_number: u64) -> Self {
        self.block_number = Some(block_number);
        self
    }
}
