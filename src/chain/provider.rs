//! toncenter v3 HTTP provider with multi-endpoint failover

use super::{BlockRef, ChainRpc, ComputePhase, StackValue, TransactionRecord, ViewResult};
use crate::config::ChainConfig;
use crate::error::{ExecutorError, ExecutorResult};
use crate::tvm::{self, TonAddress};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use num_bigint::BigInt;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// toncenter client that rotates through configured endpoints on failure
pub struct TonCenterProvider {
    /// Chain configuration
    config: ChainConfig,
    /// Shared HTTP client
    client: Client,
    /// Current active endpoint index
    current_endpoint: AtomicUsize,
}

impl TonCenterProvider {
    /// Create a new provider
    pub fn new(config: ChainConfig) -> ExecutorResult<Self> {
        if config.endpoints.is_empty() {
            return Err(ExecutorError::Config("No toncenter endpoints configured".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ExecutorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        for url in &config.endpoints {
            debug!("Added toncenter endpoint: {}", url);
        }

        Ok(Self {
            config,
            client,
            current_endpoint: AtomicUsize::new(0),
        })
    }

    /// Get the active endpoint
    fn endpoint(&self) -> &str {
        let idx = self.current_endpoint.load(Ordering::Relaxed);
        &self.config.endpoints[idx % self.config.endpoints.len()]
    }

    /// Switch to next endpoint
    fn failover(&self) {
        if self.config.endpoints.len() < 2 {
            return;
        }
        let current = self.current_endpoint.load(Ordering::Relaxed);
        let next = (current + 1) % self.config.endpoints.len();
        self.current_endpoint.store(next, Ordering::Relaxed);
        crate::metrics::record_rpc_failover();
        warn!("toncenter failover to endpoint {}", self.endpoint());
    }

    /// Issue a request, retrying transient failures up to `max_retries` times
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> ExecutorResult<T> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.request_once(method.clone(), path, query, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempts <= self.config.max_retries => {
                    warn!(
                        "{} {} failed (attempt {}/{}): {}",
                        method,
                        path,
                        attempts,
                        self.config.max_retries + 1,
                        e
                    );
                    self.failover();
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> ExecutorResult<T> {
        let endpoint = self.endpoint().trim_end_matches('/').to_string();
        let url = format!("{}{}", endpoint, path);

        let mut req = self.client.request(method, &url).query(query);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.header("X-API-Key", key);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await.map_err(|e| ExecutorError::Rpc {
            endpoint: endpoint.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ExecutorError::RateLimited { endpoint });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("{} {}: {}", status.as_u16(), path, text);
            // Server-side faults are worth another endpoint; client errors are not
            return Err(if status.is_server_error() {
                ExecutorError::Rpc { endpoint, message }
            } else {
                ExecutorError::Config(format!("toncenter rejected request: {}", message))
            });
        }

        response.json::<T>().await.map_err(|e| ExecutorError::Rpc {
            endpoint,
            message: format!("invalid response for {}: {}", path, e),
        })
    }
}

#[async_trait]
impl ChainRpc for TonCenterProvider {
    async fn current_block(&self) -> ExecutorResult<BlockRef> {
        let info: MasterchainInfo = self
            .request(Method::GET, "/api/v3/masterchainInfo", &[], None)
            .await?;
        Ok(BlockRef {
            seqno: info.last.seqno,
        })
    }

    async fn run_get_method(
        &self,
        address: &TonAddress,
        method: &str,
        args: Vec<StackValue>,
        at: Option<BlockRef>,
    ) -> ExecutorResult<ViewResult> {
        let body = run_get_method_body(address, method, &args, at)?;

        let response: RunGetMethodResponse = self
            .request(Method::POST, "/api/v3/runGetMethod", &[], Some(&body))
            .await?;
        debug!(
            "get-method {} on {}: exit code {}, {} stack entries",
            method,
            address,
            response.exit_code,
            response.stack.len()
        );

        let stack = response
            .stack
            .iter()
            .enumerate()
            .map(|(i, entry)| decode_stack_entry(i, entry))
            .collect::<ExecutorResult<Vec<_>>>()?;

        Ok(ViewResult {
            exit_code: response.exit_code,
            stack,
        })
    }

    async fn native_balance(&self, address: &TonAddress) -> ExecutorResult<u128> {
        let account: AccountResponse = self
            .request(
                Method::GET,
                "/api/v3/account",
                &[("address", address.to_hex())],
                None,
            )
            .await?;
        account.balance.parse().map_err(|e| ExecutorError::Rpc {
            endpoint: self.endpoint().to_string(),
            message: format!("invalid balance {:?}: {}", account.balance, e),
        })
    }

    async fn send_message(&self, boc: Vec<u8>) -> ExecutorResult<String> {
        let body = json!({ "boc": STANDARD.encode(boc) });
        let response: SendMessageResponse = self
            .request(Method::POST, "/api/v3/message", &[], Some(&body))
            .await?;
        // The indexer keys external messages by their normalized hash
        Ok(response.message_hash_norm.unwrap_or(response.message_hash))
    }

    async fn transactions_by_message(&self, msg_hash: &str) -> ExecutorResult<Vec<TransactionRecord>> {
        let response: TransactionsResponse = self
            .request(
                Method::GET,
                "/api/v3/transactionsByMessage",
                &[
                    ("msg_hash", msg_hash.to_string()),
                    ("direction", "in".to_string()),
                    ("limit", "8".to_string()),
                ],
                None,
            )
            .await?;

        response
            .transactions
            .into_iter()
            .map(|raw| {
                TransactionRecord::try_from(raw).map_err(|message| ExecutorError::Rpc {
                    endpoint: self.endpoint().to_string(),
                    message,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct MasterchainInfo {
    last: BlockHeader,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    seqno: u32,
}

#[derive(Debug, Deserialize)]
struct RunGetMethodResponse {
    exit_code: i32,
    #[serde(default)]
    stack: Vec<StackEntry>,
}

#[derive(Debug, Deserialize)]
struct StackEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balance: String,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    message_hash: String,
    #[serde(default)]
    message_hash_norm: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    transactions: Vec<RawTransaction>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    account: String,
    hash: String,
    lt: String,
    #[serde(default)]
    description: RawDescription,
    #[serde(default)]
    out_msgs: Vec<RawMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDescription {
    #[serde(default)]
    aborted: bool,
    #[serde(default)]
    compute_ph: Option<RawComputePhase>,
}

#[derive(Debug, Deserialize)]
struct RawComputePhase {
    #[serde(default)]
    skipped: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    exit_code: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    hash: String,
}

impl TryFrom<RawTransaction> for TransactionRecord {
    type Error = String;

    fn try_from(raw: RawTransaction) -> Result<Self, Self::Error> {
        let lt = raw
            .lt
            .parse::<u64>()
            .map_err(|e| format!("transaction {} has invalid lt {:?}: {}", raw.hash, raw.lt, e))?;

        let compute_phase = raw.description.compute_ph.map(|ph| {
            if ph.skipped {
                ComputePhase::Skipped {
                    reason: ph.reason.unwrap_or_else(|| "unknown".to_string()),
                }
            } else {
                let exit_code = ph.exit_code.unwrap_or(0);
                ComputePhase::Executed {
                    success: ph.success.unwrap_or(exit_code == 0),
                    exit_code,
                }
            }
        });

        Ok(TransactionRecord {
            account: raw.account,
            hash: raw.hash,
            lt,
            aborted: raw.description.aborted,
            compute_phase,
            out_msg_hashes: raw.out_msgs.into_iter().map(|m| m.hash).collect(),
        })
    }
}

/// Request body of `runGetMethod`, pinned to a masterchain block when given
fn run_get_method_body(
    address: &TonAddress,
    method: &str,
    args: &[StackValue],
    at: Option<BlockRef>,
) -> ExecutorResult<Value> {
    let stack = args
        .iter()
        .map(encode_stack_entry)
        .collect::<ExecutorResult<Vec<_>>>()?;
    let mut body = json!({
        "address": address.to_hex(),
        "method": method,
        "stack": stack,
    });
    if let Some(block) = at {
        body["seqno"] = json!(block.seqno);
    }
    Ok(body)
}

fn encode_stack_entry(value: &StackValue) -> ExecutorResult<Value> {
    Ok(match value {
        StackValue::Int(n) => json!({ "type": "num", "value": format_num(n) }),
        StackValue::Cell(c) => json!({ "type": "cell", "value": STANDARD.encode(tvm::to_boc(c)?) }),
        StackValue::Slice(c) => json!({ "type": "slice", "value": STANDARD.encode(tvm::to_boc(c)?) }),
        StackValue::Null => json!({ "type": "null" }),
    })
}

fn decode_stack_entry(index: usize, entry: &StackEntry) -> ExecutorResult<StackValue> {
    let text = entry.value.as_str().unwrap_or_default();
    let bad = |why: String| ExecutorError::StackDecode {
        index,
        expected: "well-formed stack entry",
        found: why,
    };

    match entry.kind.as_str() {
        "num" => parse_num(text)
            .map(StackValue::Int)
            .ok_or_else(|| bad(format!("num {:?}", text))),
        "cell" | "slice" => {
            let bytes = STANDARD
                .decode(text)
                .map_err(|e| bad(format!("{} base64: {}", entry.kind, e)))?;
            let cell = tvm::from_boc(&bytes)?;
            Ok(if entry.kind == "cell" {
                StackValue::Cell(cell)
            } else {
                StackValue::Slice(cell)
            })
        }
        "null" => Ok(StackValue::Null),
        other => Err(bad(format!("unsupported type {}", other))),
    }
}

/// Parse `0x..`/`-0x..` hex or plain decimal
fn parse_num(text: &str) -> Option<BigInt> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => BigInt::parse_bytes(hex.as_bytes(), 16)?,
        None => BigInt::parse_bytes(digits.as_bytes(), 10)?,
    };
    Some(if negative { -value } else { value })
}

fn format_num(n: &BigInt) -> String {
    if n.sign() == num_bigint::Sign::Minus {
        format!("-0x{:x}", -n)
    } else {
        format!("0x{:x}", n)
    }
}
