//! Jito bundle executor
//!
//! Sends the swap plus a tip transfer as one bundle to every configured
//! block engine and confirms at bundle level through `getBundleStatuses`.

use async_trait::async_trait;
use base64::Engine;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::executor::{ConfirmStatus, ExecutionResult, Submission, TransactionExecutor};
use crate::error::{Error, Result};
use crate::raydium::program::random_tip_account;

const BUNDLE_STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);
const BLOCK_ENGINE_TIMEOUT: Duration = Duration::from_secs(10);

/// Jito bundle status
#[derive(Debug, Clone, PartialEq)]
pub enum BundleStatus {
    /// Not seen yet
    Pending,
    /// Landed at `slot`
    Landed { slot: u64 },
    /// Landed with an error
    Failed(String),
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct BundleStatuses {
    value: Vec<Option<BundleStatusEntry>>,
}

#[derive(Debug, Deserialize)]
struct BundleStatusEntry {
    slot: u64,
    confirmation_status: Option<String>,
    #[serde(default)]
    err: serde_json::Value,
}

impl BundleStatusEntry {
    fn status(&self) -> BundleStatus {
        // `{"Ok": null}` means every transaction in the bundle succeeded
        let ok = self.err.is_null() || self.err.get("Ok").is_some();
        if !ok {
            return BundleStatus::Failed(self.err.to_string());
        }
        match self.confirmation_status.as_deref() {
            Some("confirmed") | Some("finalized") => BundleStatus::Landed { slot: self.slot },
            _ => BundleStatus::Pending,
        }
    }
}

pub struct JitoExecutor {
    client: Arc<RpcClient>,
    http: reqwest::Client,
    block_engines: Vec<String>,
    tip_lamports: u64,
}

impl JitoExecutor {
    pub fn new(client: Arc<RpcClient>, block_engines: Vec<String>, tip_lamports: u64) -> Result<Self> {
        if block_engines.is_empty() {
            return Err(Error::Config("no Jito block engine configured".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(BLOCK_ENGINE_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build Jito HTTP client: {}", e)))?;

        info!(
            "Jito executor: {} block engines, {} lamports tip",
            block_engines.len(),
            tip_lamports
        );

        Ok(Self {
            client,
            http,
            block_engines,
            tip_lamports,
        })
    }

    fn bundles_url(base: &str) -> String {
        format!("{}/api/v1/bundles", base.trim_end_matches('/'))
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        base: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response: JsonRpcResponse<T> = self
            .http
            .post(Self::bundles_url(base))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(Error::Submit(format!(
                "{} failed ({}): {}",
                method, error.code, error.message
            )));
        }
        response
            .result
            .ok_or_else(|| Error::Submit(format!("{} returned no result", method)))
    }

    /// Post the bundle to every block engine, first accepted id wins
    async fn send_bundle(&self, encoded: &[String]) -> Result<String> {
        let params = json!([encoded, { "encoding": "base64" }]);
        let calls = self
            .block_engines
            .iter()
            .map(|url| self.call::<String>(url, "sendBundle", params.clone()));

        let mut last_error = None;
        for (url, result) in self.block_engines.iter().zip(join_all(calls).await) {
            match result {
                Ok(bundle_id) => return Ok(bundle_id),
                Err(e) => {
                    warn!("Block engine {} rejected bundle: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Submit("no block engine accepted bundle".into())))
    }

    /// Get bundle status from the first block engine that answers
    pub async fn bundle_status(&self, bundle_id: &str) -> Result<BundleStatus> {
        let mut last_error = None;
        for url in &self.block_engines {
            match self
                .call::<BundleStatuses>(url, "getBundleStatuses", json!([[bundle_id]]))
                .await
            {
                Ok(statuses) => {
                    return Ok(statuses
                        .value
                        .into_iter()
                        .next()
                        .flatten()
                        .map(|entry| entry.status())
                        .unwrap_or(BundleStatus::Pending))
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| Error::ChannelUnavailable("no block engine".into())))
    }
}

fn encode(transaction: &Transaction) -> Result<String> {
    Ok(base64::engine::general_purpose::STANDARD.encode(bincode::serialize(transaction)?))
}

#[async_trait]
impl TransactionExecutor for JitoExecutor {
    async fn submit(&self, instructions: Vec<Instruction>, payer: &Keypair) -> Result<Submission> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(CommitmentConfig::confirmed())
            .await?;

        let swap_tx =
            Transaction::new_signed_with_payer(&instructions, Some(&payer.pubkey()), &[payer], blockhash);

        // Tip goes in the LAST transaction of the bundle
        let tip_tx = Transaction::new_signed_with_payer(
            &[system_instruction::transfer(
                &payer.pubkey(),
                &random_tip_account(),
                self.tip_lamports,
            )],
            Some(&payer.pubkey()),
            &[payer],
            blockhash,
        );

        let signature = swap_tx
            .signatures
            .first()
            .copied()
            .ok_or_else(|| Error::InstructionBuild("unsigned swap transaction".into()))?;

        let bundle_id = self
            .send_bundle(&[encode(&swap_tx)?, encode(&tip_tx)?])
            .await?;
        debug!("Bundle {} submitted (swap {})", bundle_id, signature);

        Ok(Submission {
            signature,
            blockhash,
            last_valid_block_height,
            bundle_id: Some(bundle_id),
        })
    }

    async fn confirm(&self, submission: &Submission, timeout: Duration) -> Result<ExecutionResult> {
        let Some(bundle_id) = submission.bundle_id.as_deref() else {
            return Err(Error::Internal("bundle submission without bundle id".into()));
        };
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match self.bundle_status(bundle_id).await {
                Ok(BundleStatus::Landed { slot }) => {
                    return Ok(ExecutionResult {
                        signature: submission.signature,
                        status: ConfirmStatus::Confirmed,
                        slot: Some(slot),
                        error: None,
                    })
                }
                Ok(BundleStatus::Failed(reason)) => {
                    return Ok(ExecutionResult {
                        signature: submission.signature,
                        status: ConfirmStatus::Rejected,
                        slot: None,
                        error: Some(reason),
                    })
                }
                Ok(BundleStatus::Pending) => {}
                Err(e) => debug!("Bundle status check failed: {}", e),
            }

            let block_height = self
                .client
                .get_block_height_with_commitment(CommitmentConfig::confirmed())
                .await?;
            if block_height > submission.last_valid_block_height
                || tokio::time::Instant::now() >= deadline
            {
                return Ok(ExecutionResult {
                    signature: submission.signature,
                    status: ConfirmStatus::TimedOut,
                    slot: None,
                    error: None,
                });
            }

            tokio::time::sleep(BUNDLE_STATUS_POLL_INTERVAL).await;
        }
    }
}
