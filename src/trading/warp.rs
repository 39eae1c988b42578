//! Priority relay executor
//!
//! Posts the swap together with a flat-fee transfer to the relay wallet.
//! The relay forwards both and reports the swap signature, which is then
//! confirmed over RPC like any other transaction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::executor::{ExecutionResult, Submission, TransactionExecutor};
use super::rpc::poll_signature_status;
use crate::error::{Error, Result};
use crate::raydium::program::WARP_FEE_WALLET;

/// Relay request timeout
const RELAY_TIMEOUT: Duration = Duration::from_secs(100);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayRequest {
    /// base58 encoded, fee transfer first
    transactions: Vec<String>,
    latest_blockhash: RelayBlockhash,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    #[serde(default)]
    confirmed: bool,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct WarpExecutor {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    http: reqwest::Client,
    url: String,
    fee_lamports: u64,
}

impl WarpExecutor {
    pub fn new(
        client: Arc<RpcClient>,
        commitment: CommitmentConfig,
        url: String,
        fee_lamports: u64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(RELAY_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build relay HTTP client: {}", e)))?;

        info!("Priority relay executor: {} ({} lamports fee)", url, fee_lamports);

        Ok(Self {
            client,
            commitment,
            http,
            url,
            fee_lamports,
        })
    }

    fn encode(transaction: &Transaction) -> Result<String> {
        Ok(bs58::encode(bincode::serialize(transaction)?).into_string())
    }
}

#[async_trait]
impl TransactionExecutor for WarpExecutor {
    async fn submit(&self, instructions: Vec<Instruction>, payer: &Keypair) -> Result<Submission> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await?;

        let fee_tx = Transaction::new_signed_with_payer(
            &[system_instruction::transfer(
                &payer.pubkey(),
                &WARP_FEE_WALLET,
                self.fee_lamports,
            )],
            Some(&payer.pubkey()),
            &[payer],
            blockhash,
        );
        let swap_tx =
            Transaction::new_signed_with_payer(&instructions, Some(&payer.pubkey()), &[payer], blockhash);
        let local_signature = swap_tx.signatures.first().copied().unwrap_or_default();

        let request = RelayRequest {
            transactions: vec![Self::encode(&fee_tx)?, Self::encode(&swap_tx)?],
            latest_blockhash: RelayBlockhash {
                blockhash: blockhash.to_string(),
                last_valid_block_height,
            },
        };

        let response: RelayResponse = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error.filter(|e| !e.is_empty()) {
            warn!("Relay rejected transaction: {}", error);
            return Err(Error::Submit(error));
        }

        let signature = match response.signature.as_deref().map(Signature::from_str) {
            Some(Ok(signature)) => signature,
            Some(Err(e)) => {
                return Err(Error::Submit(format!("Relay returned bad signature: {}", e)))
            }
            None => local_signature,
        };

        debug!(
            "Relay accepted {} (relay confirmed: {})",
            signature, response.confirmed
        );

        Ok(Submission {
            signature,
            blockhash,
            last_valid_block_height,
            bundle_id: None,
        })
    }

    async fn confirm(&self, submission: &Submission, timeout: Duration) -> Result<ExecutionResult> {
        poll_signature_status(&self.client, self.commitment, submission, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = RelayRequest {
            transactions: vec!["fee".into(), "swap".into()],
            latest_blockhash: RelayBlockhash {
                blockhash: "hash".into(),
                last_valid_block_height: 42,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["transactions"][0], "fee");
        assert_eq!(json["latestBlockhash"]["lastValidBlockHeight"], 42);
    }

    #[test]
    fn test_response_parsing() {
        let ok: RelayResponse =
            serde_json::from_str(r#"{"confirmed":true,"signature":"abc"}"#).unwrap();
        assert!(ok.confirmed);
        assert_eq!(ok.signature.as_deref(), Some("abc"));
        assert!(ok.error.is_none());

        let failed: RelayResponse =
            serde_json::from_str(r#"{"confirmed":false,"error":"fee too low"}"#).unwrap();
        assert_eq!(failed.error.as_deref(), Some("fee too low"));
    }

    #[test]
    fn test_encode_is_base58_bincode() {
        let payer = Keypair::new();
        let tx = Transaction::new_signed_with_payer(
            &[system_instruction::transfer(&payer.pubkey(), &WARP_FEE_WALLET, 1)],
            Some(&payer.pubkey()),
            &[&payer],
            solana_sdk::hash::Hash::new_unique(),
        );
        let encoded = WarpExecutor::encode(&tx).unwrap();
        let decoded: Transaction =
            bincode::deserialize(&bs58::decode(encoded).into_vec().unwrap()).unwrap();
        assert_eq!(decoded.signatures, tx.signatures);
    }
}
