//! Default executor: compute-budgeted transaction sent straight to the RPC node

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::instruction::Instruction;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::executor::{ConfirmStatus, ExecutionResult, Submission, TransactionExecutor};
use crate::error::Result;

/// Delay between signature status polls
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(400);

pub struct DefaultExecutor {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    compute_unit_limit: u32,
    compute_unit_price: u64,
}

impl DefaultExecutor {
    pub fn new(
        client: Arc<RpcClient>,
        commitment: CommitmentConfig,
        compute_unit_limit: u32,
        compute_unit_price: u64,
    ) -> Self {
        info!(
            "Default executor: {} CU limit, {} micro-lamports/CU",
            compute_unit_limit, compute_unit_price
        );
        Self {
            client,
            commitment,
            compute_unit_limit,
            compute_unit_price,
        }
    }

    /// Compute budget instructions followed by `instructions`
    pub fn with_compute_budget(&self, instructions: Vec<Instruction>) -> Vec<Instruction> {
        let mut out = Vec::with_capacity(instructions.len() + 2);
        out.push(ComputeBudgetInstruction::set_compute_unit_price(
            self.compute_unit_price,
        ));
        out.push(ComputeBudgetInstruction::set_compute_unit_limit(
            self.compute_unit_limit,
        ));
        out.extend(instructions);
        out
    }
}

#[async_trait]
impl TransactionExecutor for DefaultExecutor {
    async fn submit(&self, instructions: Vec<Instruction>, payer: &Keypair) -> Result<Submission> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await?;

        let transaction = Transaction::new_signed_with_payer(
            &self.with_compute_budget(instructions),
            Some(&payer.pubkey()),
            &[payer],
            blockhash,
        );

        let signature = self
            .client
            .send_transaction_with_config(
                &transaction,
                RpcSendTransactionConfig {
                    skip_preflight: true,
                    ..Default::default()
                },
            )
            .await?;

        debug!("Sent transaction {}", signature);

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

/// Poll signature status until it reaches `commitment`, fails on-chain, the
/// blockhash expires or `timeout` elapses
pub async fn poll_signature_status(
    client: &RpcClient,
    commitment: CommitmentConfig,
    submission: &Submission,
    timeout: Duration,
) -> Result<ExecutionResult> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let statuses = client
            .get_signature_statuses(&[submission.signature])
            .await?
            .value;

        if let Some(Some(status)) = statuses.into_iter().next() {
            if let Some(err) = status.err {
                return Ok(ExecutionResult {
                    signature: submission.signature,
                    status: ConfirmStatus::Rejected,
                    slot: Some(status.slot),
                    error: Some(err.to_string()),
                });
            }
            if status.satisfies_commitment(commitment) {
                return Ok(ExecutionResult {
                    signature: submission.signature,
                    status: ConfirmStatus::Confirmed,
                    slot: Some(status.slot),
                    error: None,
                });
            }
        }

        let block_height = client.get_block_height_with_commitment(commitment).await?;
        if block_height > submission.last_valid_block_height {
            return Ok(ExecutionResult {
                signature: submission.signature,
                status: ConfirmStatus::TimedOut,
                slot: None,
                error: Some("blockhash expired".to_string()),
            });
        }

        if tokio::time::Instant::now() >= deadline {
            return Ok(ExecutionResult {
                signature: submission.signature,
                status: ConfirmStatus::TimedOut,
                slot: None,
                error: None,
            });
        }

        tokio::time::sleep(STATUS_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::compute_budget;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::system_instruction;

    #[test]
    fn test_compute_budget_prefix() {
        let executor = DefaultExecutor::new(
            Arc::new(RpcClient::new("http://127.0.0.1:8899".to_string())),
            CommitmentConfig::confirmed(),
            101_337,
            421_197,
        );
        let transfer = system_instruction::transfer(&Pubkey::new_unique(), &Pubkey::new_unique(), 1);

        let ixs = executor.with_compute_budget(vec![transfer.clone()]);
        assert_eq!(ixs.len(), 3);
        assert_eq!(ixs[0].program_id, compute_budget::id());
        assert_eq!(ixs[1].program_id, compute_budget::id());
        assert_eq!(
            ixs[0],
            ComputeBudgetInstruction::set_compute_unit_price(421_197)
        );
        assert_eq!(ixs[2], transfer);
    }
}
