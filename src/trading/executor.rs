//! Transaction submission strategies
//!
//! The lifecycle only talks to [`TransactionExecutor`]. Which channel is used
//! (plain RPC, priority relay or bundle relay) is fixed once at startup by
//! [`Executor::from_config`].

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::signature::{Keypair, Signature};
use std::sync::Arc;
use std::time::Duration;

use super::jito::JitoExecutor;
use super::rpc::DefaultExecutor;
use super::warp::WarpExecutor;
use crate::config::{Config, ExecutorKind};
use crate::error::{Error, Result};

/// A transaction handed to the network, not yet confirmed
#[derive(Debug, Clone)]
pub struct Submission {
    pub signature: Signature,
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
    /// Set by the bundle relay
    pub bundle_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmStatus {
    Confirmed,
    TimedOut,
    /// Landed with an on-chain error
    Rejected,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub signature: Signature,
    pub status: ConfirmStatus,
    pub slot: Option<u64>,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn is_confirmed(&self) -> bool {
        self.status == ConfirmStatus::Confirmed
    }

    /// Turn a non-confirmed result into the matching retryable error
    pub fn into_result(self, timeout: Duration) -> Result<Self> {
        match self.status {
            ConfirmStatus::Confirmed => Ok(self),
            ConfirmStatus::TimedOut => Err(Error::ConfirmTimeout {
                signature: self.signature.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
            ConfirmStatus::Rejected => Err(Error::TransactionRejected {
                signature: self.signature.to_string(),
                reason: self.error.unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }
}

#[async_trait]
pub trait TransactionExecutor: Send + Sync {
    /// Sign and send `instructions`, paid and signed by `payer`
    async fn submit(&self, instructions: Vec<Instruction>, payer: &Keypair) -> Result<Submission>;

    /// Wait up to `timeout` for the submission to land
    async fn confirm(&self, submission: &Submission, timeout: Duration) -> Result<ExecutionResult>;

    /// Submit then confirm. Anything short of `Confirmed` comes back as an error.
    async fn execute(
        &self,
        instructions: Vec<Instruction>,
        payer: &Keypair,
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        let submission = self.submit(instructions, payer).await?;
        self.confirm(&submission, timeout).await?.into_result(timeout)
    }
}

/// The configured submission channel
pub enum Executor {
    Default(DefaultExecutor),
    PriorityRelay(WarpExecutor),
    BundleRelay(JitoExecutor),
}

impl Executor {
    pub fn from_config(config: &Config, client: Arc<RpcClient>) -> Result<Self> {
        let commitment = config.rpc.commitment_config();
        let executor = &config.executor;

        Ok(match executor.kind {
            ExecutorKind::Default => Executor::Default(DefaultExecutor::new(
                client,
                commitment,
                executor.compute_unit_limit,
                executor.compute_unit_price,
            )),
            ExecutorKind::Warp => Executor::PriorityRelay(WarpExecutor::new(
                client,
                commitment,
                executor.warp_url.clone(),
                executor.custom_fee_lamports(),
            )?),
            ExecutorKind::Jito => Executor::BundleRelay(JitoExecutor::new(
                client,
                executor.jito_block_engine_urls.clone(),
                executor.custom_fee_lamports(),
            )?),
        })
    }

    pub fn kind(&self) -> ExecutorKind {
        match self {
            Executor::Default(_) => ExecutorKind::Default,
            Executor::PriorityRelay(_) => ExecutorKind::Warp,
            Executor::BundleRelay(_) => ExecutorKind::Jito,
        }
    }
}

#[async_trait]
impl TransactionExecutor for Executor {
    async fn submit(&self, instructions: Vec<Instruction>, payer: &Keypair) -> Result<Submission> {
        match self {
            Executor::Default(inner) => inner.submit(instructions, payer).await,
            Executor::PriorityRelay(inner) => inner.submit(instructions, payer).await,
            Executor::BundleRelay(inner) => inner.submit(instructions, payer).await,
        }
    }

    async fn confirm(&self, submission: &Submission, timeout: Duration) -> Result<ExecutionResult> {
        match self {
            Executor::Default(inner) => inner.confirm(submission, timeout).await,
            Executor::PriorityRelay(inner) => inner.confirm(submission, timeout).await,
            Executor::BundleRelay(inner) => inner.confirm(submission, timeout).await,
        }
    }
}
