//! Test doubles shared by the unit tests

use async_trait::async_trait;
use dashmap::DashMap;
use solana_client::rpc_filter::RpcFilterType;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::chain::AccountSource;
use crate::error::{Error, Result};
use crate::position::monitor::PriceSource;
use crate::raydium::PoolRecord;
use crate::trading::executor::{ConfirmStatus, ExecutionResult, Submission, TransactionExecutor};

/// In-memory account store
#[derive(Default)]
pub struct MapAccountSource {
    accounts: DashMap<Pubkey, Vec<u8>>,
    failing: DashMap<Pubkey, ()>,
    reads: AtomicU32,
}

impl MapAccountSource {
    pub fn insert(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts.insert(address, data);
    }

    pub fn remove(&self, address: &Pubkey) {
        self.accounts.remove(address);
    }

    /// Make every read of `address` return an RPC error
    pub fn fail_reads_of(&self, address: Pubkey) {
        self.failing.insert(address, ());
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountSource for MapAccountSource {
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains_key(address) {
            return Err(Error::Rpc(format!("read of {} failed", address)));
        }
        Ok(self.accounts.get(address).map(|data| data.clone()))
    }

    /// Ignores the owning program, every stored account is a candidate
    async fn get_program_accounts(
        &self,
        _program: &Pubkey,
        filters: Vec<RpcFilterType>,
    ) -> Result<Vec<(Pubkey, Vec<u8>)>> {
        let matches = |data: &[u8]| {
            filters.iter().all(|filter| match filter {
                RpcFilterType::DataSize(size) => data.len() as u64 == *size,
                RpcFilterType::Memcmp(memcmp) => memcmp.bytes_match(data),
                _ => true,
            })
        };
        Ok(self
            .accounts
            .iter()
            .filter(|entry| matches(entry.value()))
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect())
    }
}

/// Scripted outcome of one submit + confirm round
#[derive(Debug, Clone)]
pub enum Outcome {
    Confirmed,
    Rejected(&'static str),
    TimedOut,
    SubmitError,
}

/// Executor that records every submission and replays scripted outcomes.
/// Falls back to `Confirmed` when the script runs out.
#[derive(Default)]
pub struct MockExecutor {
    script: Mutex<VecDeque<Outcome>>,
    pending: Mutex<VecDeque<Outcome>>,
    submits: AtomicU32,
    instructions: Mutex<Vec<Vec<Instruction>>>,
}

impl MockExecutor {
    pub fn with_script(outcomes: Vec<Outcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            ..Default::default()
        }
    }

    pub fn submits(&self) -> u32 {
        self.submits.load(Ordering::SeqCst)
    }

    /// Instruction sets in submission order
    pub fn submitted(&self) -> Vec<Vec<Instruction>> {
        self.instructions.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionExecutor for MockExecutor {
    async fn submit(&self, instructions: Vec<Instruction>, _payer: &Keypair) -> Result<Submission> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.instructions.lock().unwrap().push(instructions);

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Confirmed);

        if let Outcome::SubmitError = outcome {
            return Err(Error::Submit("scripted submit failure".into()));
        }
        self.pending.lock().unwrap().push_back(outcome);

        Ok(Submission {
            signature: Signature::new_unique(),
            blockhash: Hash::new_unique(),
            last_valid_block_height: 100,
            bundle_id: None,
        })
    }

    async fn confirm(&self, submission: &Submission, _timeout: Duration) -> Result<ExecutionResult> {
        let outcome = self
            .pending
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Confirmed);

        let (status, error) = match outcome {
            Outcome::Confirmed => (ConfirmStatus::Confirmed, None),
            Outcome::Rejected(reason) => (ConfirmStatus::Rejected, Some(reason.to_string())),
            Outcome::TimedOut | Outcome::SubmitError => (ConfirmStatus::TimedOut, None),
        };

        Ok(ExecutionResult {
            signature: submission.signature,
            status,
            slot: Some(1),
            error,
        })
    }
}

/// Price source replaying a fixed series, repeating the last value
pub struct ScriptedPriceSource {
    prices: Mutex<VecDeque<Option<f64>>>,
    last: Mutex<Option<f64>>,
}

impl ScriptedPriceSource {
    pub fn new(prices: Vec<Option<f64>>) -> Self {
        Self {
            prices: Mutex::new(prices.into()),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PriceSource for ScriptedPriceSource {
    async fn price(&self, _pool_id: &Pubkey, _pool: &PoolRecord) -> Result<f64> {
        let price = match self.prices.lock().unwrap().pop_front() {
            Some(Some(price)) => {
                *self.last.lock().unwrap() = Some(price);
                Some(price)
            }
            // scripted one-off read failure
            Some(None) => None,
            None => *self.last.lock().unwrap(),
        };
        price.ok_or_else(|| Error::Rpc("scripted price read failure".into()))
    }
}
