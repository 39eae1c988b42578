//! Read access to on-chain accounts
//!
//! Filters, the price monitor and the trade builder all read through
//! [`AccountSource`], so tests can swap the RPC node for an in-memory map.

use async_trait::async_trait;
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::RpcFilterType;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

use crate::error::Result;
use crate::raydium::token::token_account_amount;

#[async_trait]
pub trait AccountSource: Send + Sync {
    /// Raw account data, None when the account does not exist
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;

    /// Batched read, results in request order
    async fn get_multiple_account_data(&self, addresses: &[Pubkey]) -> Result<Vec<Option<Vec<u8>>>> {
        let mut out = Vec::with_capacity(addresses.len());
        for address in addresses {
            out.push(self.get_account_data(address).await?);
        }
        Ok(out)
    }

    /// Accounts owned by `program` matching every filter
    async fn get_program_accounts(
        &self,
        program: &Pubkey,
        filters: Vec<RpcFilterType>,
    ) -> Result<Vec<(Pubkey, Vec<u8>)>>;

    /// SPL token balance, 0 when the account is missing
    async fn token_balance(&self, token_account: &Pubkey) -> Result<u64> {
        match self.get_account_data(token_account).await? {
            Some(data) => token_account_amount(&data),
            None => Ok(0),
        }
    }
}

/// [`AccountSource`] backed by the nonblocking RPC client
pub struct RpcAccountSource {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl RpcAccountSource {
    pub fn new(client: Arc<RpcClient>, commitment: CommitmentConfig) -> Self {
        Self { client, commitment }
    }

    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }
}

#[async_trait]
impl AccountSource for RpcAccountSource {
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await?;
        Ok(response.value.map(|account| account.data))
    }

    async fn get_multiple_account_data(&self, addresses: &[Pubkey]) -> Result<Vec<Option<Vec<u8>>>> {
        let response = self
            .client
            .get_multiple_accounts_with_commitment(addresses, self.commitment)
            .await?;
        Ok(response
            .value
            .into_iter()
            .map(|account| account.map(|a| a.data))
            .collect())
    }

    async fn get_program_accounts(
        &self,
        program: &Pubkey,
        filters: Vec<RpcFilterType>,
    ) -> Result<Vec<(Pubkey, Vec<u8>)>> {
        let config = RpcProgramAccountsConfig {
            filters: Some(filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(self.commitment),
                ..Default::default()
            },
            ..Default::default()
        };
        let accounts = self
            .client
            .get_program_accounts_with_config(program, config)
            .await?;
        Ok(accounts
            .into_iter()
            .map(|(address, account)| (address, account.data))
            .collect())
    }
}
