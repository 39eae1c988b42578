//! SPL mint / token account snapshots and Metaplex metadata flags

use borsh::{BorshDeserialize, BorshSerialize};
use spl_token::solana_program::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;

use crate::error::{Error, Result};

/// The mint fields the safety filters look at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintSnapshot {
    pub mint_authority: Option<Pubkey>,
    pub freeze_authority: Option<Pubkey>,
    pub supply: u64,
    pub decimals: u8,
}

impl MintSnapshot {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mint = spl_token::state::Mint::unpack(data)
            .map_err(|e| Error::Decode(format!("mint unpack failed: {}", e)))?;

        Ok(Self {
            mint_authority: mint.mint_authority.into(),
            freeze_authority: mint.freeze_authority.into(),
            supply: mint.supply,
            decimals: mint.decimals,
        })
    }

    pub fn is_renounced(&self) -> bool {
        self.mint_authority.is_none()
    }

    pub fn is_freezable(&self) -> bool {
        self.freeze_authority.is_some()
    }
}

/// Amount held by an SPL token account
pub fn token_account_amount(data: &[u8]) -> Result<u64> {
    spl_token::state::Account::unpack(data)
        .map(|account| account.amount)
        .map_err(|e| Error::Decode(format!("token account unpack failed: {}", e)))
}

#[allow(dead_code)]
#[derive(Debug, Clone, BorshDeserialize, BorshSerialize)]
struct Creator {
    address: [u8; 32],
    verified: bool,
    share: u8,
}

/// Leading part of a Metaplex metadata account, up to `is_mutable`
#[allow(dead_code)]
#[derive(Debug, Clone, BorshDeserialize, BorshSerialize)]
struct MetadataHead {
    key: u8,
    update_authority: [u8; 32],
    mint: [u8; 32],
    name: String,
    symbol: String,
    uri: String,
    seller_fee_basis_points: u16,
    creators: Option<Vec<Creator>>,
    primary_sale_happened: bool,
    is_mutable: bool,
}

/// Read the `is_mutable` flag of a metadata account
pub fn metadata_is_mutable(data: &[u8]) -> Result<bool> {
    let head = MetadataHead::deserialize(&mut &data[..])
        .map_err(|e| Error::Decode(format!("metadata decode failed: {}", e)))?;
    Ok(head.is_mutable)
}

#[cfg(test)]
pub fn encode_metadata(mint: &Pubkey, is_mutable: bool) -> Vec<u8> {
    let head = MetadataHead {
        key: 4,
        update_authority: Pubkey::new_unique().to_bytes(),
        mint: mint.to_bytes(),
        name: "Sniped".into(),
        symbol: "SNP".into(),
        uri: "https://example.invalid/snp.json".into(),
        seller_fee_basis_points: 0,
        creators: Some(vec![Creator {
            address: Pubkey::new_unique().to_bytes(),
            verified: true,
            share: 100,
        }]),
        primary_sale_happened: false,
        is_mutable,
    };
    let mut bytes = borsh::to_vec(&head).unwrap();
    // real accounts carry trailing optional fields and zero padding
    bytes.extend_from_slice(&[0u8; 64]);
    bytes
}

#[cfg(test)]
pub fn encode_mint(mint_authority: Option<Pubkey>, freeze_authority: Option<Pubkey>, supply: u64) -> Vec<u8> {
    let mint = spl_token::state::Mint {
        mint_authority: mint_authority.into(),
        supply,
        decimals: 6,
        is_initialized: true,
        freeze_authority: freeze_authority.into(),
    };
    let mut data = vec![0u8; spl_token::state::Mint::LEN];
    spl_token::state::Mint::pack(mint, &mut data).unwrap();
    data
}

#[cfg(test)]
pub fn encode_token_account(mint: &Pubkey, owner: &Pubkey, amount: u64) -> Vec<u8> {
    let account = spl_token::state::Account {
        mint: *mint,
        owner: *owner,
        amount,
        state: spl_token::state::AccountState::Initialized,
        ..Default::default()
    };
    let mut data = vec![0u8; spl_token::state::Account::LEN];
    spl_token::state::Account::pack(account, &mut data).unwrap();
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_snapshot() {
        let renounced = MintSnapshot::decode(&encode_mint(None, None, 1_000)).unwrap();
        assert!(renounced.is_renounced());
        assert!(!renounced.is_freezable());
        assert_eq!(renounced.supply, 1_000);

        let authority = Pubkey::new_unique();
        let owned = MintSnapshot::decode(&encode_mint(Some(authority), Some(authority), 1)).unwrap();
        assert!(!owned.is_renounced());
        assert!(owned.is_freezable());
    }

    #[test]
    fn test_token_account_amount() {
        let data = encode_token_account(&Pubkey::new_unique(), &Pubkey::new_unique(), 42);
        assert_eq!(token_account_amount(&data).unwrap(), 42);
        assert!(token_account_amount(&data[..10]).is_err());
    }

    #[test]
    fn test_metadata_mutability() {
        let mint = Pubkey::new_unique();
        assert!(metadata_is_mutable(&encode_metadata(&mint, true)).unwrap());
        assert!(!metadata_is_mutable(&encode_metadata(&mint, false)).unwrap());
        assert!(metadata_is_mutable(&[4u8; 10]).is_err());
    }
}
