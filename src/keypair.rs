//! Signing keypair loading

use solana_sdk::signature::Keypair;
use std::path::Path;

use crate::config::WalletConfig;
use crate::error::{Error, Result};

/// Load the trading keypair. A base58 private key wins over a keypair file.
pub fn load_keypair(config: &WalletConfig) -> Result<Keypair> {
    if !config.private_key.is_empty() {
        return keypair_from_base58(&config.private_key);
    }

    match &config.keypair_path {
        Some(path) => keypair_from_file(Path::new(path)),
        None => Err(Error::InvalidKeypair(
            "set PRIVATE_KEY or wallet.keypair_path".to_string(),
        )),
    }
}

pub fn keypair_from_base58(encoded: &str) -> Result<Keypair> {
    let bytes = bs58::decode(encoded.trim())
        .into_vec()
        .map_err(|e| Error::InvalidKeypair(format!("Private key is not base58: {}", e)))?;

    Keypair::from_bytes(&bytes)
        .map_err(|e| Error::InvalidKeypair(format!("Invalid keypair bytes: {}", e)))
}

/// Solana CLI style JSON byte array
pub fn keypair_from_file(path: &Path) -> Result<Keypair> {
    let keypair_bytes = std::fs::read(path).map_err(|e| {
        Error::InvalidKeypair(format!("Failed to read keypair {}: {}", path.display(), e))
    })?;

    let keypair_json: Vec<u8> = serde_json::from_slice(&keypair_bytes).map_err(|e| {
        Error::InvalidKeypair(format!("Failed to parse keypair JSON {}: {}", path.display(), e))
    })?;

    Keypair::from_bytes(&keypair_json)
        .map_err(|e| Error::InvalidKeypair(format!("Invalid keypair bytes: {}", e)))
}
