//! Raydium and OpenBook program constants
//!
//! # WARNING: Account layouts are pinned to AMM v4 / OpenBook v1
//! If Raydium ships a new AMM program, the pool decoder and swap
//! instruction need updating together with these ids.

use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;

/// Raydium liquidity pool v4 program
pub const RAYDIUM_AMM_V4: Pubkey = pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");

/// PDA authority that owns every v4 pool vault
pub const RAYDIUM_AMM_AUTHORITY: Pubkey = pubkey!("5Q544fKrFoe6tsEbD7S8EmxGTJYAKtTVhAW5Q5pge4j1");

/// OpenBook (Serum v3 fork) market program
pub const OPENBOOK_PROGRAM_ID: Pubkey = pubkey!("srmqPvymJeFKQ4zGQed1GFppgkRHL9kaELCbyksJtPX");

/// Metaplex token metadata program
pub const METADATA_PROGRAM_ID: Pubkey = pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

pub const WSOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");
pub const USDC_MINT: Pubkey = pubkey!("EPjFWdd5AufqSYqeU2zJQ17SeqXVkpU6ZoaszrdLpPZ");

/// Instruction tag of `swapBaseIn`
pub const SWAP_BASE_IN_TAG: u8 = 9;

/// Raydium pool status once trading is live
pub const POOL_STATUS_SWAP_ENABLED: u64 = 6;

/// Trade fee charged by v4 pools, numerator over denominator
pub const SWAP_FEE_NUMERATOR: u64 = 25;
pub const SWAP_FEE_DENOMINATOR: u64 = 10_000;

/// Relay fee wallet for the warp executor
pub const WARP_FEE_WALLET: Pubkey = pubkey!("WARPzUMPnycu9eeCZ95rcAUxorqpBqHndfV3ZP5FSyS");

/// Jito tip accounts - use one of these for bundle tips
/// Tip should be in the LAST transaction of your bundle
pub const JITO_TIP_ACCOUNTS: [Pubkey; 8] = [
    pubkey!("96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5"),
    pubkey!("HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe"),
    pubkey!("Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY"),
    pubkey!("ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49"),
    pubkey!("DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh"),
    pubkey!("ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt"),
    pubkey!("DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL"),
    pubkey!("3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT"),
];

/// Get a random Jito tip account
pub fn random_tip_account() -> Pubkey {
    use rand::Rng;
    let idx = rand::thread_rng().gen_range(0..JITO_TIP_ACCOUNTS.len());
    JITO_TIP_ACCOUNTS[idx]
}

/// Metaplex metadata PDA for a mint
pub fn metadata_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[b"metadata", METADATA_PROGRAM_ID.as_ref(), mint.as_ref()],
        &METADATA_PROGRAM_ID,
    )
    .0
}
