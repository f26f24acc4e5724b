//! Storage keys for the runtime items read by the ledger
//!
//! A plain storage value lives at `twox128(pallet) ++ twox128(item)`.

use std::hash::Hasher;
use twox_hash::XxHash64;

/// 128-bit xxHash as used by Substrate for pallet and item prefixes
pub fn twox_128(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (seed, chunk) in out.chunks_exact_mut(8).enumerate() {
        let mut hasher = XxHash64::with_seed(seed as u64);
        hasher.write(data);
        chunk.copy_from_slice(&hasher.finish().to_le_bytes());
    }
    out
}

/// Hex storage key (0x-prefixed) for a plain value or a map prefix
pub fn storage_key(pallet: &str, item: &str) -> String {
    format!(
        "0x{}{}",
        hex::encode(twox_128(pallet.as_bytes())),
        hex::encode(twox_128(item.as_bytes()))
    )
}

/// Runtime storage item with its SCALE byte width where it is an integer
#[derive(Debug, Clone, Copy)]
pub struct StorageItem {
    pub pallet: &'static str,
    pub item: &'static str,
    pub width: usize,
}

impl StorageItem {
    const fn new(pallet: &'static str, item: &'static str, width: usize) -> Self {
        Self {
            pallet,
            item,
            width,
        }
    }

    pub fn key(&self) -> String {
        storage_key(self.pallet, self.item)
    }
}

pub const EPOCH_INDEX: StorageItem = StorageItem::new("Babe", "EpochIndex", 8);
pub const GENESIS_SLOT: StorageItem = StorageItem::new("Babe", "GenesisSlot", 8);
pub const CURRENT_SLOT: StorageItem = StorageItem::new("Babe", "CurrentSlot", 8);
pub const SESSION_INDEX: StorageItem = StorageItem::new("Session", "CurrentIndex", 4);
pub const ERA_START_SESSION_INDEX: StorageItem =
    StorageItem::new("Staking", "CurrentEraStartSessionIndex", 4);
pub const TIMESTAMP_NOW: StorageItem = StorageItem::new("Timestamp", "Now", 8);
pub const TOTAL_ISSUANCE: StorageItem = StorageItem::new("Balances", "TotalIssuance", 16);
pub const EMISSION_SUPPLY: StorageItem = StorageItem::new("PoAModule", "EmissionSupply", 16);

/// `Vec<AccountId32>`, not an integer
pub const SESSION_VALIDATORS: StorageItem = StorageItem::new("Session", "Validators", 0);

/// Map prefix; one key per account
pub const SYSTEM_ACCOUNT: StorageItem = StorageItem::new("System", "Account", 0);
