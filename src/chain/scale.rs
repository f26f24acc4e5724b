//! SCALE codec utilities for decoding Substrate storage values
//!
//! Only the shapes the ledger reads are supported: little-endian unsigned
//! integers of any width and compact-prefixed vectors of 32-byte account ids.

use anyhow::{Context, Result};
use num_bigint::BigUint;

/// Decode a hex storage value (with or without 0x prefix) into raw bytes
pub fn decode_hex(hex_value: &str) -> Result<Vec<u8>> {
    hex::decode(hex_value.trim_start_matches("0x")).context("Failed to decode hex string")
}

/// Decode a little-endian unsigned integer of the given byte width
///
/// Storage items under `ValueQuery` that were never written come back as
/// `null`; those decode to zero, mirroring the runtime default.
pub fn decode_uint(bytes: Option<&[u8]>, width: usize) -> Result<BigUint> {
    let Some(bytes) = bytes else {
        return Ok(BigUint::default());
    };

    if bytes.len() != width {
        anyhow::bail!(
            "Invalid integer length: expected {} bytes, got {} bytes",
            width,
            bytes.len()
        );
    }

    Ok(BigUint::from_bytes_le(bytes))
}

/// Decode a SCALE-encoded `Vec<AccountId32>`
///
/// Format: 0x[compact_count][id1][id2]...[idN], each id 32 bytes
pub fn decode_account_ids(bytes: &[u8]) -> Result<Vec<String>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }

    let (count, offset) = decode_compact(bytes)?;

    let id_data = &bytes[offset..];
    let expected_bytes = count * 32;

    if id_data.len() != expected_bytes {
        anyhow::bail!(
            "Invalid data length: expected {} bytes for {} account ids (32 bytes each), got {} bytes",
            expected_bytes,
            count,
            id_data.len()
        );
    }

    Ok(id_data
        .chunks_exact(32)
        .map(|chunk| format!("0x{}", hex::encode(chunk)))
        .collect())
}

/// Decode SCALE compact-encoded integer
///
/// Returns: (value, bytes_consumed)
///
/// Compact encoding modes:
/// - 0b00: Single-byte mode (0-63)
/// - 0b01: Two-byte mode (64-16383)
/// - 0b10: Four-byte mode (16384-1073741823)
/// - 0b11: Big-integer mode (> 2^30 - not supported here)
pub fn decode_compact(bytes: &[u8]) -> Result<(usize, usize)> {
    if bytes.is_empty() {
        anyhow::bail!("Cannot decode compact from empty bytes");
    }

    let first = bytes[0];

    match first & 0b11 {
        0b00 => Ok(((first >> 2) as usize, 1)),

        0b01 => {
            if bytes.len() < 2 {
                anyhow::bail!("Not enough bytes for two-byte compact mode");
            }
            let value = (((first as u16) >> 2) | ((bytes[1] as u16) << 6)) as usize;
            Ok((value, 2))
        }

        0b10 => {
            if bytes.len() < 4 {
                anyhow::bail!("Not enough bytes for four-byte compact mode");
            }
            let value = (((first as u32) >> 2)
                | ((bytes[1] as u32) << 6)
                | ((bytes[2] as u32) << 14)
                | ((bytes[3] as u32) << 22)) as usize;
            Ok((value, 4))
        }

        _ => anyhow::bail!("Big-integer compact mode not supported"),
    }
}
