//! BABE digest parsing
//!
//! Digest logs arrive hex encoded as SCALE `DigestItem`s:
//! `[kind][engine_id: 4 bytes][compact payload length][payload]`.

use super::scale::{decode_compact, decode_hex};

const PRE_RUNTIME: u8 = 6;
const CONSENSUS: u8 = 4;
const BABE_ENGINE_ID: &[u8; 4] = b"BABE";

/// `ConsensusLog::NextEpochData`, emitted in the first block of every epoch
const NEXT_EPOCH_DATA: u8 = 1;

/// Slot claim carried by a BABE pre-runtime digest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BabePreDigest {
    pub authority_index: u32,
    pub slot: u64,
}

/// Split a digest log into (kind, engine id, payload)
fn split_log(log: &str) -> Option<(u8, [u8; 4], Vec<u8>)> {
    let bytes = decode_hex(log).ok()?;
    if bytes.len() < 6 {
        return None;
    }

    let kind = bytes[0];
    let engine: [u8; 4] = bytes[1..5].try_into().ok()?;
    let (len, consumed) = decode_compact(&bytes[5..]).ok()?;
    let start = 5 + consumed;
    let payload = bytes.get(start..start + len)?.to_vec();

    Some((kind, engine, payload))
}

/// Extract the BABE slot claim (authority index and slot) from digest logs
///
/// Primary (1), SecondaryPlain (2) and SecondaryVRF (3) pre-digests all start
/// with `authority_index: u32` followed by `slot: u64`.
pub fn extract_babe_pre_digest(logs: &[String]) -> Option<BabePreDigest> {
    logs.iter().find_map(|log| {
        let (kind, engine, payload) = split_log(log)?;
        if kind != PRE_RUNTIME || &engine != BABE_ENGINE_ID {
            return None;
        }
        if !matches!(payload.first(), Some(1..=3)) || payload.len() < 13 {
            return None;
        }

        let authority_index = u32::from_le_bytes(payload[1..5].try_into().ok()?);
        let slot = u64::from_le_bytes(payload[5..13].try_into().ok()?);
        Some(BabePreDigest {
            authority_index,
            slot,
        })
    })
}

/// Whether the header announces the next epoch, i.e. opens a new epoch
pub fn is_epoch_start(logs: &[String]) -> bool {
    logs.iter().any(|log| {
        matches!(
            split_log(log),
            Some((CONSENSUS, engine, payload))
                if &engine == BABE_ENGINE_ID && payload.first() == Some(&NEXT_EPOCH_DATA)
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // 0x06 "BABE" compact(13)=0x34 | SecondaryPlain(2) | index 5 | slot 0x1122334455
    const SECONDARY_PLAIN: &str = "0x06424142453402050000005544332211000000";

    #[test]
    fn test_extract_secondary_plain() {
        let logs = vec![SECONDARY_PLAIN.to_string()];
        let pre = extract_babe_pre_digest(&logs).unwrap();
        assert_eq!(pre.authority_index, 5);
        assert_eq!(pre.slot, 0x11_2233_4455);
    }

    #[test]
    fn test_extract_ignores_other_engines() {
        // AURA pre-runtime digest: 0x06 "aura" compact(8) slot
        let logs = vec!["0x066175726120778c911100000000".to_string()];
        assert_eq!(extract_babe_pre_digest(&logs), None);
        assert_eq!(extract_babe_pre_digest(&[]), None);
    }

    #[test]
    fn test_extract_truncated_payload() {
        // Declares 13 payload bytes but carries only 5
        let logs = vec!["0x0642414245340205000000".to_string()];
        assert_eq!(extract_babe_pre_digest(&logs), None);
    }

    #[test]
    fn test_epoch_start_marker() {
        // 0x04 "BABE" compact(2)=0x08 | NextEpochData(1) | empty authorities vec
        let next_epoch = "0x04424142450801".to_string() + "00";
        let logs = vec![SECONDARY_PLAIN.to_string(), next_epoch];
        assert!(is_epoch_start(&logs));

        // OnDisabled(2) is a consensus log but not an epoch change
        let disabled = "0x044241424508020000".to_string();
        assert!(!is_epoch_start(&[disabled]));
        assert!(!is_epoch_start(&[SECONDARY_PLAIN.to_string()]));
    }
}
