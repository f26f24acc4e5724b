use anyhow::{Context, Result};
use serde::Deserialize;

/// Response from chain_getHeader RPC call
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub parent_hash: String,
    pub number: String,
    pub state_root: String,
    pub extrinsics_root: String,
    pub digest: Option<Digest>,
}

impl BlockHeader {
    pub fn block_number(&self) -> Result<u64> {
        parse_hex_number(&self.number)
            .with_context(|| format!("Invalid block number in header: {:?}", self.number))
    }

    /// Digest logs, empty for headers without a digest (genesis)
    pub fn logs(&self) -> &[String] {
        self.digest.as_ref().map(|d| d.logs.as_slice()).unwrap_or(&[])
    }
}

/// Block digest containing consensus logs
#[derive(Debug, Clone, Deserialize)]
pub struct Digest {
    pub logs: Vec<String>,
}

/// Parse a hex string (with or without 0x prefix) to u64
pub fn parse_hex_number(s: &str) -> Option<u64> {
    let hex_str = s.trim_start_matches("0x");
    u64::from_str_radix(hex_str, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_number() {
        assert_eq!(parse_hex_number("0x332534"), Some(3351860));
        assert_eq!(parse_hex_number("0x0"), Some(0));
        assert_eq!(parse_hex_number("332534"), Some(3351860));
        assert_eq!(parse_hex_number("0xzz"), None);
    }

    #[test]
    fn test_header_deserialize() {
        let json = r#"{
            "parentHash": "0xaa",
            "number": "0x1f",
            "stateRoot": "0xbb",
            "extrinsicsRoot": "0xcc",
            "digest": { "logs": ["0x0642414245"] }
        }"#;
        let header: BlockHeader = serde_json::from_str(json).unwrap();
        assert_eq!(header.block_number().unwrap(), 31);
        assert_eq!(header.logs().len(), 1);
        assert_eq!(header.parent_hash, "0xaa");
    }

    #[test]
    fn test_malformed_number_is_an_error() {
        let json = r#"{
            "parentHash": "0xaa",
            "number": "0xnope",
            "stateRoot": "0xbb",
            "extrinsicsRoot": "0xcc"
        }"#;
        let header: BlockHeader = serde_json::from_str(json).unwrap();
        assert!(header.block_number().is_err());
        assert!(header.logs().is_empty());
    }
}
