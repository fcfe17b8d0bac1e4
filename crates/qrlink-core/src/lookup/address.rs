//! Ledger address validation with the Bech32m checksum (BIP-350).
//!
//! An address is `<entity>_<network>1<data><checksum>`, for example
//! `account_rdx1...`. The human-readable part names the entity type and the
//! network; the checksum covers both.

use crate::error::{QrLinkError, Result};
use serde::{Deserialize, Serialize};

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const BECH32M_CONST: u32 = 0x2bc8_30a3;
const GENERATOR: [u32; 5] = [0x3b6a_57b2, 0x2650_8e6d, 0x1ea1_19fa, 0x3d42_33dd, 0x2a14_62b3];
const CHECKSUM_LENGTH: usize = 6;
const MAX_ADDRESS_LENGTH: usize = 128;

/// Kind of ledger entity an address refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Account,
    Resource,
    Component,
    Package,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Account,
        EntityType::Resource,
        EntityType::Component,
        EntityType::Package,
    ];

    pub fn hrp_prefix(&self) -> &'static str {
        match self {
            EntityType::Account => "account_",
            EntityType::Resource => "resource_",
            EntityType::Component => "component_",
            EntityType::Package => "package_",
        }
    }
}

/// A validated address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAddress {
    /// Lowercase canonical form.
    pub address: String,
    pub entity_type: EntityType,
    /// Network suffix of the human-readable part, e.g. `rdx` or `tdx_2_`.
    pub network: String,
}

/// Split and checksum-verify a Bech32m string.
///
/// Returns the lowercase human-readable part and the 5-bit data values
/// without the checksum.
pub fn decode_bech32m(input: &str) -> std::result::Result<(String, Vec<u8>), String> {
    if input.len() > MAX_ADDRESS_LENGTH {
        return Err(format!("longer than {} characters", MAX_ADDRESS_LENGTH));
    }
    let has_lower = input.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = input.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err("mixed case".to_string());
    }
    let lowered = input.to_ascii_lowercase();

    let separator = lowered.rfind('1').ok_or("missing separator '1'")?;
    let (hrp, data_part) = (&lowered[..separator], &lowered[separator + 1..]);
    if hrp.is_empty() {
        return Err("empty human-readable part".to_string());
    }
    if hrp.bytes().any(|b| !(33..=126).contains(&b)) {
        return Err("invalid character in human-readable part".to_string());
    }
    if data_part.len() < CHECKSUM_LENGTH {
        return Err("checksum too short".to_string());
    }

    let data = data_part
        .bytes()
        .map(|b| {
            CHARSET
                .iter()
                .position(|c| *c == b)
                .map(|p| p as u8)
                .ok_or_else(|| format!("invalid data character '{}'", b as char))
        })
        .collect::<std::result::Result<Vec<u8>, String>>()?;

    let mut values = hrp_expand(hrp);
    values.extend_from_slice(&data);
    if polymod(&values) != BECH32M_CONST {
        return Err("invalid Bech32m checksum".to_string());
    }

    Ok((hrp.to_string(), data[..data.len() - CHECKSUM_LENGTH].to_vec()))
}

/// Encode 5-bit `data` under `hrp` with a Bech32m checksum.
pub fn encode_bech32m(hrp: &str, data: &[u8]) -> String {
    let hrp = hrp.to_ascii_lowercase();
    let mut values = hrp_expand(&hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0; CHECKSUM_LENGTH]);
    let checksum = polymod(&values) ^ BECH32M_CONST;

    let mut out = hrp;
    out.push('1');
    for value in data {
        out.push(CHARSET[(*value & 31) as usize] as char);
    }
    for i in 0..CHECKSUM_LENGTH {
        let value = (checksum >> (5 * (5 - i))) & 31;
        out.push(CHARSET[value as usize] as char);
    }
    out
}

/// Validate `address` as any known entity type.
pub fn validate_address(address: &str) -> Result<LedgerAddress> {
    let invalid = |reason: String| QrLinkError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let trimmed = address.trim();
    let (hrp, data) = decode_bech32m(trimmed).map_err(invalid)?;
    if data.is_empty() {
        return Err(invalid("empty address body".to_string()));
    }

    let (entity_type, network) = EntityType::ALL
        .iter()
        .find_map(|entity| {
            hrp.strip_prefix(entity.hrp_prefix())
                .map(|network| (*entity, network.to_string()))
        })
        .ok_or_else(|| invalid(format!("unknown address prefix '{}'", hrp)))?;
    if network.is_empty() {
        return Err(invalid("missing network in address prefix".to_string()));
    }

    Ok(LedgerAddress {
        address: trimmed.to_ascii_lowercase(),
        entity_type,
        network,
    })
}

/// Validate `address` and require a specific entity type.
pub fn validate_address_of(address: &str, expected: EntityType) -> Result<LedgerAddress> {
    let parsed = validate_address(address)?;
    if parsed.entity_type != expected {
        return Err(QrLinkError::InvalidAddress {
            address: address.to_string(),
            reason: format!("expected {:?} address, got {:?}", expected, parsed.entity_type),
        });
    }
    Ok(parsed)
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let bytes = hrp.as_bytes();
    let mut values = Vec::with_capacity(bytes.len() * 2 + 1);
    values.extend(bytes.iter().map(|b| b >> 5));
    values.push(0);
    values.extend(bytes.iter().map(|b| b & 31));
    values
}

fn polymod(values: &[u8]) -> u32 {
    let mut chk: u32 = 1;
    for value in values {
        let top = chk >> 25;
        chk = ((chk & 0x01ff_ffff) << 5) ^ u32::from(*value);
        for (i, generator) in GENERATOR.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= generator;
            }
        }
    }
    chk
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;

    /// A checksum-valid address for tests.
    pub(crate) fn sample_address(entity: EntityType, seed: u8) -> String {
        let data: Vec<u8> = (0..40).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed) & 31).collect();
        encode_bech32m(&format!("{}tdx_2_", entity.hrp_prefix()), &data)
    }

    #[test]
    fn test_reference_vectors() {
        assert!(decode_bech32m("a1lqfn3a").is_ok());
        assert!(decode_bech32m("A1LQFN3A").is_ok());
        assert!(decode_bech32m("A1lqfn3a").is_err());
        assert!(decode_bech32m("a1lqfn3b").is_err());
    }

    #[test]
    fn test_encode_decode_agree() {
        let data = vec![0, 1, 2, 3, 31, 30, 29];
        let encoded = encode_bech32m("account_rdx", &data);
        let (hrp, decoded) = decode_bech32m(&encoded).unwrap();
        assert_eq!(hrp, "account_rdx");
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_validate_address() {
        let address = sample_address(EntityType::Account, 3);
        let parsed = validate_address(&address).unwrap();
        assert_eq!(parsed.entity_type, EntityType::Account);
        assert_eq!(parsed.network, "tdx_2_");

        let upper = address.to_ascii_uppercase();
        assert_eq!(validate_address(&upper).unwrap().address, address);
    }

    #[test]
    fn test_rejects_bad_addresses() {
        let address = sample_address(EntityType::Resource, 9);
        let mut corrupted = address.clone();
        let last = corrupted.pop().unwrap();
        corrupted.push(if last == 'q' { 'p' } else { 'q' });

        let no_network = encode_bech32m("account_", &[1, 2, 3]);
        let no_body = encode_bech32m("account_rdx", &[]);

        for bad in [
            corrupted.as_str(),
            "",
            "account_rdx",
            "wallet_rdx1qqqqqqqqqq",
            no_network.as_str(),
            no_body.as_str(),
        ] {
            let err = validate_address(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidAddress, "{bad}");
        }
    }

    #[test]
    fn test_expected_entity_type() {
        let resource = sample_address(EntityType::Resource, 1);
        assert!(validate_address_of(&resource, EntityType::Resource).is_ok());
        assert!(validate_address_of(&resource, EntityType::Account).is_err());
    }
}
