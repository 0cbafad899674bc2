//! The Marmot Group Data Extension: binary codec (§3, §4.1).
//!
//! A length-prefixed binary structure embedded in the MLS group context
//! under extension type [`GROUP_DATA_EXTENSION_TYPE`]. The cursor-based
//! reader here is grounded on `lockframe_proto::header::FrameHeader`'s
//! bounds-checked field reads, adapted to variable-length fields (which
//! `zerocopy`, used for the teacher's fixed 128-byte header, cannot
//! express).

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

/// Extension type under which Marmot Group Data is stored in the MLS group
/// context.
pub const GROUP_DATA_EXTENSION_TYPE: u16 = 0xF2EE;

/// Current Marmot Group Data wire version.
pub const CURRENT_VERSION: u16 = 1;

/// Minimum encoded size: every length-prefixed field empty.
pub const MIN_ENCODED_SIZE: usize = 48;

/// Errors from encoding or decoding [`MarmotGroupData`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupDataError {
    /// A field failed validation before encoding.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// The input was too short to contain a field at the given byte offset.
    #[error("truncated at offset {offset}")]
    Truncated {
        /// Byte offset where the read ran out of input.
        offset: usize,
    },

    /// The wire version was not a version this codec understands (`0` is
    /// explicitly invalid; a nonzero unknown version is a reserved path for
    /// future message formats).
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u16),
}

/// The Marmot Group Data Extension (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarmotGroupData {
    /// Wire version. Always [`CURRENT_VERSION`] for data produced by this
    /// codec; decoding tolerates any nonzero version.
    pub version: u16,
    /// The opaque, public group identifier published on transport events.
    pub nostr_group_id: [u8; 32],
    /// Human-readable group name.
    pub name: String,
    /// Human-readable group description.
    pub description: String,
    /// Lower-cased 64-hex admin public keys, unique.
    pub admin_pubkeys: Vec<String>,
    /// Group relay URLs (`ws://` or `wss://`).
    pub relays: Vec<Url>,
    /// SHA-256 image hash: empty, or exactly 32 bytes.
    pub image_hash: Vec<u8>,
    /// Image decryption key: empty, or exactly 32 bytes.
    pub image_key: Vec<u8>,
    /// Image AEAD nonce: empty, or exactly 12 bytes.
    pub image_nonce: Vec<u8>,
}

impl MarmotGroupData {
    fn validate(&self) -> Result<(), GroupDataError> {
        for key in &self.admin_pubkeys {
            if key.len() != 64 || !key.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(GroupDataError::InvalidField {
                    field: "admin_pubkeys",
                    reason: format!("`{key}` is not 64 hex characters"),
                });
            }
        }
        let lowercased: HashSet<String> =
            self.admin_pubkeys.iter().map(|k| k.to_ascii_lowercase()).collect();
        if lowercased.len() != self.admin_pubkeys.len() {
            return Err(GroupDataError::InvalidField {
                field: "admin_pubkeys",
                reason: "admin set must be unique under lower-casing".to_owned(),
            });
        }

        for relay in &self.relays {
            if relay.scheme() != "ws" && relay.scheme() != "wss" {
                return Err(GroupDataError::InvalidField {
                    field: "relays",
                    reason: format!("`{relay}` is not a ws:// or wss:// URL"),
                });
            }
        }

        if !self.image_hash.is_empty() && self.image_hash.len() != 32 {
            return Err(GroupDataError::InvalidField {
                field: "image_hash",
                reason: format!("expected 0 or 32 bytes, got {}", self.image_hash.len()),
            });
        }
        if !self.image_key.is_empty() && self.image_key.len() != 32 {
            return Err(GroupDataError::InvalidField {
                field: "image_key",
                reason: format!("expected 0 or 32 bytes, got {}", self.image_key.len()),
            });
        }
        if !self.image_nonce.is_empty() && self.image_nonce.len() != 12 {
            return Err(GroupDataError::InvalidField {
                field: "image_nonce",
                reason: format!("expected 0 or 12 bytes, got {}", self.image_nonce.len()),
            });
        }

        Ok(())
    }

    /// Encode into the wire layout of §3.
    ///
    /// # Errors
    ///
    /// Returns [`GroupDataError::InvalidField`] if any invariant of §3 is
    /// violated.
    pub fn encode(&self) -> Result<Vec<u8>, GroupDataError> {
        self.validate()?;

        let mut out = Vec::with_capacity(MIN_ENCODED_SIZE);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.nostr_group_id);
        write_str(&mut out, &self.name);
        write_str(&mut out, &self.description);
        write_str(&mut out, &self.admin_pubkeys.join(","));
        let relay_list = self.relays.iter().map(Url::to_string).collect::<Vec<_>>().join(",");
        write_str(&mut out, &relay_list);
        write_bytes(&mut out, &self.image_hash);
        write_bytes(&mut out, &self.image_key);
        write_bytes(&mut out, &self.image_nonce);
        Ok(out)
    }

    /// Decode from the wire layout of §3.
    ///
    /// Trailing bytes past the last declared field are tolerated as
    /// future-version padding. Any truncation mid-field fails with
    /// [`GroupDataError::Truncated`].
    ///
    /// # Errors
    ///
    /// Returns [`GroupDataError::Truncated`] if `bytes` ends before a
    /// declared field, [`GroupDataError::UnsupportedVersion`] if the
    /// version is `0`, or [`GroupDataError::InvalidField`] if the decoded
    /// fields violate §3's invariants.
    pub fn decode(bytes: &[u8]) -> Result<Self, GroupDataError> {
        let mut cursor = Cursor::new(bytes);

        let version = cursor.read_u16()?;
        if version == 0 {
            return Err(GroupDataError::UnsupportedVersion(version));
        }

        let nostr_group_id = cursor.read_array::<32>()?;
        let name = cursor.read_string()?;
        let description = cursor.read_string()?;
        let admin_field = cursor.read_string()?;
        let relay_field = cursor.read_string()?;
        let image_hash = cursor.read_bytes()?;
        let image_key = cursor.read_bytes()?;
        let image_nonce = cursor.read_bytes()?;

        let admin_pubkeys: Vec<String> =
            if admin_field.is_empty() { Vec::new() } else { admin_field.split(',').map(str::to_owned).collect() };

        let relays = if relay_field.is_empty() {
            Vec::new()
        } else {
            relay_field
                .split(',')
                .map(|s| {
                    Url::parse(s).map_err(|e| GroupDataError::InvalidField {
                        field: "relays",
                        reason: e.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let data = Self {
            version,
            nostr_group_id,
            name,
            description,
            admin_pubkeys,
            relays,
            image_hash,
            image_key,
            image_nonce,
        };
        data.validate()?;
        Ok(data)
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    write_bytes(out, s.as_bytes());
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    #[allow(clippy::cast_possible_truncation)]
    let len = bytes.len() as u16;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], GroupDataError> {
        let end = self.offset + len;
        if end > self.bytes.len() {
            return Err(GroupDataError::Truncated { offset: self.offset });
        }
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, GroupDataError> {
        let slice = self.take(2)?;
        Ok(u16::from_be_bytes([slice[0], slice[1]]))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], GroupDataError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>, GroupDataError> {
        let len = self.read_u16()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn read_string(&mut self) -> Result<String, GroupDataError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| GroupDataError::InvalidField {
            field: "utf8 field",
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn sample() -> MarmotGroupData {
        MarmotGroupData {
            version: CURRENT_VERSION,
            nostr_group_id: [0x11; 32],
            name: "book club".to_owned(),
            description: "we read books".to_owned(),
            admin_pubkeys: vec!["a".repeat(64), "b".repeat(64)],
            relays: vec![Url::parse("wss://relay.example.com").unwrap()],
            image_hash: vec![0x22; 32],
            image_key: vec![0x33; 32],
            image_nonce: vec![0x44; 12],
        }
    }

    #[test]
    fn round_trip() {
        let data = sample();
        let encoded = data.encode().unwrap();
        let decoded = MarmotGroupData::decode(&encoded).unwrap();
        assert_eq!(data, decoded);
    }

    #[test]
    fn empty_fields_encode_to_minimum_size() {
        let data = MarmotGroupData {
            version: CURRENT_VERSION,
            nostr_group_id: [0u8; 32],
            name: String::new(),
            description: String::new(),
            admin_pubkeys: Vec::new(),
            relays: Vec::new(),
            image_hash: Vec::new(),
            image_key: Vec::new(),
            image_nonce: Vec::new(),
        };
        let encoded = data.encode().unwrap();
        assert_eq!(encoded.len(), MIN_ENCODED_SIZE);
    }

    #[test]
    fn zero_version_rejected_on_decode() {
        let mut data = sample();
        data.version = 0;
        // Build the bytes by hand since `encode` would itself reject version 0
        // only via validate() not checking version - simulate raw bytes.
        let mut encoded = data.encode_allow_invalid_version();
        encoded[1] = 0;
        let err = MarmotGroupData::decode(&encoded).unwrap_err();
        assert!(matches!(err, GroupDataError::UnsupportedVersion(0)));
    }

    impl MarmotGroupData {
        fn encode_allow_invalid_version(&self) -> Vec<u8> {
            let mut clone = self.clone();
            clone.version = CURRENT_VERSION;
            clone.encode().unwrap()
        }
    }

    #[test]
    fn truncated_input_rejected() {
        let encoded = sample().encode().unwrap();
        for offset in 0..encoded.len() {
            let prefix = &encoded[..offset];
            let result = MarmotGroupData::decode(prefix);
            assert!(result.is_err(), "expected error at truncated offset {offset}");
        }
    }

    #[test]
    fn trailing_bytes_tolerated() {
        let mut encoded = sample().encode().unwrap();
        encoded.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
        let decoded = MarmotGroupData::decode(&encoded).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn rejects_non_hex_admin_key() {
        let mut data = sample();
        data.admin_pubkeys = vec!["not-hex".to_owned()];
        assert!(data.encode().is_err());
    }

    #[test]
    fn rejects_duplicate_admin_under_lowercasing() {
        let mut data = sample();
        data.admin_pubkeys = vec!["A".repeat(64), "a".repeat(64)];
        assert!(data.encode().is_err());
    }

    #[test]
    fn rejects_non_ws_relay_scheme() {
        let mut data = sample();
        data.relays = vec![Url::parse("https://relay.example.com").unwrap()];
        assert!(data.encode().is_err());
    }

    #[test]
    fn rejects_wrong_length_image_fields() {
        let mut data = sample();
        data.image_hash = vec![0u8; 5];
        assert!(data.encode().is_err());
    }

    #[test]
    fn relay_url_normalization_survives_round_trip() {
        let mut data = sample();
        // `Url::parse` normalizes a bare-host URL with a trailing slash.
        data.relays = vec![Url::parse("wss://relay.example.com").unwrap()];
        let encoded = data.encode().unwrap();
        let decoded = MarmotGroupData::decode(&encoded).unwrap();
        assert_eq!(decoded.relays[0].as_str(), "wss://relay.example.com/");
    }

    proptest::proptest! {
        /// §8 property 1: every valid `MarmotGroupData` round-trips through
        /// `encode`/`decode` unchanged, for arbitrary field contents within
        /// §3's invariants (not just the one hand-picked `sample()`).
        #[test]
        fn arbitrary_valid_group_data_round_trips(
            name in ".{0,40}",
            description in ".{0,40}",
            nostr_group_id in proptest::array::uniform32(proptest::num::u8::ANY),
            admin_count in 0usize..4,
            relay_count in 1usize..4,
            has_image in proptest::bool::ANY,
        ) {
            let admin_pubkeys: Vec<String> = (0..admin_count).map(|i| format!("{i:064x}")).collect();
            let relays: Vec<Url> = (0..relay_count)
                .map(|i| Url::parse(&format!("wss://relay{i}.example.com")).unwrap())
                .collect();
            let (image_hash, image_key, image_nonce) = if has_image {
                (vec![0x22; 32], vec![0x33; 32], vec![0x44; 12])
            } else {
                (Vec::new(), Vec::new(), Vec::new())
            };
            let data = MarmotGroupData {
                version: CURRENT_VERSION,
                nostr_group_id,
                name,
                description,
                admin_pubkeys,
                relays,
                image_hash,
                image_key,
                image_nonce,
            };
            let encoded = data.encode().unwrap();
            let decoded = MarmotGroupData::decode(&encoded).unwrap();
            prop_assert_eq!(decoded, data);
        }

        /// Supplements `truncated_input_rejected`'s exhaustive-prefix check
        /// with arbitrary single-byte mutation plus truncation: `decode`
        /// must never panic on attacker-controlled bytes, only return
        /// `Err`.
        #[test]
        fn mutated_or_truncated_bytes_never_panic(
            mutation_offset in 0usize..200,
            mutation_byte in proptest::num::u8::ANY,
            truncate_to in 0usize..200,
        ) {
            let mut encoded = sample().encode().unwrap();
            if mutation_offset < encoded.len() {
                encoded[mutation_offset] = mutation_byte;
            }
            let truncate_to = truncate_to.min(encoded.len());
            let _ = MarmotGroupData::decode(&encoded[..truncate_to]);
        }
    }
}
