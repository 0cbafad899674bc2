//! Transport event shape: the Nostr-like envelope every Marmot message
//! rides inside (§2, §5).

use thiserror::Error;

/// Event kinds this crate produces or consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A published MLS key package.
    KeyPackage,
    /// An MLS Welcome message, addressed to a single new member.
    Welcome,
    /// An encrypted group event: an MLS handshake or application message.
    GroupEvent,
    /// A relay list advertising where a user's key packages can be found.
    KeyPackageRelayList,
    /// A request to delete a previously published event.
    Deletion,
}

impl Kind {
    /// The numeric kind value carried on the wire.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Deletion => 5,
            Self::KeyPackage => 443,
            Self::Welcome => 444,
            Self::GroupEvent => 445,
            Self::KeyPackageRelayList => 10051,
        }
    }

    /// Recover a [`Kind`] from its wire value.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            5 => Some(Self::Deletion),
            443 => Some(Self::KeyPackage),
            444 => Some(Self::Welcome),
            445 => Some(Self::GroupEvent),
            10051 => Some(Self::KeyPackageRelayList),
            _ => None,
        }
    }
}

/// Errors constructing or parsing a [`TransportEvent`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A hex field was not valid hex, or not the expected length.
    #[error("invalid hex in field `{field}`: {reason}")]
    InvalidHex {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}

/// A signed transport event, shaped like a Nostr event.
///
/// This type models the wire envelope only; signing is delegated to an
/// external `Signer` (the envelope payload and the signature scheme are
/// outside this crate's concern — see the `signer` module).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Numeric event kind (see [`Kind`]).
    pub kind: u16,
    /// Sender public key, 32 bytes.
    pub pubkey: [u8; 32],
    /// Unix timestamp, in seconds, at which the event was created.
    pub created_at: u64,
    /// Event payload. Encoding (plaintext, base64, encrypted envelope) is
    /// determined by `kind`.
    pub content: String,
    /// Event tags, each an ordered list of strings.
    pub tags: Vec<Vec<String>>,
    /// Event id: a content hash, 32 bytes.
    pub id: [u8; 32],
    /// Schnorr (or equivalent) signature over `id`, 64 bytes.
    pub sig: [u8; 64],
}

impl TransportEvent {
    /// The event's [`Kind`], if `kind` is one this crate recognizes.
    #[must_use]
    pub const fn parsed_kind(&self) -> Option<Kind> {
        Kind::from_u16(self.kind)
    }

    /// Hex-encoded event id.
    #[must_use]
    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// Hex-encoded sender public key.
    #[must_use]
    pub fn pubkey_hex(&self) -> String {
        hex::encode(self.pubkey)
    }

    /// The value of the first tag whose first element matches `name`, if
    /// any.
    #[must_use]
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags.iter().find(|tag| tag.first().map(String::as_str) == Some(name)).and_then(|tag| tag.get(1)).map(String::as_str)
    }
}

/// Parse a hex string into a fixed-size byte array.
///
/// # Errors
///
/// Returns [`EventError::InvalidHex`] if `value` is not valid hex of
/// exactly `N` bytes.
pub fn hex_to_array<const N: usize>(field: &'static str, value: &str) -> Result<[u8; N], EventError> {
    let decoded =
        hex::decode(value).map_err(|e| EventError::InvalidHex { field, reason: e.to_string() })?;
    if decoded.len() != N {
        return Err(EventError::InvalidHex {
            field,
            reason: format!("expected {N} bytes, got {}", decoded.len()),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&decoded);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TransportEvent {
        TransportEvent {
            kind: Kind::GroupEvent.as_u16(),
            pubkey: [1u8; 32],
            created_at: 1_700_000_000,
            content: "payload".to_owned(),
            tags: vec![vec!["h".to_owned(), "group-id-hex".to_owned()]],
            id: [2u8; 32],
            sig: [3u8; 64],
        }
    }

    #[test]
    fn kind_round_trips_through_u16() {
        for kind in [Kind::KeyPackage, Kind::Welcome, Kind::GroupEvent, Kind::KeyPackageRelayList, Kind::Deletion] {
            assert_eq!(Kind::from_u16(kind.as_u16()), Some(kind));
        }
    }

    #[test]
    fn unknown_kind_value_is_none() {
        assert_eq!(Kind::from_u16(1), None);
    }

    #[test]
    fn parsed_kind_matches_literal() {
        let event = sample();
        assert_eq!(event.parsed_kind(), Some(Kind::GroupEvent));
    }

    #[test]
    fn tag_value_finds_first_match() {
        let event = sample();
        assert_eq!(event.tag_value("h"), Some("group-id-hex"));
        assert_eq!(event.tag_value("missing"), None);
    }

    #[test]
    fn hex_to_array_round_trips() {
        let bytes = [9u8; 32];
        let encoded = hex::encode(bytes);
        let decoded: [u8; 32] = hex_to_array("test", &encoded).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn hex_to_array_rejects_wrong_length() {
        let err = hex_to_array::<32>("test", "abcd").unwrap_err();
        assert!(matches!(err, EventError::InvalidHex { .. }));
    }

    #[test]
    fn id_and_pubkey_hex_are_lowercase() {
        let event = sample();
        assert_eq!(event.id_hex(), "02".repeat(32));
        assert_eq!(event.pubkey_hex(), "01".repeat(32));
    }
}
