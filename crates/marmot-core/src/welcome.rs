//! Welcome handler (§4.7): builds and parses the kind-444 transport event
//! shape, and resolves inbox-relay priority as a pure function so it is
//! unit-testable without a real gift-wrap dependency (out of scope, §1).

use thiserror::Error;
use url::Url;

use crate::config::UnsignedEvent;
use crate::data::event::{Kind, TransportEvent};

/// Errors building or parsing a welcome event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WelcomeError {
    /// The event's content was not valid under its declared (or default)
    /// encoding.
    #[error("malformed welcome content: {0}")]
    MalformedContent(String),

    /// The event was not a kind-444 event.
    #[error("expected a kind-444 welcome event, got kind {0}")]
    WrongKind(u16),
}

/// Build an unsigned kind-444 draft wrapping `welcome_bytes`.
#[must_use]
pub fn create_welcome_rumor(
    welcome_bytes: &[u8],
    key_package_event_id: &str,
    author: [u8; 32],
    group_relays: &[Url],
) -> UnsignedEvent {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let content = STANDARD.encode(welcome_bytes);
    let mut tags = vec![vec!["e".to_owned(), key_package_event_id.to_owned()]];

    let mut relays_tag = vec!["relays".to_owned()];
    relays_tag.extend(group_relays.iter().map(Url::to_string));
    tags.push(relays_tag);

    tags.push(vec!["encoding".to_owned(), "base64".to_owned()]);

    UnsignedEvent { kind: Kind::Welcome.as_u16(), pubkey: author, content, tags }
}

/// Decode an MLS Welcome from a kind-444 [`TransportEvent`].
///
/// Reads the `encoding` tag if present, defaulting to `hex` for backward
/// compatibility (§4.7).
///
/// # Errors
///
/// Returns [`WelcomeError::WrongKind`] if `event` is not kind 444, or
/// [`WelcomeError::MalformedContent`] if the content does not decode under
/// the resolved encoding.
pub fn get_welcome(event: &TransportEvent) -> Result<Vec<u8>, WelcomeError> {
    if event.kind != Kind::Welcome.as_u16() {
        return Err(WelcomeError::WrongKind(event.kind));
    }

    let encoding = event.tag_value("encoding").unwrap_or("hex");
    match encoding {
        "base64" => {
            use base64::{engine::general_purpose::STANDARD, Engine as _};
            STANDARD.decode(&event.content).map_err(|e| WelcomeError::MalformedContent(e.to_string()))
        }
        _ => hex::decode(&event.content).map_err(|e| WelcomeError::MalformedContent(e.to_string())),
    }
}

/// Resolve which relays to gift-wrap the welcome to, in priority order
/// (§4.7): (1) an explicit caller-supplied list, (2) the `relays` tag on
/// the key-package event that initiated the add, (3) the group's relays.
#[must_use]
pub fn resolve_inbox_relays(
    explicit: Option<&[Url]>,
    key_package_event_relays: Option<&[Url]>,
    group_relays: &[Url],
) -> Vec<Url> {
    if let Some(relays) = explicit {
        if !relays.is_empty() {
            return relays.to_vec();
        }
    }
    if let Some(relays) = key_package_event_relays {
        if !relays.is_empty() {
            return relays.to_vec();
        }
    }
    group_relays.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn round_trip_base64() {
        let relays = vec![relay("wss://relay.example.com")];
        let rumor = create_welcome_rumor(b"welcome bytes", "kp-event-id", [1u8; 32], &relays);
        let event = TransportEvent {
            kind: rumor.kind,
            pubkey: rumor.pubkey,
            created_at: 1,
            content: rumor.content,
            tags: rumor.tags,
            id: [0u8; 32],
            sig: [0u8; 64],
        };
        assert_eq!(get_welcome(&event).unwrap(), b"welcome bytes");
    }

    #[test]
    fn defaults_to_hex_when_encoding_tag_absent() {
        let event = TransportEvent {
            kind: Kind::Welcome.as_u16(),
            pubkey: [0u8; 32],
            created_at: 1,
            content: hex::encode(b"legacy welcome"),
            tags: vec![],
            id: [0u8; 32],
            sig: [0u8; 64],
        };
        assert_eq!(get_welcome(&event).unwrap(), b"legacy welcome");
    }

    #[test]
    fn rejects_wrong_kind() {
        let event = TransportEvent {
            kind: Kind::GroupEvent.as_u16(),
            pubkey: [0u8; 32],
            created_at: 1,
            content: String::new(),
            tags: vec![],
            id: [0u8; 32],
            sig: [0u8; 64],
        };
        assert!(matches!(get_welcome(&event), Err(WelcomeError::WrongKind(_))));
    }

    #[test]
    fn inbox_priority_prefers_explicit() {
        let explicit = vec![relay("wss://explicit.example.com")];
        let kp_relays = vec![relay("wss://kp.example.com")];
        let group_relays = vec![relay("wss://group.example.com")];
        let resolved = resolve_inbox_relays(Some(&explicit), Some(&kp_relays), &group_relays);
        assert_eq!(resolved, explicit);
    }

    #[test]
    fn inbox_priority_falls_back_to_key_package_relays() {
        let kp_relays = vec![relay("wss://kp.example.com")];
        let group_relays = vec![relay("wss://group.example.com")];
        let resolved = resolve_inbox_relays(None, Some(&kp_relays), &group_relays);
        assert_eq!(resolved, kp_relays);
    }

    #[test]
    fn inbox_priority_falls_back_to_group_relays() {
        let group_relays = vec![relay("wss://group.example.com")];
        let resolved = resolve_inbox_relays(None, None, &group_relays);
        assert_eq!(resolved, group_relays);
    }

    #[test]
    fn inbox_priority_skips_empty_lists() {
        let empty: Vec<Url> = vec![];
        let group_relays = vec![relay("wss://group.example.com")];
        let resolved = resolve_inbox_relays(Some(&empty), Some(&empty), &group_relays);
        assert_eq!(resolved, group_relays);
    }
}
