//! Commit resolver (§4.9): decrypts and classifies a batch of kind-445
//! events, applies at most one commit per epoch in a fixed total order, and
//! surfaces application messages and proposals to the caller.
//!
//! Grounded on `lockframe_core::mls::group::MlsGroup::process_message`'s
//! decrypt-classify-merge shape, generalized from one frame at a time to a
//! batch that must converge on a single, permutation-invariant final state
//! regardless of arrival order (§8 property 3).

use openmls::prelude::{MlsMessageIn, ProcessedMessageContent, ProtocolMessage, StagedCommit};
use thiserror::Error;
use tls_codec::Deserialize as _;
use tracing::{debug, warn};

use crate::{
    client_state::ClientState,
    credential::credential_pubkey,
    data::event::{Kind, TransportEvent},
    env::Environment,
    envelope::{self, EnvelopeError},
};

/// Errors attached to a single skipped event. Never fatal to the batch
/// (§7): a resolver run always completes and reports its casualties rather
/// than aborting.
#[derive(Error, Debug, Clone)]
pub enum ResolverError {
    /// The envelope did not decrypt under the epoch secret this resolver
    /// run derived.
    #[error(transparent)]
    Unreadable(EnvelopeError),

    /// `openmls` rejected the decrypted wire message.
    #[error("mls protocol error: {0}")]
    MlsProtocol(String),
}

/// One classified, order-resolved outcome.
#[derive(Debug)]
pub enum Resolved {
    /// A decrypted application message.
    Application {
        /// The kind-445 event id it arrived in.
        event_id: [u8; 32],
        /// The sender's real identity, recovered from their leaf
        /// credential (distinct from the envelope's ephemeral `pubkey`).
        sender_pubkey: [u8; 32],
        /// Decrypted application payload (UTF-8 JSON rumor bytes).
        plaintext: Vec<u8>,
    },
    /// A proposal was received and buffered by `openmls`; the epoch does
    /// not change.
    Proposal {
        /// The kind-445 event id it arrived in.
        event_id: [u8; 32],
    },
    /// A commit was merged, advancing the epoch by exactly one.
    Commit {
        /// The kind-445 event id it arrived in.
        event_id: [u8; 32],
        /// The epoch reached after merging.
        new_epoch: u64,
    },
    /// A commit lost the race for its epoch (another commit for the same
    /// epoch sorted earlier in the total order) and was discarded.
    CommitSuperseded {
        /// The kind-445 event id it arrived in.
        event_id: [u8; 32],
    },
    /// The event could not be processed.
    Skipped {
        /// The kind-445 event id it arrived in.
        event_id: [u8; 32],
        /// Why it was skipped.
        error: ResolverError,
    },
}

/// Resolve `events` against `state`, in place.
///
/// Implements §4.9's total order — `(epoch asc, created_at asc, event_id
/// lex asc)` — by repeatedly: deriving the current epoch's envelope key,
/// decrypting every event that opens under it, processing proposals and
/// application messages immediately, and merging the earliest-sorted commit
/// among any that were found (discarding the rest as
/// [`Resolved::CommitSuperseded`]). If a commit merged, the epoch advanced
/// and the loop retries the remaining events under the new key; if none
/// did, the remaining events cannot be progressed this run and are reported
/// as [`Resolved::Skipped`].
///
/// Callers must persist `state` after this call returns if any entry
/// advanced the key schedule (§4.8's forward-secrecy invariant) — this
/// function has no store handle and does not persist on its own.
pub fn resolve_batch<E: Environment>(state: &mut ClientState<E>, events: &[TransportEvent]) -> Vec<Resolved> {
    let mut pending: Vec<&TransportEvent> =
        events.iter().filter(|event| event.kind == Kind::GroupEvent.as_u16()).collect();
    let mut results = Vec::with_capacity(pending.len());

    loop {
        if pending.is_empty() {
            break;
        }

        let keys = match current_epoch_keys(state) {
            Ok(keys) => keys,
            Err(message) => {
                for event in pending {
                    results.push(Resolved::Skipped { event_id: event.id, error: ResolverError::MlsProtocol(message.clone()) });
                }
                break;
            }
        };

        let mut decryptable: Vec<(&TransportEvent, Vec<u8>)> = Vec::new();
        let mut still_pending: Vec<&TransportEvent> = Vec::new();
        for event in pending {
            match envelope::open_group_event(&keys, &event.content) {
                Ok(plaintext) => decryptable.push((event, plaintext)),
                Err(_) => still_pending.push(event),
            }
        }

        if decryptable.is_empty() {
            for event in still_pending {
                results.push(unreadable(event.id));
            }
            break;
        }

        decryptable.sort_by(|(a, _), (b, _)| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        let mut commit_candidates: Vec<([u8; 32], Box<StagedCommit>)> = Vec::new();
        for (event, plaintext) in decryptable {
            match classify(state, &plaintext) {
                Ok(Classified::Application(sender_pubkey, bytes)) => {
                    results.push(Resolved::Application { event_id: event.id, sender_pubkey, plaintext: bytes });
                }
                Ok(Classified::Proposal) => {
                    debug!(epoch = state.epoch(), "buffered proposal");
                    results.push(Resolved::Proposal { event_id: event.id });
                }
                Ok(Classified::Commit(staged)) => {
                    commit_candidates.push((event.id, staged));
                }
                Err(message) => {
                    warn!(error = %message, "mls protocol error");
                    results.push(Resolved::Skipped { event_id: event.id, error: ResolverError::MlsProtocol(message) });
                }
            }
        }

        let progressed = apply_winning_commit(state, commit_candidates, &mut results);

        if !progressed {
            for event in still_pending {
                results.push(unreadable(event.id));
            }
            break;
        }

        pending = still_pending;
    }

    results
}

fn unreadable(event_id: [u8; 32]) -> Resolved {
    Resolved::Skipped { event_id, error: ResolverError::Unreadable(EnvelopeError::InvalidContent("epoch exhausted".to_owned())) }
}

/// Merge the first-sorted commit, if any, and record the rest as
/// superseded. Returns whether the epoch advanced.
fn apply_winning_commit<E: Environment>(
    state: &mut ClientState<E>,
    mut commit_candidates: Vec<([u8; 32], Box<StagedCommit>)>,
    results: &mut Vec<Resolved>,
) -> bool {
    if commit_candidates.is_empty() {
        return false;
    }

    let (winner_id, winner_commit) = commit_candidates.remove(0);
    let (mls_group, provider, _signer) = state.split_for_mutation();
    match mls_group.merge_staged_commit(provider, *winner_commit) {
        Ok(()) => {
            results.push(Resolved::Commit { event_id: winner_id, new_epoch: state.epoch() });
            for (loser_id, _) in commit_candidates {
                results.push(Resolved::CommitSuperseded { event_id: loser_id });
            }
            if let Err(error) = state.refresh_group_data() {
                warn!(error = %error, "failed to refresh group data after merging commit");
            }
            true
        }
        Err(error) => {
            results.push(Resolved::Skipped { event_id: winner_id, error: ResolverError::MlsProtocol(error.to_string()) });
            for (loser_id, _) in commit_candidates {
                results.push(Resolved::CommitSuperseded { event_id: loser_id });
            }
            false
        }
    }
}

enum Classified {
    Application([u8; 32], Vec<u8>),
    Proposal,
    Commit(Box<StagedCommit>),
}

/// Classify a decrypted wire message. Commits are recognized and handed
/// back as an owned [`StagedCommit`] but not merged here — only the winning
/// commit of its epoch is merged, by [`apply_winning_commit`].
fn classify<E: Environment>(state: &mut ClientState<E>, plaintext: &[u8]) -> Result<Classified, String> {
    let (mls_group, provider, _signer) = state.split_for_mutation();

    let mls_message = MlsMessageIn::tls_deserialize_exact(plaintext).map_err(|e| e.to_string())?;
    let protocol_message: ProtocolMessage = mls_message.try_into().map_err(|e| format!("invalid mls message type: {e:?}"))?;

    let processed = mls_group.process_message(provider, protocol_message).map_err(|e| e.to_string())?;
    let sender_pubkey = credential_pubkey(processed.credential()).unwrap_or([0u8; 32]);

    match processed.into_content() {
        ProcessedMessageContent::ApplicationMessage(app_msg) => Ok(Classified::Application(sender_pubkey, app_msg.into_bytes())),
        ProcessedMessageContent::ProposalMessage(_) | ProcessedMessageContent::ExternalJoinProposalMessage(_) => {
            Ok(Classified::Proposal)
        }
        ProcessedMessageContent::StagedCommitMessage(staged_commit) => Ok(Classified::Commit(staged_commit)),
    }
}

fn current_epoch_keys<E: Environment>(state: &ClientState<E>) -> Result<marmot_crypto::EnvelopeKeys, String> {
    let secret = state.export_secret("nostr", b"nostr", 32).map_err(|e| e.to_string())?;
    let mut array = [0u8; 32];
    array.copy_from_slice(&secret);
    Ok(envelope::derive_envelope_keys(&array))
}
