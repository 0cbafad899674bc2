//! Marmot protocol core: MLS group state, the Marmot Group Data Extension,
//! the kind-445 envelope codec, and the commit resolver that keeps a
//! group's state converging regardless of event arrival order.
//!
//! This crate has no network code of its own — it is driven through the
//! [`config::Network`] and [`config::Signer`] seams — and no on-disk
//! persistence of its own either, deferring that to `marmot-store` through
//! the durable projection in [`state`].

pub mod client_state;
pub mod config;
pub mod credential;
pub mod data;
pub mod engine;
pub mod env;
pub mod envelope;
pub mod error;
pub mod key_package;
pub mod provider;
pub mod resolver;
pub mod state;
pub mod welcome;

pub use client_state::{ClientState, ClientStateError, CreateGroupOptions};
pub use config::{ClientConfig, Filter, Network, PublishAck, Signer, SignerError, UnsignedEvent};
pub use data::{Kind, MarmotGroupData, TransportEvent, GROUP_DATA_EXTENSION_TYPE};
pub use engine::{AddMemberOutcome, EngineError, GroupEngine};
pub use env::{Environment, SystemEnvironment};
pub use envelope::compute_event_id;
pub use error::Error;
pub use provider::MlsProvider;
pub use resolver::{resolve_batch, Resolved, ResolverError};
pub use state::{GroupStateStore, GroupStateStoreError};
