//! Top-level error type aggregating every component's errors.

use thiserror::Error;

use crate::{
    credential::CredentialError, data::group_data::GroupDataError, engine::EngineError,
    envelope::EnvelopeError, key_package::KeyPackageError, resolver::ResolverError,
    welcome::WelcomeError,
};

/// Aggregated error type for `marmot-core` operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Marmot Group Data Extension codec error (§4.1).
    #[error(transparent)]
    GroupData(#[from] GroupDataError),

    /// Envelope encrypt/decrypt error (§4.2).
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Credential construction/validation error (§4.5).
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Key-package build or parse error (§4.6).
    #[error(transparent)]
    KeyPackage(#[from] KeyPackageError),

    /// Welcome build or parse error (§4.7).
    #[error(transparent)]
    Welcome(#[from] WelcomeError),

    /// Group engine error (§4.8).
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Commit resolver error (§4.9).
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// Underlying persistence error.
    #[error(transparent)]
    Store(#[from] marmot_store::StoreError),
}
