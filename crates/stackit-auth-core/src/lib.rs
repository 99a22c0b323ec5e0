//! STACKIT CLI provider credentials
//!
//! Lets a non-interactive consumer reuse the session created by
//! `stackit auth provider login`:
//! - Profile selection (explicit override, env var, pointer file, default)
//! - Dual-backend storage (system keyring first, Base64 JSON file second)
//! - Expiry detection with a safety margin
//! - Refresh-token grant with single-flight coalescing and write-back

pub mod credential;
pub mod environment;
pub mod error;
pub mod profile;
pub mod refresh;
pub mod resolver;
pub mod store;

pub use credential::{Credential, CredentialState, StorageLocation};
pub use environment::AuthEnvironment;
pub use error::{AuthError, BackendError, KeyringError};
pub use profile::{ProfileResolver, ProfileSource, ResolvedProfile, DEFAULT_PROFILE};
pub use refresh::{OAuthTokenRefresher, RefreshConfig, TokenRefresher};
pub use resolver::CredentialResolver;
pub use store::{
    CredentialBackend, CredentialStore, FileBackend, KeyringBackend, MemoryKeyring,
    SecretBackend, SystemKeyring,
};
