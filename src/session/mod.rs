//! Session and token lifecycle.
//!
//! Short-lived access tokens are signed JWTs verified without storage.
//! Long-lived refresh credentials are opaque random secrets; only their
//! SHA-256 digests are persisted, and each one can be rotated exactly once.
//! Presenting a spent secret again is treated as theft and revokes every
//! session of its owner.

pub mod clock;
pub mod codec;
pub mod config;
pub mod duration;
pub mod error;
pub mod manager;
pub mod memory;
pub mod password;
pub mod postgres;
pub mod principal;
pub mod secret;
pub mod store;
pub mod sweeper;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::codec::{AccessClaims, AccessTokenCodec, CodecError};
pub use self::config::SessionConfig;
pub use self::error::SessionError;
pub use self::manager::{IssuedSession, SessionManager};
pub use self::memory::{MemoryCredentialStore, MemoryPrincipalDirectory};
pub use self::password::{Argon2Passwords, PasswordHasher};
pub use self::postgres::{PgCredentialStore, PgPrincipalDirectory};
pub use self::principal::{Principal, PrincipalDirectory, Role};
pub use self::store::{ConsumeOutcome, CredentialStore, RefreshCredential};
pub use self::sweeper::{spawn_cleanup_worker, CleanupWorkerConfig};
