//! Persistence seams for the authentication core.
//!
//! Each store is a trait with two implementations: a MySQL one used in
//! production and an in-memory one (readers-writer lock over a map) used by
//! tests. The orchestrator only ever sees `Arc<dyn Store>`, so the two are
//! interchangeable at the composition root.
//!
//! The single-use and rotation guarantees live here: consuming an
//! authorization code and rotating a refresh token are delete-with-witness
//! operations, mutually exclusive per key.

pub mod client;
pub mod code;
pub mod device;
pub mod login_attempt;
pub mod refresh;
pub mod revocation;
pub mod signal;
pub mod totp;
pub mod webauthn;

pub use client::{ClientStore, InMemoryClientStore, MySqlClientStore};
pub use code::{CodeStore, InMemoryCodeStore, MySqlCodeStore};
pub use device::{DeviceStore, InMemoryDeviceStore, MySqlDeviceStore};
pub use login_attempt::{InMemoryLoginAttemptStore, LoginAttemptStore, MySqlLoginAttemptStore};
pub use refresh::{InMemoryRefreshStore, MySqlRefreshStore, RefreshStore};
pub use revocation::{InMemoryRevocationStore, MySqlRevocationStore, RevocationStore};
pub use signal::{InMemorySignalStore, MySqlSignalStore, SignalStore};
pub use totp::{InMemoryTotpStore, MySqlTotpStore, TotpStore};
pub use webauthn::{CeremonyKind, InMemoryWebAuthnStore, MySqlWebAuthnStore, WebAuthnStore};
