//! Parley secure session
//!
//! Mutually authenticated session establishment and encrypted record
//! exchange, independent of any transport. The application supplies an
//! identity, a signing key, and a [`PeerKeyResolver`]; the session emits
//! and consumes opaque protocol messages until it is established, after
//! which [`SecureSession::wrap`] and [`SecureSession::unwrap`] carry
//! application data.

pub mod error;
pub mod message;
pub mod resolver;
pub mod session;
pub mod snapshot;
pub mod state;

pub use error::SessionError;
pub use message::{HANDSHAKE_MAGIC, MIN_HANDSHAKE_LEN};
pub use resolver::PeerKeyResolver;
pub use session::{SecureSession, UnwrapResult};
pub use state::State;
