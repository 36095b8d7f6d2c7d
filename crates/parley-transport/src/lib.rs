//! Parley session transport
//!
//! Carries a `SecureSession`'s opaque messages over a blocking byte
//! stream using a self-delimiting frame format, multiplexing handshake
//! and application data. Timeouts, reconnection, and cancellation are
//! the caller's transport concerns, not this crate's.

pub mod channel;
pub mod error;
pub mod frame;

pub use channel::SecureChannel;
pub use error::TransportError;
pub use frame::{FRAME_MARKER, MAX_PAYLOAD, read_frame, write_frame};
