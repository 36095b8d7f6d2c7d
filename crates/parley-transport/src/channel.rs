//! A secure session driven over a blocking byte stream.
//!
//! [`SecureChannel::connect`] and [`SecureChannel::accept`] run the
//! handshake loops over any `Read + Write` stream; afterwards the
//! channel frames wrapped records for writes and unwraps framed records
//! for reads, retaining any surplus decrypted bytes for later reads.

use std::collections::VecDeque;
use std::io::{Read, Write};

use parley_session::{HANDSHAKE_MAGIC, MIN_HANDSHAKE_LEN, SecureSession, UnwrapResult};
use tracing::debug;

use crate::error::TransportError;
use crate::frame::{MAX_PAYLOAD, read_frame, write_frame};

/// Record overhead: 8-byte sequence header plus 16-byte AEAD tag.
const RECORD_OVERHEAD: usize = 24;

/// Largest application chunk that still fits one frame after wrapping.
const MAX_USER_CHUNK: usize = MAX_PAYLOAD - RECORD_OVERHEAD;

/// An established session bound to a blocking stream.
pub struct SecureChannel<S: Read + Write> {
    stream: S,
    session: SecureSession,
    /// Decrypted bytes not yet consumed by the caller, in arrival order.
    pending: VecDeque<u8>,
}

impl<S: Read + Write> SecureChannel<S> {
    /// Run the initiator handshake loop over `stream`.
    ///
    /// The session must be freshly created (`Idle`). Any framing,
    /// protocol, or session failure aborts the connection.
    pub fn connect(mut stream: S, mut session: SecureSession) -> Result<Self, TransportError> {
        let request = session.generate_connect_request()?;
        write_frame(&mut stream, &request)?;
        debug!(bytes = request.len(), "sent connect request");

        Self::negotiate(&mut stream, &mut session)?;
        Ok(Self {
            stream,
            session,
            pending: VecDeque::new(),
        })
    }

    /// Run the responder handshake loop over `stream`, reading first.
    pub fn accept(mut stream: S, mut session: SecureSession) -> Result<Self, TransportError> {
        Self::negotiate(&mut stream, &mut session)?;
        Ok(Self {
            stream,
            session,
            pending: VecDeque::new(),
        })
    }

    /// Shared negotiation loop: read a handshake frame, advance the
    /// session, send whatever it produces, until established.
    fn negotiate(stream: &mut S, session: &mut SecureSession) -> Result<(), TransportError> {
        while !session.is_established() {
            let payload = read_frame(stream)?;
            if payload.len() < MIN_HANDSHAKE_LEN {
                return Err(TransportError::Protocol(
                    "handshake frame too short".into(),
                ));
            }
            if payload[..4] != HANDSHAKE_MAGIC {
                return Err(TransportError::Protocol(
                    "handshake frame missing magic tag".into(),
                ));
            }
            match session.unwrap(&payload)? {
                UnwrapResult::ProtocolData(data) => {
                    write_frame(stream, &data)?;
                    debug!(bytes = data.len(), "sent handshake message");
                }
                UnwrapResult::NoData => {}
                UnwrapResult::UserData(_) => {
                    return Err(TransportError::Protocol(
                        "user data during negotiation".into(),
                    ));
                }
            }
        }
        debug!("secure channel established");
        Ok(())
    }

    /// Encrypt and send application data, splitting it across as many
    /// frames as needed.
    pub fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if data.is_empty() {
            let record = self.session.wrap(data)?;
            return write_frame(&mut self.stream, &record);
        }
        for chunk in data.chunks(MAX_USER_CHUNK) {
            let record = self.session.wrap(chunk)?;
            write_frame(&mut self.stream, &record)?;
        }
        Ok(())
    }

    /// Receive decrypted application bytes into `buf`.
    ///
    /// Serves retained bytes first; otherwise reads and unwraps exactly
    /// one record, storing any surplus for later calls. Bytes are never
    /// lost or duplicated regardless of `buf` sizing.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.pending.is_empty() {
            let record = read_frame(&mut self.stream)?;
            match self.session.unwrap(&record)? {
                UnwrapResult::UserData(plaintext) => self.pending.extend(plaintext),
                other => {
                    return Err(TransportError::Protocol(format!(
                        "expected user data, session produced {other:?}"
                    )));
                }
            }
        }
        let n = self.pending.len().min(buf.len());
        for byte in buf.iter_mut().take(n) {
            // VecDeque is non-empty for the first n pops.
            #[allow(clippy::unwrap_used)]
            {
                *byte = self.pending.pop_front().unwrap();
            }
        }
        Ok(n)
    }

    /// The underlying session.
    pub const fn session(&self) -> &SecureSession {
        &self.session
    }

    /// Close the session; the stream is dropped with the channel.
    pub fn close(&mut self) {
        self.session.close();
    }
}

impl<S: Read + Write> Read for SecureChannel<S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.recv(buf).map_err(Into::into)
    }
}

impl<S: Read + Write> Write for SecureChannel<S> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.send(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}
