use std::io;
use std::marker::Unpin;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::network::types::envelope::{Envelope, EnvelopeError};

/// Maximum envelope size in bytes
const MAX_ENVELOPE_SIZE: usize = 64 * 1024; // 64 KB

/// Error types for the envelope codec
#[derive(Error, Debug)]
pub enum CodecError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Envelope exceeds the size cap
    #[error("Envelope too large: {0} bytes")]
    EnvelopeTooLarge(usize),

    /// Envelope bytes are not valid UTF-8
    #[error("Envelope is not valid UTF-8")]
    InvalidUtf8,

    /// Envelope text does not parse
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
}

/// Reader for the one-envelope-per-connection framing: the peer writes a
/// single line and half-closes, so the envelope ends at EOF.
pub struct EnvelopeReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> EnvelopeReader<R> {
    /// Create a new envelope reader
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read the connection's envelope. Returns `None` when the peer
    /// closed without writing anything.
    pub async fn read_envelope(&mut self) -> Result<Option<Envelope>, CodecError> {
        let mut buf = Vec::new();
        let n = (&mut self.reader)
            .take(MAX_ENVELOPE_SIZE as u64 + 1)
            .read_to_end(&mut buf)
            .await?;

        if n == 0 {
            return Ok(None);
        }

        // Check envelope size
        if n > MAX_ENVELOPE_SIZE {
            return Err(CodecError::EnvelopeTooLarge(n));
        }

        let text = std::str::from_utf8(&buf).map_err(|_| CodecError::InvalidUtf8)?;

        Ok(Some(Envelope::parse(text)?))
    }
}

/// Writer for the one-envelope-per-connection framing
pub struct EnvelopeWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> EnvelopeWriter<W> {
    /// Create a new envelope writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write an envelope to the stream
    pub async fn write_envelope(&mut self, envelope: &Envelope) -> Result<(), CodecError> {
        let data = envelope.encode();

        // Check envelope size
        if data.len() > MAX_ENVELOPE_SIZE {
            return Err(CodecError::EnvelopeTooLarge(data.len()));
        }

        self.writer.write_all(data.as_bytes()).await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Half-close the stream, signalling the envelope is complete
    pub async fn shutdown(&mut self) -> Result<(), CodecError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
