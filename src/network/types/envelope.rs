use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

/// Marker for discovery announcements
pub const HELLO_PREFIX: &str = "__HELLO__ ";

/// Marker for messages that already went through one fan-out hop
pub const REPLICATED_PREFIX: &str = "[REPLICATED] ";

/// Marker for acknowledgement replies
pub const ACK_PREFIX: &str = "ACK:";

/// Error types for envelope construction and parsing
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnvelopeError {
    /// No sender/content separator in a chat line
    #[error("No sender/content separator")]
    MissingSeparator,

    /// A required field is empty
    #[error("Empty {0} field")]
    EmptyField(&'static str),

    /// The sender identity contains a reserved character
    #[error("Invalid sender: {0}")]
    InvalidSender(String),

    /// Envelopes are single-line; embedded newlines are rejected
    #[error("Embedded newline in envelope")]
    EmbeddedNewline,

    /// Unparseable announcement address
    #[error("Invalid announcement address: {0}")]
    InvalidAddress(String),
}

/// One wire envelope. Exactly one envelope travels per connection, as a
/// single newline-free text line.
#[derive(Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Discovery announcement carrying the peer's own listen address
    Hello { addr: SocketAddr },

    /// A chat message; `replicated` marks copies that already went
    /// through a fan-out hop and must not be forwarded again
    Chat {
        replicated: bool,
        sender: String,
        content: String,
    },

    /// Acknowledgement echoing the original wire line
    Ack { payload: String },
}

impl Envelope {
    /// Build a discovery announcement
    pub fn hello(addr: SocketAddr) -> Self {
        Envelope::Hello { addr }
    }

    /// Build a plain chat envelope, validating both fields
    pub fn chat(sender: &str, content: &str) -> Result<Self, EnvelopeError> {
        Self::validated(false, sender, content)
    }

    /// Build a replicated chat envelope, validating both fields
    pub fn replicated(sender: &str, content: &str) -> Result<Self, EnvelopeError> {
        Self::validated(true, sender, content)
    }

    /// The acknowledgement a receiver returns for this envelope
    pub fn ack_for(&self) -> Envelope {
        Envelope::Ack {
            payload: self.encode(),
        }
    }

    /// Envelope kind for classification and logging
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Hello { .. } => "discovery",
            Envelope::Chat {
                replicated: false, ..
            } => "plain",
            Envelope::Chat {
                replicated: true, ..
            } => "replicated",
            Envelope::Ack { .. } => "ack",
        }
    }

    /// Encode to the wire line
    pub fn encode(&self) -> String {
        match self {
            Envelope::Hello { addr } => format!("{}{}", HELLO_PREFIX, addr),
            Envelope::Chat {
                replicated,
                sender,
                content,
            } => {
                if *replicated {
                    format!("{}{}: {}", REPLICATED_PREFIX, sender, content)
                } else {
                    format!("{}: {}", sender, content)
                }
            }
            Envelope::Ack { payload } => format!("{}{}", ACK_PREFIX, payload),
        }
    }

    /// Parse a wire line. Classification is by fixed prefix: hello, ack,
    /// replicated chat, plain chat, in that order.
    pub fn parse(line: &str) -> Result<Self, EnvelopeError> {
        if let Some(rest) = line.strip_prefix(HELLO_PREFIX) {
            let addr = rest
                .trim()
                .parse()
                .map_err(|_| EnvelopeError::InvalidAddress(rest.trim().to_string()))?;
            return Ok(Envelope::Hello { addr });
        }

        if let Some(payload) = line.strip_prefix(ACK_PREFIX) {
            return Ok(Envelope::Ack {
                payload: payload.to_string(),
            });
        }

        let (replicated, body) = match line.strip_prefix(REPLICATED_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, line),
        };

        // Split at the first colon; content may itself contain colons
        let (sender, content) = body.split_once(':').ok_or(EnvelopeError::MissingSeparator)?;

        Self::validated(replicated, sender.trim(), content.trim())
    }

    fn validated(replicated: bool, sender: &str, content: &str) -> Result<Self, EnvelopeError> {
        let sender = sender.trim();
        let content = content.trim();

        if sender.is_empty() {
            return Err(EnvelopeError::EmptyField("sender"));
        }
        if content.is_empty() {
            return Err(EnvelopeError::EmptyField("content"));
        }
        if sender.contains(':') {
            return Err(EnvelopeError::InvalidSender(sender.to_string()));
        }
        if sender.contains('\n') || content.contains('\n') {
            return Err(EnvelopeError::EmbeddedNewline);
        }

        Ok(Envelope::Chat {
            replicated,
            sender: sender.to_string(),
            content: content.to_string(),
        })
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Envelope::Hello { addr } => write!(f, "Hello({})", addr),
            Envelope::Chat {
                replicated, sender, ..
            } => write!(f, "Chat(sender: {}, replicated: {})", sender, replicated),
            Envelope::Ack { payload } => write!(f, "Ack(len: {})", payload.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_roundtrip() {
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let envelope = Envelope::hello(addr);

        assert_eq!(envelope.encode(), "__HELLO__ 127.0.0.1:5000");
        assert_eq!(Envelope::parse(&envelope.encode()).unwrap(), envelope);
        assert_eq!(envelope.kind(), "discovery");
    }

    #[test]
    fn test_plain_chat_roundtrip() {
        let envelope = Envelope::chat("alice", "hello").unwrap();

        assert_eq!(envelope.encode(), "alice: hello");
        assert_eq!(Envelope::parse("alice: hello").unwrap(), envelope);
        assert_eq!(envelope.kind(), "plain");
    }

    #[test]
    fn test_replicated_chat_roundtrip() {
        let envelope = Envelope::replicated("alice", "hello").unwrap();

        assert_eq!(envelope.encode(), "[REPLICATED] alice: hello");
        assert_eq!(Envelope::parse("[REPLICATED] alice: hello").unwrap(), envelope);
        assert_eq!(envelope.kind(), "replicated");
    }

    #[test]
    fn test_content_may_contain_colons() {
        let envelope = Envelope::parse("alice: see: this").unwrap();

        match envelope {
            Envelope::Chat {
                sender, content, ..
            } => {
                assert_eq!(sender, "alice");
                assert_eq!(content, "see: this");
            }
            _ => panic!("Expected Chat envelope"),
        }
    }

    #[test]
    fn test_ack_payload_is_verbatim() {
        let chat = Envelope::chat("alice", "hello").unwrap();
        let ack = chat.ack_for();

        assert_eq!(ack.encode(), "ACK:alice: hello");

        match Envelope::parse("ACK:alice: hello").unwrap() {
            Envelope::Ack { payload } => assert_eq!(payload, chat.encode()),
            _ => panic!("Expected Ack envelope"),
        }
    }

    #[test]
    fn test_malformed_lines_rejected() {
        assert_eq!(
            Envelope::parse("no separator here"),
            Err(EnvelopeError::MissingSeparator)
        );
        assert_eq!(
            Envelope::parse("alice:   "),
            Err(EnvelopeError::EmptyField("content"))
        );
        assert_eq!(
            Envelope::parse(": hello"),
            Err(EnvelopeError::EmptyField("sender"))
        );
        assert!(matches!(
            Envelope::parse("__HELLO__ not-an-address"),
            Err(EnvelopeError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_empty_content_rejected_at_construction() {
        assert!(Envelope::chat("alice", "").is_err());
        assert!(Envelope::chat("alice", "   ").is_err());
        assert!(Envelope::chat("", "hello").is_err());
    }
}
