//! Chat message format and self-echo classification
//!
//! Outbound text is rendered as `"<participant>: <text>"` and tagged
//! with the session's sender token. Inbound envelopes are classified
//! against the local token; a delivery with no token is deliberately
//! treated as foreign so it is surfaced rather than silently lost.

use crate::broker::Envelope;

/// Metadata header carrying the sender token on the wire
pub const SENDER_ID_HEADER: &str = "SenderId";

/// One chat message in application form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Sender token, absent when the delivery carried no metadata
    pub sender_id: Option<String>,
    /// Text shown to participants, already `"<name>: <text>"` formatted
    pub display_text: String,
}

impl ChatMessage {
    /// Compose an outbound message for a participant
    pub fn compose(sender_id: &str, participant: &str, text: &str) -> Self {
        Self {
            sender_id: Some(sender_id.to_string()),
            display_text: format!("{}: {}", participant, text),
        }
    }

    /// Whether this message originated from the session holding `token`
    ///
    /// Missing metadata means "not self": the defensive default favors
    /// visibility over silent loss.
    pub fn is_from(&self, token: &str) -> bool {
        self.sender_id.as_deref() == Some(token)
    }

    pub fn into_envelope(self) -> Envelope {
        Envelope {
            body: self.display_text.into_bytes(),
            sender_id: self.sender_id,
        }
    }

    pub fn from_envelope(envelope: Envelope) -> Self {
        Self {
            sender_id: envelope.sender_id,
            display_text: String::from_utf8_lossy(&envelope.body).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_formats_participant_prefix() {
        let message = ChatMessage::compose("token-1", "alice", "hello there");
        assert_eq!(message.display_text, "alice: hello there");
        assert_eq!(message.sender_id.as_deref(), Some("token-1"));
    }

    #[test]
    fn own_token_matches() {
        let message = ChatMessage::compose("token-1", "alice", "hi");
        assert!(message.is_from("token-1"));
        assert!(!message.is_from("token-2"));
    }

    #[test]
    fn missing_token_is_never_self() {
        let message = ChatMessage::from_envelope(Envelope {
            body: b"ghost: hi".to_vec(),
            sender_id: None,
        });
        assert!(!message.is_from("token-1"));
        assert_eq!(message.display_text, "ghost: hi");
    }
}
