//! Wire codec
//!
//! Frames are newline-delimited JSON: one [`Message`] per line. JSON string
//! escaping guarantees no literal newline ever appears inside a frame, so a
//! line boundary is always a frame boundary.

use crate::error::{Error, Result};
use crate::types::Message;

/// Maximum accepted frame size. Inline-encoded attachments are the only
/// fields that grow large; anything past this is a protocol violation.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Encode a message as one line (without the trailing newline).
pub fn encode(message: &Message) -> Result<String> {
    let line = serde_json::to_string(message).map_err(|e| Error::Encode(e.to_string()))?;
    if line.len() > MAX_FRAME_BYTES {
        return Err(Error::FrameTooLarge(line.len(), MAX_FRAME_BYTES));
    }
    Ok(line)
}

/// Decode one line into a message.
pub fn decode(line: &str) -> Result<Message> {
    if line.len() > MAX_FRAME_BYTES {
        return Err(Error::FrameTooLarge(line.len(), MAX_FRAME_BYTES));
    }
    serde_json::from_str(line).map_err(|e| Error::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    #[test]
    fn frames_survive_embedded_newlines_in_content() {
        let msg = Message::SendMessage(SendMessageRequest {
            seq: 3,
            credentials: Credentials::new("A", "T"),
            channel_id: "c1".into(),
            message: MessageSpec::text("line one\nline two"),
        });
        let line = encode(&msg).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(decode(&line).unwrap(), msg);
    }

    #[test]
    fn unknown_type_tag_is_a_decode_error() {
        let err = decode(r#"{"type":"shutdown"}"#).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn truncated_frame_is_a_decode_error() {
        let msg = Message::UnregisterTrigger(UnregisterTriggerRequest {
            subscriber_id: "s1".into(),
        });
        let line = encode(&msg).unwrap();
        assert!(decode(&line[..line.len() - 2]).is_err());
    }
}
