//! Message framing for the semicolon-delimited JSON protocol.
//!
//! Messages are JSON texts concatenated on the stream, each terminated by a
//! literal `;`. The receiver buffers raw bytes and scans for the next
//! terminator; whatever follows it stays buffered for the next read.
//!
//! Known limitation, kept deliberately: the scan does not respect JSON
//! string boundaries, so an unescaped `;` inside a string value (nicknames
//! are free text) corrupts framing. See DESIGN.md.

use serde_json::Value;

/// Message terminator byte.
pub const TERMINATOR: u8 = b';';

/// Upper bound on a single message; a buffer past this without a terminator
/// indicates a broken or hostile peer.
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("message too large: {0} bytes (max {1})")]
    MessageTooLarge(usize, usize),
    #[error("invalid JSON segment: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize one message and append the terminator.
pub fn encode(message: &Value) -> Result<Vec<u8>, WireError> {
    let mut bytes = serde_json::to_vec(message)?;
    if bytes.len() >= MAX_MESSAGE_SIZE {
        return Err(WireError::MessageTooLarge(bytes.len(), MAX_MESSAGE_SIZE));
    }
    bytes.push(TERMINATOR);
    Ok(bytes)
}

/// Incremental splitter: feed raw reads in, take complete segments out.
#[derive(Debug, Default)]
pub struct MessageSplitter {
    buffer: Vec<u8>,
}

impl MessageSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pop the next complete segment, without the terminator.
    pub fn next_segment(&mut self) -> Option<Vec<u8>> {
        let end = self.buffer.iter().position(|b| *b == TERMINATOR)?;
        let rest = self.buffer.split_off(end + 1);
        let mut segment = std::mem::replace(&mut self.buffer, rest);
        segment.pop();
        Some(segment)
    }

    /// Pop and parse the next complete segment as JSON.
    pub fn next_message(&mut self) -> Option<Result<Value, WireError>> {
        let segment = self.next_segment()?;
        Some(serde_json::from_slice(&segment).map_err(WireError::from))
    }

    /// Bytes buffered without a terminator yet.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// True when the unterminated remainder exceeds the message size cap.
    pub fn overflowed(&self) -> bool {
        self.buffer.len() > MAX_MESSAGE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_appends_terminator() {
        let bytes = encode(&json!([5, "e1"])).unwrap();
        assert_eq!(bytes.last(), Some(&TERMINATOR));
        assert!(!bytes[..bytes.len() - 1].contains(&TERMINATOR));
    }

    #[test]
    fn test_single_message() {
        let mut splitter = MessageSplitter::new();
        splitter.extend(br#"[1,"e2"];"#);
        let msg = splitter.next_message().unwrap().unwrap();
        assert_eq!(msg, json!([1, "e2"]));
        assert!(splitter.next_message().is_none());
        assert_eq!(splitter.pending(), 0);
    }

    #[test]
    fn test_concatenated_messages() {
        let mut splitter = MessageSplitter::new();
        splitter.extend(br#"[1,"a"];[2,"b"];[3,"c"];"#);
        let mut tags = Vec::new();
        while let Some(msg) = splitter.next_message() {
            tags.push(msg.unwrap()[0].as_u64().unwrap());
        }
        assert_eq!(tags, vec![1, 2, 3]);
    }

    #[test]
    fn test_split_across_reads() {
        // The terminator of the first message arrives in a different read
        // than its payload start; both messages must still come out intact.
        let mut splitter = MessageSplitter::new();
        splitter.extend(br#"[1,"first"#);
        assert!(splitter.next_message().is_none());
        splitter.extend(br#""];[2,"seco"#);
        assert_eq!(
            splitter.next_message().unwrap().unwrap(),
            json!([1, "first"])
        );
        assert!(splitter.next_message().is_none());
        splitter.extend(br#"nd"];"#);
        assert_eq!(
            splitter.next_message().unwrap().unwrap(),
            json!([2, "second"])
        );
    }

    #[test]
    fn test_malformed_segment_reported_and_framing_resumes() {
        let mut splitter = MessageSplitter::new();
        splitter.extend(br#"{not json;[4,"ok"];"#);
        assert!(splitter.next_message().unwrap().is_err());
        assert_eq!(splitter.next_message().unwrap().unwrap(), json!([4, "ok"]));
    }

    #[test]
    fn test_byte_by_byte_delivery() {
        let wire = br#"[7,"slow"];"#;
        let mut splitter = MessageSplitter::new();
        let mut out = Vec::new();
        for b in wire {
            splitter.extend(&[*b]);
            while let Some(msg) = splitter.next_message() {
                out.push(msg.unwrap());
            }
        }
        assert_eq!(out, vec![json!([7, "slow"])]);
    }

    #[test]
    fn test_encode_roundtrip_through_splitter() {
        let original = json!([0, "e1", [{"kind": "depot"}]]);
        let bytes = encode(&original).unwrap();
        let mut splitter = MessageSplitter::new();
        splitter.extend(&bytes);
        assert_eq!(splitter.next_message().unwrap().unwrap(), original);
    }

    #[test]
    fn test_overflow_detection() {
        let mut splitter = MessageSplitter::new();
        splitter.extend(&vec![b'x'; MAX_MESSAGE_SIZE + 1]);
        assert!(splitter.overflowed());
        assert!(splitter.next_message().is_none());
    }
}
