//! Record framing
//!
//! Records on the wire are terminated by a blank line (`"\n\n"`). Socket
//! reads arrive in arbitrary chunks, so inbound bytes are buffered here
//! until a full record is available.

use crate::error::{SheetError, SheetResult};

pub const RECORD_TERMINATOR: &str = "\n\n";

/// Largest record a client may leave pending.
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no terminator.
    scanned: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the socket.
    pub fn extend(&mut self, bytes: &[u8]) -> SheetResult<()> {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_RECORD_BYTES && self.terminator_at().is_none() {
            return Err(SheetError::FrameTooLarge(MAX_RECORD_BYTES));
        }
        Ok(())
    }

    /// Pop the next complete, non-blank record. A record that is not valid
    /// UTF-8 is consumed and reported as malformed.
    pub fn next_record(&mut self) -> SheetResult<Option<String>> {
        while let Some(end) = self.terminator_at() {
            let mut record: Vec<u8> = self
                .pending
                .drain(..end + RECORD_TERMINATOR.len())
                .collect();
            record.truncate(end);
            self.scanned = 0;

            let text = String::from_utf8(record).map_err(|e| {
                SheetError::MalformedCommand(format!("record is not valid UTF-8: {e}"))
            })?;
            let text = text.trim();
            if !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
        }
        Ok(None)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Search only bytes not seen by an earlier call. The overlap keeps a
    /// terminator split across two reads visible.
    fn terminator_at(&mut self) -> Option<usize> {
        let start = self
            .scanned
            .saturating_sub(RECORD_TERMINATOR.len() - 1);
        let found = self.pending[start..]
            .windows(RECORD_TERMINATOR.len())
            .position(|window| window == RECORD_TERMINATOR.as_bytes())
            .map(|offset| start + offset);
        if found.is_none() {
            self.scanned = self.pending.len();
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_split_across_reads() {
        let mut frames = FrameBuffer::new();
        frames.extend(b"{\"type\":").unwrap();
        assert_eq!(frames.next_record().unwrap(), None);
        frames.extend(b"\"undo\"}\n").unwrap();
        assert_eq!(frames.next_record().unwrap(), None);
        frames.extend(b"\n").unwrap();
        assert_eq!(
            frames.next_record().unwrap().as_deref(),
            Some("{\"type\":\"undo\"}")
        );
        assert_eq!(frames.pending_len(), 0);
    }

    #[test]
    fn test_several_records_in_one_read() {
        let mut frames = FrameBuffer::new();
        frames.extend(b"{\"a\":1}\n\n{\"b\":2}\n\n{\"c\"").unwrap();
        assert_eq!(frames.next_record().unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(frames.next_record().unwrap().as_deref(), Some("{\"b\":2}"));
        assert_eq!(frames.next_record().unwrap(), None);
        assert_eq!(frames.pending_len(), 4);
    }

    #[test]
    fn test_blank_records_skipped() {
        let mut frames = FrameBuffer::new();
        frames.extend(b"\n\n  \n\n{\"x\":0}\n\n").unwrap();
        assert_eq!(frames.next_record().unwrap().as_deref(), Some("{\"x\":0}"));
        assert_eq!(frames.next_record().unwrap(), None);
    }

    #[test]
    fn test_oversized_record_rejected() {
        let mut frames = FrameBuffer::new();
        let chunk = vec![b'a'; MAX_RECORD_BYTES + 1];
        assert!(matches!(
            frames.extend(&chunk),
            Err(SheetError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_record_is_malformed() {
        let mut frames = FrameBuffer::new();
        frames.extend(b"{\"type\":\"\xff\"}\n\n{\"type\":\"undo\"}\n\n").unwrap();
        assert!(matches!(
            frames.next_record(),
            Err(SheetError::MalformedCommand(_))
        ));
        // The bad record is gone; the next one still decodes.
        assert_eq!(
            frames.next_record().unwrap().as_deref(),
            Some("{\"type\":\"undo\"}")
        );
    }

    #[test]
    fn test_long_record_in_small_reads() {
        let mut frames = FrameBuffer::new();
        let body = format!("{{\"type\":\"edit\",\"value\":\"{}\"}}", "x".repeat(64 * 1024 + 6));
        let wire = format!("{body}\n\n{{\"type\":\"undo\"}}\n\n");

        // 7-byte reads put the first terminator's two bytes in different chunks.
        let first_end = body.len();
        assert_eq!(first_end % 7, 6);

        let mut records = Vec::new();
        for chunk in wire.as_bytes().chunks(7) {
            frames.extend(chunk).unwrap();
            while let Some(record) = frames.next_record().unwrap() {
                records.push(record);
            }
            assert!(frames.scanned <= frames.pending_len());
        }
        assert_eq!(records, vec![body, "{\"type\":\"undo\"}".to_string()]);
        assert_eq!(frames.pending_len(), 0);
    }
}
