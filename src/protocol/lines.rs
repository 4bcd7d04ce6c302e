//! # Line Framing
//!
//! Accumulates raw serial bytes and yields complete lines.

use bytes::BytesMut;

use super::message::LINE_TERMINATOR;
use crate::error::DecodeError;

/// Default upper bound for a single line, in bytes
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// Newline splitter over a growable byte buffer.
///
/// Bytes may arrive in any chunking. A line longer than `max_len` is reported
/// once as [`DecodeError::LineTooLong`] and the rest of it, up to the next
/// newline, is dropped.
#[derive(Debug)]
pub struct LineBuffer {
    buf: BytesMut,
    max_len: usize,
    discarding: bool,
}

impl LineBuffer {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            max_len,
            discarding: false,
        }
    }

    /// Append freshly read bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet forming a complete line
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete line, without its terminator
    ///
    /// Returns `None` when no complete line is buffered. A trailing `\r` is
    /// stripped along with surrounding whitespace.
    pub fn next_line(&mut self) -> Option<Result<String, DecodeError>> {
        loop {
            match self.buf.iter().position(|&b| b == LINE_TERMINATOR) {
                Some(pos) => {
                    let raw = self.buf.split_to(pos + 1);
                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    if pos > self.max_len {
                        return Some(Err(DecodeError::LineTooLong(pos)));
                    }
                    return Some(
                        std::str::from_utf8(&raw[..pos])
                            .map(|line| line.trim().to_string())
                            .map_err(|_| DecodeError::InvalidUtf8),
                    );
                }
                None => {
                    if self.buf.len() > self.max_len {
                        let len = self.buf.len();
                        self.buf.clear();
                        if !self.discarding {
                            self.discarding = true;
                            return Some(Err(DecodeError::LineTooLong(len)));
                        }
                    }
                    return None;
                }
            }
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(buffer: &mut LineBuffer) -> Vec<Result<String, DecodeError>> {
        std::iter::from_fn(|| buffer.next_line()).collect()
    }

    #[test]
    fn test_split_lines() {
        let mut buffer = LineBuffer::default();
        buffer.extend(b"{\"a\":1}\n{\"b\":2}\n");

        let lines: Vec<String> = drain(&mut buffer).into_iter().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_partial_line_waits_for_terminator() {
        let mut buffer = LineBuffer::default();
        buffer.extend(b"{\"cmd\":");
        assert!(buffer.next_line().is_none());
        assert_eq!(buffer.pending(), 7);

        buffer.extend(b"\"ping\"}\n{\"ty");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "{\"cmd\":\"ping\"}");
        assert!(buffer.next_line().is_none());
        assert_eq!(buffer.pending(), 4);
    }

    #[test]
    fn test_crlf_stripped() {
        let mut buffer = LineBuffer::default();
        buffer.extend(b"{\"x\":1}\r\n");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "{\"x\":1}");
    }

    #[test]
    fn test_blank_line_yields_empty_string() {
        let mut buffer = LineBuffer::default();
        buffer.extend(b"\n  \n");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "");
        assert!(buffer.next_line().is_none());
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buffer = LineBuffer::default();
        buffer.extend(&[0xFF, 0xFE, b'\n', b'{', b'}', b'\n']);
        assert!(matches!(buffer.next_line(), Some(Err(DecodeError::InvalidUtf8))));
        assert_eq!(buffer.next_line().unwrap().unwrap(), "{}");
    }

    #[test]
    fn test_overlong_line_discarded_until_newline() {
        let mut buffer = LineBuffer::new(8);
        buffer.extend(b"0123456789");
        assert!(matches!(buffer.next_line(), Some(Err(DecodeError::LineTooLong(10)))));

        // Rest of the same line is dropped silently
        buffer.extend(b"abcdefghijkl");
        assert!(buffer.next_line().is_none());

        buffer.extend(b"tail\n{}\n");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "{}");
        assert!(buffer.next_line().is_none());
    }

    #[test]
    fn test_overlong_complete_line_rejected() {
        let mut buffer = LineBuffer::new(4);
        buffer.extend(b"123456\n{}\n");
        assert!(matches!(buffer.next_line(), Some(Err(DecodeError::LineTooLong(6)))));
        assert_eq!(buffer.next_line().unwrap().unwrap(), "{}");
    }
}
