//! A growable byte buffer whose head can be discarded cheaply.

use anyhow::{bail, ensure};

use crate::error::XmlParserErrors;

/// A growable byte buffer.
///
/// Readable bytes are `content[head..]`. Trimming the head only moves `head`;
/// the storage is compacted when the discarded prefix dominates the buffer.
#[derive(Debug, Clone, Default)]
pub struct XmlBuf {
    content: Vec<u8>,
    head: usize,
    error: XmlParserErrors,
}

impl XmlBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(size: usize) -> Self {
        Self {
            content: Vec::with_capacity(size),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.content.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The latched error, `XmlErrOK` if none occurred.
    pub fn error(&self) -> XmlParserErrors {
        self.error
    }

    pub fn clear(&mut self) {
        self.content.clear();
        self.head = 0;
    }

    /// Make sure at least `additional` bytes can be appended without reallocation.
    ///
    /// Returns the spare capacity after growing.
    pub fn grow(&mut self, additional: usize) -> Result<usize, anyhow::Error> {
        ensure!(
            self.error.is_ok(),
            "Failed to grow: Some errors have been already occured."
        );
        if self.content.len().checked_add(additional).is_none_or(|len| len > isize::MAX as usize) {
            self.error = XmlParserErrors::XmlBufOverflow;
            bail!("growing buffer past isize::MAX");
        }
        self.compact();
        self.content.reserve(additional);
        Ok(self.content.capacity() - self.content.len())
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), anyhow::Error> {
        ensure!(
            self.error.is_ok(),
            "Failed to push: Some errors have been already occured."
        );
        if bytes.is_empty() {
            return Ok(());
        }
        self.grow(bytes.len())?;
        self.content.extend_from_slice(bytes);
        Ok(())
    }

    pub fn push_str(&mut self, s: &str) -> Result<(), anyhow::Error> {
        self.push_bytes(s.as_bytes())
    }

    /// Discard up to `len` bytes from the head.
    ///
    /// Returns the number of bytes actually discarded.
    pub fn trim_head(&mut self, len: usize) -> usize {
        let len = len.min(self.len());
        self.head += len;
        if self.head == self.content.len() {
            self.clear();
        }
        len
    }

    /// Drop bytes after the first `len` readable ones.
    pub fn truncate(&mut self, len: usize) {
        self.content.truncate(self.head + len);
    }

    fn compact(&mut self) {
        if self.head > 0 && self.head >= self.len() {
            self.content.drain(..self.head);
            self.head = 0;
        }
    }
}

impl AsRef<[u8]> for XmlBuf {
    fn as_ref(&self) -> &[u8] {
        &self.content[self.head..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_and_push() {
        let mut buf = XmlBuf::new();
        buf.push_str("hello world").unwrap();
        assert_eq!(buf.trim_head(6), 6);
        assert_eq!(buf.as_ref(), b"world");
        buf.push_bytes(b"!!").unwrap();
        assert_eq!(buf.as_ref(), b"world!!");
        assert_eq!(buf.trim_head(100), 7);
        assert!(buf.is_empty());
    }

    #[test]
    fn compaction_keeps_content() {
        let mut buf = XmlBuf::with_capacity(16);
        buf.push_bytes(&[b'a'; 64]).unwrap();
        buf.trim_head(60);
        buf.push_bytes(b"bcd").unwrap();
        assert_eq!(buf.as_ref(), b"aaaabcd");
        buf.truncate(2);
        assert_eq!(buf.as_ref(), b"aa");
    }
}
