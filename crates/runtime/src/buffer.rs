//! Reusable output buffer
//!
//! Allocated once by the caller and overwritten by every operation that
//! returns owned bytes: rational components, serialized documents, rendered
//! errors. Contents are always UTF-8 produced by this crate.

use knot_core::WriteSink;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringBuffer {
    bytes: Vec<u8>,
}

impl StringBuffer {
    pub fn new() -> Self {
        StringBuffer::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The contents as text
    ///
    /// Everything this crate writes is UTF-8; bytes pushed through the
    /// `WriteSink` impl by other code are replaced lossily.
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Replace the contents, reusing the allocation
    pub fn set(&mut self, data: impl AsRef<[u8]>) {
        self.bytes.clear();
        self.bytes.extend_from_slice(data.as_ref());
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl WriteSink for StringBuffer {
    fn write(&mut self, buf: &[u8]) -> usize {
        self.bytes.extend_from_slice(buf);
        buf.len()
    }

    fn flush(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_overwrites() {
        let mut buf = StringBuffer::new();
        buf.set("first value");
        buf.set("2nd");
        assert_eq!(buf.as_str(), "2nd");
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_sink_appends() {
        let mut buf = StringBuffer::new();
        knot_core::write_message(&mut buf, b"abc").unwrap();
        knot_core::write_message(&mut buf, b"def").unwrap();
        assert_eq!(buf.as_bytes(), b"abcdef");
        buf.clear();
        assert!(buf.is_empty());
    }
}
