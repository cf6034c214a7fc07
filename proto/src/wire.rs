//! little-endian byte reader/writer for protocol frames.
//!
//! the writer keeps an explicit cursor that can be moved back over already
//! written bytes without truncating - workers rely on that to keep a cached
//! "length prefix + opcode + top ratings" prefix in the buffer and rewrite
//! only the header and the tail of each outgoing message.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("payload ended before the field could be read")]
    Underflow,

    #[error("name of {len} bytes exceeds the 255-byte wire limit")]
    NameTooLong { len: usize },

    #[error("unknown message opcode {code}")]
    UnknownOpcode { code: u8 },

    #[error("unknown protocol error code {code}")]
    UnknownErrorCode { code: u32 },
}

/// growable output buffer with overwrite-capable cursor.
///
/// writes at the cursor overwrite existing bytes and extend the buffer only
/// past its end, so `set_position` + write rewrites fields in place while
/// `truncate` discards a tail.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
    pos: usize,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            pos: 0,
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// move the cursor over already written bytes.
    ///
    /// panics if `pos` is past the end of the buffer.
    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        assert!(pos <= self.buf.len(), "cursor past end of buffer");
        self.pos = pos;
    }

    /// drop everything past `pos` and leave the cursor there.
    #[inline]
    pub fn truncate(&mut self, pos: usize) {
        self.buf.truncate(pos);
        self.pos = pos;
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    fn put_bytes(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    #[inline]
    pub fn put_u8(&mut self, v: u8) {
        self.put_bytes(&[v]);
    }

    #[inline]
    pub fn put_u16(&mut self, v: u16) {
        self.put_bytes(&v.to_le_bytes());
    }

    #[inline]
    pub fn put_u32(&mut self, v: u32) {
        self.put_bytes(&v.to_le_bytes());
    }

    #[inline]
    pub fn put_i32(&mut self, v: i32) {
        self.put_bytes(&v.to_le_bytes());
    }

    #[inline]
    pub fn put_i64(&mut self, v: i64) {
        self.put_bytes(&v.to_le_bytes());
    }

    /// write a u8-length-prefixed byte string.
    pub fn put_name(&mut self, name: &[u8]) -> Result<(), WireError> {
        if name.len() > u8::MAX as usize {
            return Err(WireError::NameTooLong { len: name.len() });
        }
        self.put_u8(name.len() as u8);
        self.put_bytes(name);
        Ok(())
    }
}

/// sequential reader over a frame payload.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Underflow);
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    #[inline]
    pub fn get_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    #[inline]
    pub fn get_u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().expect("sized")))
    }

    #[inline]
    pub fn get_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("sized")))
    }

    #[inline]
    pub fn get_i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().expect("sized")))
    }

    #[inline]
    pub fn get_i64(&mut self) -> Result<i64, WireError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().expect("sized")))
    }

    /// read a u8-length-prefixed byte string.
    pub fn get_name(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.get_u8()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_round_trip() {
        let mut w = ByteWriter::new();
        w.put_u8(0xab);
        w.put_u16(0x1234);
        w.put_u32(0xdead_beef);
        w.put_i32(-7);
        w.put_i64(i64::MIN);

        let mut r = ByteReader::new(w.bytes());
        assert_eq!(r.get_u8().unwrap(), 0xab);
        assert_eq!(r.get_u16().unwrap(), 0x1234);
        assert_eq!(r.get_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.get_i32().unwrap(), -7);
        assert_eq!(r.get_i64().unwrap(), i64::MIN);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut w = ByteWriter::new();
        w.put_u16(0x0102);
        assert_eq!(w.bytes(), &[0x02, 0x01]);
    }

    #[test]
    fn test_name_round_trip() {
        let mut w = ByteWriter::new();
        w.put_name(b"alice").unwrap();
        w.put_name(b"").unwrap();

        let mut r = ByteReader::new(w.bytes());
        assert_eq!(r.get_name().unwrap(), b"alice");
        assert_eq!(r.get_name().unwrap(), b"");
    }

    #[test]
    fn test_name_too_long() {
        let mut w = ByteWriter::new();
        let long = vec![b'x'; 256];
        assert_eq!(
            w.put_name(&long),
            Err(WireError::NameTooLong { len: 256 })
        );
    }

    #[test]
    fn test_underflow() {
        let mut r = ByteReader::new(&[0x01, 0x02]);
        assert_eq!(r.get_u32(), Err(WireError::Underflow));

        // a truncated name body underflows too
        let mut r = ByteReader::new(&[5, b'a', b'b']);
        assert_eq!(r.get_name(), Err(WireError::Underflow));
    }

    #[test]
    fn test_overwrite_keeps_tail() {
        let mut w = ByteWriter::new();
        w.put_u16(0); // placeholder
        w.put_u32(0xaaaa_aaaa);

        let end = w.position();
        w.set_position(0);
        w.put_u16(6);
        assert_eq!(w.position(), 2);
        assert_eq!(w.bytes().len(), end);

        let mut r = ByteReader::new(w.bytes());
        assert_eq!(r.get_u16().unwrap(), 6);
        assert_eq!(r.get_u32().unwrap(), 0xaaaa_aaaa);
    }

    #[test]
    fn test_truncate() {
        let mut w = ByteWriter::new();
        w.put_u32(1);
        let mark = w.position();
        w.put_u32(2);
        w.truncate(mark);
        assert_eq!(w.bytes().len(), 4);
        assert_eq!(w.position(), 4);
    }
}
