//! Minimal BCS reader and writer for the encrypted object layout.
//!
//! Integers are little-endian, sequence lengths and enum tags are ULEB128,
//! fixed-size arrays are written without a length. Overlong ULEB128 encodings
//! and values above `u32::MAX` are rejected, matching canonical BCS.

use crate::error::{SealError, SealResult};

#[derive(Default)]
pub(crate) struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn fixed(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn uleb128(&mut self, mut value: u32) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.bytes.push(byte);
                return;
            }
            self.bytes.push(byte | 0x80);
        }
    }

    /// Length-prefixed byte vector.
    pub fn bytes(&mut self, bytes: &[u8]) {
        self.len(bytes.len());
        self.fixed(bytes);
    }

    pub fn len(&mut self, len: usize) {
        // Lengths are bounded by the object invariants and by memory well before u32::MAX
        self.uleb128(u32::try_from(len).unwrap_or(u32::MAX));
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn take(&mut self, len: usize, what: &str) -> SealResult<&'a [u8]> {
        let end = self
            .position
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| malformed(format!("unexpected end of input reading {what}")))?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    pub fn u8(&mut self, what: &str) -> SealResult<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub fn fixed<const N: usize>(&mut self, what: &str) -> SealResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub fn uleb128(&mut self, what: &str) -> SealResult<u32> {
        let mut value: u64 = 0;
        for shift in (0..).step_by(7).take(5) {
            let byte = self.u8(what)?;
            let digit = u64::from(byte & 0x7f);
            value |= digit << shift;
            if byte & 0x80 == 0 {
                if shift > 0 && digit == 0 {
                    return Err(malformed(format!("non-canonical length for {what}")));
                }
                return u32::try_from(value)
                    .map_err(|_| malformed(format!("length overflow for {what}")));
            }
        }
        Err(malformed(format!("length overflow for {what}")))
    }

    /// Sequence length, bounded by the bytes left so a forged prefix cannot
    /// trigger a huge allocation.
    pub fn len(&mut self, element_size: usize, what: &str) -> SealResult<usize> {
        let len = self.uleb128(what)? as usize;
        if len.saturating_mul(element_size.max(1)) > self.remaining() {
            return Err(malformed(format!("unexpected end of input reading {what}")));
        }
        Ok(len)
    }

    pub fn bytes(&mut self, what: &str) -> SealResult<Vec<u8>> {
        let len = self.len(1, what)?;
        Ok(self.take(len, what)?.to_vec())
    }

    pub fn rest(&mut self) -> Vec<u8> {
        let rest = self.bytes[self.position..].to_vec();
        self.position = self.bytes.len();
        rest
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    pub fn finish(self) -> SealResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(malformed(format!("{n} trailing bytes"))),
        }
    }
}

fn malformed(message: String) -> SealError {
    SealError::MalformedObject(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: u32) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.uleb128(value);
        writer.finish()
    }

    #[test]
    fn test_uleb128_known_encodings() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(127), vec![0x7f]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(300), vec![0xac, 0x02]);
        assert_eq!(encode(u32::MAX), vec![0xff, 0xff, 0xff, 0xff, 0x0f]);

        for value in [0, 1, 127, 128, 255, 300, 16_384, u32::MAX] {
            let bytes = encode(value);
            let mut reader = Reader::new(&bytes);
            assert_eq!(reader.uleb128("value").unwrap(), value);
            reader.finish().unwrap();
        }
    }

    #[test]
    fn test_uleb128_rejects_non_canonical_and_overflow() {
        let mut overlong = Reader::new(&[0x80, 0x00]);
        assert!(matches!(
            overlong.uleb128("len"),
            Err(SealError::MalformedObject(_))
        ));

        let mut too_big = Reader::new(&[0xff, 0xff, 0xff, 0xff, 0x1f]);
        assert!(too_big.uleb128("len").is_err());

        let mut unterminated = Reader::new(&[0x80]);
        assert!(unterminated.uleb128("len").is_err());
    }

    #[test]
    fn test_length_prefix_bounded_by_input() {
        // Claims 200 bytes, carries 2
        let mut reader = Reader::new(&[0xc8, 0x01, 0xaa, 0xbb]);
        assert!(matches!(
            reader.bytes("blob"),
            Err(SealError::MalformedObject(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut reader = Reader::new(&[1, 2]);
        assert_eq!(reader.u8("version").unwrap(), 1);
        assert!(matches!(reader.finish(), Err(SealError::MalformedObject(_))));
    }
}
