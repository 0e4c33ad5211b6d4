use byteorder::{BigEndian, ByteOrder};
use std::ops::Deref;

use crate::error::Error;

const STRING_ENCODING_NULL: u8 = 0;
const STRING_ENCODING_EMPTY: u8 = 1;
const STRING_ENCODING_UTF8_BYTE_ARRAY: u8 = 3;
const STRING_ENCODING_CHAR_ARRAY: u8 = 4;
const STRING_ENCODING_LATIN1_BYTE_ARRAY: u8 = 5;

/// The backing storage for a recording: either a read-only file mapping or a
/// caller-supplied buffer. Both expose the whole file as one byte slice.
pub(crate) enum Image {
    Mmap(memmap2::Mmap),
    Owned(Vec<u8>),
}

impl Deref for Image {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Image::Mmap(mmap) => mmap,
            Image::Owned(vec) => vec,
        }
    }
}

/// A positioned view over the file image.
///
/// `limit` is the chunk-local soft bound: while events are being read it is
/// narrowed to the current chunk body, and all streaming reads fail with
/// [`Error::UnexpectedEof`] once `position` would pass it. The absolute
/// big-endian getters used for chunk headers are bounded by the image length
/// instead, since headers are located outside the current window.
pub(crate) struct Cursor {
    image: Image,
    position: usize,
    limit: usize,
}

impl Cursor {
    pub(crate) fn new(image: Image) -> Self {
        let limit = image.len();
        Cursor {
            image,
            position: 0,
            limit,
        }
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.image
    }

    pub(crate) fn image_len(&self) -> usize {
        self.image.len()
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn has_remaining(&self) -> bool {
        self.position < self.limit
    }

    pub(crate) fn set_position(&mut self, position: usize) -> Result<(), Error> {
        if position > self.limit {
            return Err(Error::UnexpectedEof);
        }
        self.position = position;
        Ok(())
    }

    /// Repositions the cursor and narrows the soft bound in one step, used
    /// when switching between chunk bodies.
    pub(crate) fn set_window(&mut self, position: usize, limit: usize) -> Result<(), Error> {
        if limit > self.image.len() || position > limit {
            return Err(Error::UnexpectedEof);
        }
        self.position = position;
        self.limit = limit;
        Ok(())
    }

    pub(crate) fn get_u64_be(&self, offset: usize) -> Result<u64, Error> {
        match self.image.get(offset..offset + 8) {
            Some(bytes) => Ok(BigEndian::read_u64(bytes)),
            None => Err(Error::UnexpectedEof),
        }
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, Error> {
        if self.position >= self.limit {
            return Err(Error::UnexpectedEof);
        }
        let b = self.image[self.position];
        self.position += 1;
        Ok(b)
    }

    pub(crate) fn skip(&mut self, count: usize) -> Result<(), Error> {
        let new_position = self.position.checked_add(count).ok_or(Error::UnexpectedEof)?;
        self.set_position(new_position)
    }

    /// LEB128 varint with a 32-bit result.
    ///
    /// The loop is unbounded; inputs wider than 32 bits truncate through the
    /// wrapping shift, matching the arithmetic of the JFR writer's own
    /// decoder. Callers only use this for sizes, counts and small ids.
    pub(crate) fn read_varint(&mut self) -> Result<u32, Error> {
        let mut result: u32 = 0;
        let mut shift = 0u32;
        loop {
            let b = self.read_u8()?;
            result |= u32::from(b & 0x7f).wrapping_shl(shift);
            if b & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    /// LEB128 varlong with a 64-bit result.
    ///
    /// If all of the first 8 bytes carry the continuation bit, a ninth byte
    /// is read whole into bits 56..64, so an encoding never exceeds 9 bytes.
    pub(crate) fn read_varlong(&mut self) -> Result<u64, Error> {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        while shift < 56 {
            let b = self.read_u8()?;
            result |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Ok(result | u64::from(self.read_u8()?) << 56)
    }

    /// Varint-length-prefixed raw bytes.
    pub(crate) fn read_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let count = self.read_varint()? as usize;
        let end = self.position.checked_add(count).ok_or(Error::UnexpectedEof)?;
        if end > self.limit {
            return Err(Error::UnexpectedEof);
        }
        let bytes = self.image[self.position..end].to_vec();
        self.position = end;
        Ok(bytes)
    }

    /// Decodes one of the five JFR string encodings. `None` is the encoded
    /// null string, distinct from the empty string.
    pub(crate) fn read_string(&mut self) -> Result<Option<String>, Error> {
        match self.read_u8()? {
            STRING_ENCODING_NULL => Ok(None),
            STRING_ENCODING_EMPTY => Ok(Some(String::new())),
            STRING_ENCODING_UTF8_BYTE_ARRAY => {
                let bytes = self.read_bytes()?;
                Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
            }
            STRING_ENCODING_CHAR_ARRAY => {
                let count = self.read_varint()? as usize;
                let mut units = Vec::with_capacity(count);
                for _ in 0..count {
                    units.push(self.read_varint()? as u16);
                }
                Ok(Some(String::from_utf16_lossy(&units)))
            }
            STRING_ENCODING_LATIN1_BYTE_ARRAY => {
                let bytes = self.read_bytes()?;
                Ok(Some(bytes.iter().map(|&b| b as char).collect()))
            }
            _ => Err(Error::InvalidFormat("Invalid string encoding")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(bytes: &[u8]) -> Cursor {
        Cursor::new(Image::Owned(bytes.to_vec()))
    }

    fn encode_varint(mut value: u32) -> Vec<u8> {
        let mut out = Vec::new();
        while value >= 0x80 {
            out.push(value as u8 | 0x80);
            value >>= 7;
        }
        out.push(value as u8);
        out
    }

    fn encode_varlong(mut value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        for _ in 0..8 {
            if value < 0x80 {
                out.push(value as u8);
                return out;
            }
            out.push(value as u8 | 0x80);
            value >>= 7;
        }
        out.push(value as u8);
        out
    }

    #[test]
    fn varint_round_trip() {
        for value in [
            0u32,
            1,
            0x7f,
            0x80,
            0x3fff,
            0x4000,
            0x1f_ffff,
            0x20_0000,
            0xfff_ffff,
            0x1000_0000,
            0x7fff_ffff,
            u32::MAX,
        ] {
            let encoded = encode_varint(value);
            assert_eq!(cursor(&encoded).read_varint().unwrap(), value);
        }
    }

    #[test]
    fn varint_overflow_truncates() {
        // 6 continuation bytes: the sixth chunk lands at a wrapped shift of 3.
        let bytes = [0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert_eq!(cursor(&bytes).read_varint().unwrap(), 1 << 3);
    }

    #[test]
    fn varlong_round_trip() {
        for value in [
            0u64,
            1,
            0x7f,
            0x80,
            (1 << 28) - 1,
            1 << 28,
            (1 << 56) - 1,
            1 << 56,
            0x7fff_ffff_ffff_ffff,
            u64::MAX,
        ] {
            let encoded = encode_varlong(value);
            assert_eq!(cursor(&encoded).read_varlong().unwrap(), value);
        }
    }

    #[test]
    fn varlong_nine_byte_terminator() {
        // Eight continuation bytes fill the low 56 bits, the ninth byte is
        // taken whole as bits 56..64.
        let mut bytes = vec![0xff; 8];
        bytes.push(0xa5);
        assert_eq!(
            cursor(&bytes).read_varlong().unwrap(),
            0x00ff_ffff_ffff_ffff | 0xa5 << 56
        );
    }

    #[test]
    fn varlong_truncated_input() {
        assert!(matches!(
            cursor(&[0x80, 0x80]).read_varlong(),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn string_null() {
        assert_eq!(cursor(&[0]).read_string().unwrap(), None);
    }

    #[test]
    fn string_empty() {
        assert_eq!(cursor(&[1]).read_string().unwrap(), Some(String::new()));
    }

    #[test]
    fn string_utf8() {
        let mut bytes = vec![3];
        bytes.extend_from_slice(&encode_varint(11));
        bytes.extend_from_slice(b"hello,world");
        assert_eq!(
            cursor(&bytes).read_string().unwrap(),
            Some("hello,world".to_string())
        );
    }

    #[test]
    fn string_char_array() {
        // Three varint-encoded UTF-16 code units.
        let mut bytes = vec![4];
        bytes.extend_from_slice(&encode_varint(3));
        for unit in [0x4a_u32, 0x46, 0x52] {
            bytes.extend_from_slice(&encode_varint(unit));
        }
        assert_eq!(cursor(&bytes).read_string().unwrap(), Some("JFR".to_string()));
    }

    #[test]
    fn string_latin1() {
        let mut bytes = vec![5];
        bytes.extend_from_slice(&encode_varint(2));
        bytes.extend_from_slice(&[0xc4, 0x62]);
        assert_eq!(cursor(&bytes).read_string().unwrap(), Some("Äb".to_string()));
    }

    #[test]
    fn string_invalid_tags() {
        for tag in [2u8, 6, 7, 0xff] {
            assert!(matches!(
                cursor(&[tag]).read_string(),
                Err(Error::InvalidFormat("Invalid string encoding"))
            ));
        }
    }

    #[test]
    fn reads_stop_at_limit() {
        let mut c = cursor(&[1, 2, 3, 4]);
        c.set_window(0, 2).unwrap();
        assert_eq!(c.read_u8().unwrap(), 1);
        assert_eq!(c.read_u8().unwrap(), 2);
        assert!(matches!(c.read_u8(), Err(Error::UnexpectedEof)));
    }
}
