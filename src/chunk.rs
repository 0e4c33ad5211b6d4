use byteorder::{BigEndian, ByteOrder};

use crate::error::Error;

/// `FLR\0`, big-endian, at the start of every chunk.
const MAGIC: u32 = 0x464c_5200;

/// Only JFR major version 2 is supported; the minor version is ignored.
const VERSION_MIN: u32 = 0x2_0000;
const VERSION_MAX: u32 = 0x2_ffff;

const CPOOL_OFFSET: usize = 16;
const META_OFFSET: usize = 24;

/// The fixed-size header at the start of every chunk. All scalars are
/// big-endian; the section fields are 8 bytes wide on the wire but only
/// their low 4 bytes carry the in-chunk offset.
///
/// | offset | width | meaning                        |
/// |--------|-------|--------------------------------|
/// | 0      | 4     | magic `FLR\0`                  |
/// | 4      | 4     | version, major 2 required      |
/// | 8      | 8     | total chunk length in bytes    |
/// | 16     | 8     | constant pool offset (at +20)  |
/// | 24     | 8     | metadata offset (at +28)       |
/// | 32     | 8     | start time, nanoseconds        |
/// | 40     | 8     | duration, nanoseconds          |
/// | 48     | 8     | start ticks                    |
/// | 56     | 8     | ticks per second               |
#[derive(Debug, Clone, Copy)]
pub struct ChunkHeader {
    pub chunk_size: u64,
    pub constant_pool_offset: u32,
    pub metadata_offset: u32,
    pub start_nanos: u64,
    pub duration_nanos: u64,
    pub start_ticks: u64,
    pub ticks_per_sec: u64,
}

impl ChunkHeader {
    pub const SIZE: usize = 68;

    pub(crate) fn parse(data: &[u8], chunk_start: usize) -> Result<Self, Error> {
        let header = data
            .get(chunk_start..chunk_start + Self::SIZE)
            .ok_or(Error::UnexpectedEof)?;

        if BigEndian::read_u32(&header[0..]) != MAGIC {
            return Err(Error::NotJfr);
        }

        let version = BigEndian::read_u32(&header[4..]);
        if !(VERSION_MIN..=VERSION_MAX).contains(&version) {
            return Err(Error::UnsupportedVersion(
                (version >> 16) as u16,
                (version & 0xffff) as u16,
            ));
        }

        Ok(ChunkHeader {
            chunk_size: BigEndian::read_u64(&header[8..]),
            constant_pool_offset: BigEndian::read_u32(&header[CPOOL_OFFSET + 4..]),
            metadata_offset: BigEndian::read_u32(&header[META_OFFSET + 4..]),
            start_nanos: BigEndian::read_u64(&header[32..]),
            duration_nanos: BigEndian::read_u64(&header[40..]),
            start_ticks: BigEndian::read_u64(&header[48..]),
            ticks_per_sec: BigEndian::read_u64(&header[56..]),
        })
    }
}

/// Byte range of one chunk within the file image.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkBounds {
    pub(crate) start: usize,
    pub(crate) len: usize,
}

impl ChunkBounds {
    pub(crate) fn body_start(&self) -> usize {
        self.start + ChunkHeader::SIZE
    }

    pub(crate) fn end(&self) -> usize {
        self.start + self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(magic: u32, version: u32) -> Vec<u8> {
        let mut bytes = vec![0u8; ChunkHeader::SIZE];
        BigEndian::write_u32(&mut bytes[0..], magic);
        BigEndian::write_u32(&mut bytes[4..], version);
        BigEndian::write_u64(&mut bytes[8..], ChunkHeader::SIZE as u64);
        bytes
    }

    #[test]
    fn accepts_major_version_2() {
        for version in [0x2_0000, 0x2_0001, 0x2_ffff] {
            assert!(ChunkHeader::parse(&header_bytes(MAGIC, version), 0).is_ok());
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let result = ChunkHeader::parse(&header_bytes(0x464c_5201, 0x2_0000), 0);
        assert!(matches!(result, Err(Error::NotJfr)));
    }

    #[test]
    fn rejects_other_major_versions() {
        assert!(matches!(
            ChunkHeader::parse(&header_bytes(MAGIC, 0x1_ffff), 0),
            Err(Error::UnsupportedVersion(1, 0xffff))
        ));
        assert!(matches!(
            ChunkHeader::parse(&header_bytes(MAGIC, 0x3_0000), 0),
            Err(Error::UnsupportedVersion(3, 0))
        ));
    }

    #[test]
    fn short_header_is_eof() {
        assert!(matches!(
            ChunkHeader::parse(&[0u8; 10], 0),
            Err(Error::UnexpectedEof)
        ));
    }
}
