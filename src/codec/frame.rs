//! Binary frame around every encoded entity.
//!
//! Layout (little-endian, 16-byte header):
//! `[magic u32][version u8][serializer u8][compression u8][reserved u8][payload_len u32][crc32 u32][payload]`
//!
//! The checksum covers the payload exactly as stored (after compression).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc32fast::Hasher as Crc32;

use super::{Compression, Serializer};
use crate::error::CodecError;

pub const FRAME_MAGIC: u32 = u32::from_le_bytes(*b"GRDF");
pub const FRAME_VERSION: u8 = 1;
pub const FRAME_HEADER_LEN: usize = 16;
/// Largest payload a frame may carry. Headers claiming more are rejected
/// before anything is allocated for them.
pub const MAX_FRAME_PAYLOAD: u32 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub serializer: Serializer,
    pub compression: Compression,
    pub payload_len: u32,
    pub checksum: u32,
}

impl FrameHeader {
    pub fn parse(mut buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < FRAME_HEADER_LEN {
            return Err(CodecError::Truncated {
                expected: FRAME_HEADER_LEN,
                found: buf.len(),
            });
        }

        let magic = buf.get_u32_le();
        if magic != FRAME_MAGIC {
            return Err(CodecError::BadMagic(magic));
        }
        let version = buf.get_u8();
        if version != FRAME_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let serializer = Serializer::from_tag(buf.get_u8())?;
        let compression = Compression::from_tag(buf.get_u8())?;
        let _reserved = buf.get_u8();
        let payload_len = buf.get_u32_le();
        if payload_len > MAX_FRAME_PAYLOAD {
            return Err(CodecError::FrameTooLarge {
                len: payload_len as usize,
                max: MAX_FRAME_PAYLOAD as usize,
            });
        }
        let checksum = buf.get_u32_le();

        Ok(Self {
            serializer,
            compression,
            payload_len,
            checksum,
        })
    }

    /// Total size of the frame this header describes.
    pub fn frame_len(&self) -> usize {
        FRAME_HEADER_LEN + self.payload_len as usize
    }
}

fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(payload);
    hasher.finalize()
}

pub fn write_frame(
    serializer: Serializer,
    compression: Compression,
    payload: &[u8],
) -> Result<Bytes, CodecError> {
    let payload_len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_PAYLOAD)
        .ok_or(CodecError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_PAYLOAD as usize,
        })?;

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_u32_le(FRAME_MAGIC);
    buf.put_u8(FRAME_VERSION);
    buf.put_u8(serializer.tag());
    buf.put_u8(compression.tag());
    buf.put_u8(0);
    buf.put_u32_le(payload_len);
    buf.put_u32_le(checksum(payload));
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Validates a complete frame and returns its header and stored payload.
pub fn read_frame(frame: &[u8]) -> Result<(FrameHeader, &[u8]), CodecError> {
    let header = FrameHeader::parse(frame)?;
    if frame.len() < header.frame_len() {
        return Err(CodecError::Truncated {
            expected: header.frame_len(),
            found: frame.len(),
        });
    }

    let payload = &frame[FRAME_HEADER_LEN..header.frame_len()];
    let computed = checksum(payload);
    if computed != header.checksum {
        return Err(CodecError::ChecksumMismatch {
            expected: header.checksum,
            computed,
        });
    }

    Ok((header, payload))
}
