//! Entity codec: typed values to checksummed binary frames and back.
//! Used for the write-ahead log and for session attributes.

pub mod frame;

#[cfg(test)]
mod tests;

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::Read;

use crate::error::CodecError;
pub use frame::{read_frame, write_frame, FrameHeader, FRAME_HEADER_LEN, MAX_FRAME_PAYLOAD};

/// Serialization format of a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Serializer {
    #[default]
    Bincode,
    Json,
}

impl Serializer {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Serializer::Bincode => 1,
            Serializer::Json => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            1 => Ok(Serializer::Bincode),
            2 => Ok(Serializer::Json),
            _ => Err(CodecError::UnknownTag {
                kind: "serializer",
                tag,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    None,
    Lz4,
    Zstd,
}

impl Compression {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Lz4 => 1,
            Compression::Zstd => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lz4),
            2 => Ok(Compression::Zstd),
            _ => Err(CodecError::UnknownTag {
                kind: "compression",
                tag,
            }),
        }
    }

    fn compress(self, data: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        match self {
            Compression::None => Ok(data),
            Compression::Lz4 => lz4::block::compress(&data, None, true)
                .map_err(|e| CodecError::Compression(format!("lz4: {}", e))),
            Compression::Zstd => zstd::stream::encode_all(data.as_slice(), ZSTD_LEVEL)
                .map_err(|e| CodecError::Compression(format!("zstd: {}", e))),
        }
    }

    fn decompress(self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Lz4 => lz4::block::decompress(data, None)
                .map_err(|e| CodecError::Compression(format!("lz4: {}", e))),
            Compression::Zstd => zstd::stream::decode_all(data)
                .map_err(|e| CodecError::Compression(format!("zstd: {}", e))),
        }
    }
}

const ZSTD_LEVEL: i32 = 3;

/// Encodes with a fixed serializer/compression pair; decodes whatever the
/// frame header says, so codecs with different settings can read each
/// other's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntityCodec {
    serializer: Serializer,
    compression: Compression,
}

impl EntityCodec {
    pub fn new(serializer: Serializer, compression: Compression) -> Self {
        Self {
            serializer,
            compression,
        }
    }

    pub fn serializer(&self) -> Serializer {
        self.serializer
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, CodecError> {
        let raw = match self.serializer {
            Serializer::Bincode => bincode::serialize(value)?,
            Serializer::Json => serde_json::to_vec(value)?,
        };
        let payload = self.compression.compress(raw)?;
        write_frame(self.serializer, self.compression, &payload)
    }

    pub fn decode<T: DeserializeOwned>(&self, frame: &[u8]) -> Result<T, CodecError> {
        let (header, payload) = read_frame(frame)?;
        let raw = header.compression.decompress(payload)?;
        let value = match header.serializer {
            Serializer::Bincode => bincode::deserialize(&raw)?,
            Serializer::Json => serde_json::from_slice(&raw)?,
        };
        Ok(value)
    }

    /// Reads one frame from a stream. `Ok(None)` on a clean end of stream.
    pub fn read_next<R: Read>(reader: &mut R) -> Result<Option<Bytes>, CodecError> {
        let mut header_buf = [0u8; FRAME_HEADER_LEN];
        match read_full(reader, &mut header_buf)? {
            0 => return Ok(None),
            n if n < FRAME_HEADER_LEN => {
                return Err(CodecError::Truncated {
                    expected: FRAME_HEADER_LEN,
                    found: n,
                })
            }
            _ => {}
        }

        // Parsing caps the length, and the payload is read incrementally, so a
        // corrupt length costs at most what the stream actually holds.
        let header = FrameHeader::parse(&header_buf)?;
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN);
        frame.extend_from_slice(&header_buf);
        reader
            .by_ref()
            .take(header.payload_len as u64)
            .read_to_end(&mut frame)
            .map_err(|e| CodecError::Serialization(format!("read: {}", e)))?;
        if frame.len() < header.frame_len() {
            return Err(CodecError::Truncated {
                expected: header.frame_len(),
                found: frame.len(),
            });
        }
        Ok(Some(Bytes::from(frame)))
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, CodecError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CodecError::Serialization(format!("read: {}", e))),
        }
    }
    Ok(filled)
}
