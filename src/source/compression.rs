//! Object decompression for the event source
//!
//! Source objects are whole-object compressed; the codec is detected from the
//! object key suffix (`.gz`, `.lz4`, `.zst`), anything else is read raw.
//! Decoding is streaming: the raw byte stream is wrapped in the matching
//! decoder, so an object is never materialized wholesale.

use std::io::Read;

/// Compression codecs recognized on source objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectCodec {
    /// No compression
    #[default]
    None,
    /// Gzip - widely compatible, good ratio
    Gzip,
    /// LZ4 frame format - fast decompression
    Lz4,
    /// Zstandard - good balance of speed and ratio
    Zstd,
}

impl ObjectCodec {
    /// Detect the codec from an object key suffix
    pub fn from_key(key: &str) -> Self {
        let lower = key.to_ascii_lowercase();
        if lower.ends_with(".gz") || lower.ends_with(".gzip") {
            Self::Gzip
        } else if lower.ends_with(".lz4") {
            Self::Lz4
        } else if lower.ends_with(".zst") || lower.ends_with(".zstd") {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// Get codec name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    /// Wrap a raw object byte stream in the matching streaming decoder.
    ///
    /// Corrupt data surfaces as a read error from the returned reader, at the
    /// point of the first affected chunk.
    pub fn reader<R>(self, inner: R) -> std::io::Result<Box<dyn Read + Send>>
    where
        R: Read + Send + 'static,
    {
        Ok(match self {
            Self::None => Box::new(inner),
            Self::Gzip => Box::new(flate2::read::GzDecoder::new(inner)),
            Self::Lz4 => Box::new(lz4_flex::frame::FrameDecoder::new(inner)),
            Self::Zstd => Box::new(zstd::Decoder::new(inner)?),
        })
    }
}
