//! Block compression codecs.
//!
//! Directories and the metadata block are compressed with the archive's
//! internal compression; tile payloads carry their own tile compression.
//! Decompression is pure CPU work and never touches the backend.

use std::fmt;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use thiserror::Error;

/// Compression scheme codes as stored in the archive header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    Unknown,
    None,
    Gzip,
    Brotli,
    Zstd,
}

impl Compression {
    /// Decodes the on-disk compression byte. Unrecognised codes map to `Unknown`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Compression::None,
            2 => Compression::Gzip,
            3 => Compression::Brotli,
            4 => Compression::Zstd,
            _ => Compression::Unknown,
        }
    }

    /// The on-disk compression byte.
    pub fn code(&self) -> u8 {
        match self {
            Compression::Unknown => 0,
            Compression::None => 1,
            Compression::Gzip => 2,
            Compression::Brotli => 3,
            Compression::Zstd => 4,
        }
    }

    /// HTTP `Content-Encoding` token, or `None` for uncompressed data.
    pub fn content_encoding(&self) -> Option<&'static str> {
        match self {
            Compression::Gzip => Some("gzip"),
            Compression::Brotli => Some("br"),
            Compression::Zstd => Some("zstd"),
            Compression::None | Compression::Unknown => None,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Compression::Unknown => "unknown",
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Brotli => "brotli",
            Compression::Zstd => "zstd",
        };
        f.write_str(name)
    }
}

/// Errors from compressing or decompressing a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompressionError {
    /// The scheme is not one this codec can handle.
    #[error("unsupported compression: {0}")]
    Unsupported(Compression),

    /// The payload failed to decode under the declared scheme.
    #[error("corrupt {compression} payload: {reason}")]
    Corrupt {
        compression: Compression,
        reason: String,
    },
}

/// Brotli window size used when compressing.
const BROTLI_LG_WINDOW: u32 = 22;

/// Buffer size for brotli streams.
const BROTLI_BUFFER_SIZE: usize = 4096;

/// Decompresses `data` according to `compression`.
pub fn decompress(compression: Compression, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let corrupt = |e: std::io::Error| CompressionError::Corrupt {
        compression,
        reason: e.to_string(),
    };

    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Gzip => {
            let mut out = Vec::with_capacity(data.len() * 4);
            GzDecoder::new(data).read_to_end(&mut out).map_err(corrupt)?;
            Ok(out)
        }
        Compression::Brotli => {
            let mut out = Vec::with_capacity(data.len() * 4);
            brotli::Decompressor::new(data, BROTLI_BUFFER_SIZE)
                .read_to_end(&mut out)
                .map_err(corrupt)?;
            Ok(out)
        }
        Compression::Zstd => zstd::stream::decode_all(data).map_err(corrupt),
        Compression::Unknown => Err(CompressionError::Unsupported(compression)),
    }
}

/// Compresses `data` according to `compression`.
pub fn compress(compression: Compression, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let failed = |e: std::io::Error| CompressionError::Corrupt {
        compression,
        reason: e.to_string(),
    };

    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data).map_err(failed)?;
            encoder.finish().map_err(failed)
        }
        Compression::Brotli => {
            let mut out = Vec::new();
            {
                let mut writer =
                    brotli::CompressorWriter::new(&mut out, BROTLI_BUFFER_SIZE, 9, BROTLI_LG_WINDOW);
                writer.write_all(data).map_err(failed)?;
                writer.flush().map_err(failed)?;
            }
            Ok(out)
        }
        Compression::Zstd => zstd::stream::encode_all(data, 0).map_err(failed),
        Compression::Unknown => Err(CompressionError::Unsupported(compression)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMES: [Compression; 4] = [
        Compression::None,
        Compression::Gzip,
        Compression::Brotli,
        Compression::Zstd,
    ];

    fn sample_payload() -> Vec<u8> {
        (0..8192u32).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_roundtrip_every_scheme() {
        let payload = sample_payload();
        for scheme in SCHEMES {
            let packed = compress(scheme, &payload).unwrap();
            let unpacked = decompress(scheme, &packed).unwrap();
            assert_eq!(unpacked, payload, "scheme {}", scheme);
        }
    }

    #[test]
    fn test_roundtrip_empty_payload() {
        for scheme in SCHEMES {
            let packed = compress(scheme, &[]).unwrap();
            assert!(decompress(scheme, &packed).unwrap().is_empty());
        }
    }

    #[test]
    fn test_unknown_scheme_is_unsupported() {
        assert_eq!(
            decompress(Compression::Unknown, b"abc"),
            Err(CompressionError::Unsupported(Compression::Unknown))
        );
    }

    #[test]
    fn test_corrupt_gzip_reports_corrupt_payload() {
        let err = decompress(Compression::Gzip, b"definitely not gzip").unwrap_err();
        assert!(matches!(
            err,
            CompressionError::Corrupt {
                compression: Compression::Gzip,
                ..
            }
        ));
    }

    #[test]
    fn test_truncated_zstd_reports_corrupt_payload() {
        let packed = compress(Compression::Zstd, &sample_payload()).unwrap();
        let err = decompress(Compression::Zstd, &packed[..packed.len() / 2]).unwrap_err();
        assert!(matches!(err, CompressionError::Corrupt { .. }));
    }

    #[test]
    fn test_code_mapping() {
        for code in 0..=4u8 {
            assert_eq!(Compression::from_code(code).code(), code);
        }
        assert_eq!(Compression::from_code(42), Compression::Unknown);
    }

    #[test]
    fn test_content_encoding_tokens() {
        assert_eq!(Compression::Gzip.content_encoding(), Some("gzip"));
        assert_eq!(Compression::Brotli.content_encoding(), Some("br"));
        assert_eq!(Compression::Zstd.content_encoding(), Some("zstd"));
        assert_eq!(Compression::None.content_encoding(), None);
    }
}
