use flate2::read::{GzDecoder, ZlibDecoder};
use std::io::Read;
use tracing::debug;

use crate::errors::{AppResult, DecodeError};

/// Encoding a fetched document turned out to have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Gzip,
    Zlib,
    Uncompressed,
}

/// Ordered decompression attempts for fetched documents
///
/// Providers serve guides as `.xml.gz`, as raw deflate streams, or as plain
/// text, frequently with a misleading `Content-Type`. Rather than trusting
/// headers each scheme is attempted in turn and the first success wins.
pub struct DecompressionService;

impl DecompressionService {
    /// Decode raw bytes into text: gzip, then zlib, then literal UTF-8
    pub fn decompress_document(data: &[u8]) -> AppResult<(String, CompressionFormat)> {
        let (bytes, format) = Self::decompress(data);
        debug!(
            "Decoded {} bytes into {} bytes (compression: {:?})",
            data.len(),
            bytes.len(),
            format
        );

        let text = String::from_utf8(bytes).map_err(DecodeError::from)?;
        Ok((text, format))
    }

    /// Attempt each supported scheme; literal bytes are the final fallback
    pub fn decompress(data: &[u8]) -> (Vec<u8>, CompressionFormat) {
        if let Some(bytes) = Self::decompress_gzip(data) {
            return (bytes, CompressionFormat::Gzip);
        }
        if let Some(bytes) = Self::decompress_zlib(data) {
            return (bytes, CompressionFormat::Zlib);
        }
        (data.to_vec(), CompressionFormat::Uncompressed)
    }

    fn decompress_gzip(data: &[u8]) -> Option<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).ok()?;
        Some(decompressed)
    }

    fn decompress_zlib(data: &[u8]) -> Option<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).ok()?;
        Some(decompressed)
    }
}
