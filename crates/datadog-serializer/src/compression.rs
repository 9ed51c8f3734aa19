// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Compression algorithms used to encode payloads.
//!
//! A [`Compressor`] is a long-lived, thread-safe handle that knows how to encode a buffer in one
//! shot (stream mode, one payload per message) and how to open a [`StreamEncoder`] that encodes
//! incrementally into a caller-provided buffer (batch mode, where the payload grows item by item
//! and its compressed length must be observable between items).

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

use crate::config::SerializerConfig;
use crate::errors::CompressionError;

/// Incremental encoder writing into a borrowed output buffer.
pub trait StreamEncoder<'a>: Send {
    /// Feeds uncompressed bytes to the encoder.
    fn write(&mut self, data: &[u8]) -> Result<(), CompressionError>;

    /// Forces everything written so far into the output buffer, so that
    /// [`StreamEncoder::compressed_len`] accounts for it.
    fn flush(&mut self) -> Result<(), CompressionError>;

    /// Number of compressed bytes currently in the output buffer.
    fn compressed_len(&self) -> usize;

    /// Terminates the stream and gives back the output buffer.
    fn finish(self: Box<Self>) -> Result<&'a mut Vec<u8>, CompressionError>;
}

pub trait Compressor: Send + Sync {
    /// Encodes `src` in one shot.
    fn compress(&self, src: &[u8]) -> Result<Vec<u8>, CompressionError>;

    /// Value of the `Content-Encoding` header matching the produced bytes.
    fn content_encoding(&self) -> &'static str;

    /// Worst-case encoded size of `len` input bytes, framing overhead included.
    fn compress_bound(&self, len: usize) -> usize;

    /// Opens a stream encoder appending to `output`, which must be empty. The buffer stays with
    /// its owner, so its capacity survives an abandoned stream.
    fn stream_encoder<'a>(
        &self,
        output: &'a mut Vec<u8>,
    ) -> Result<Box<dyn StreamEncoder<'a> + 'a>, CompressionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressorKind {
    None,
    Gzip,
    Zlib,
    Zstd,
}

impl CompressorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressorKind::None => "none",
            CompressorKind::Gzip => "gzip",
            CompressorKind::Zlib => "zlib",
            CompressorKind::Zstd => "zstd",
        }
    }
}

impl fmt::Display for CompressorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressorKind {
    type Err = CompressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "identity" => Ok(CompressorKind::None),
            "gzip" => Ok(CompressorKind::Gzip),
            "zlib" | "deflate" => Ok(CompressorKind::Zlib),
            "zstd" => Ok(CompressorKind::Zstd),
            other => Err(CompressionError::UnknownKind(other.to_string())),
        }
    }
}

/// Builds the compressor selected by `kind` at the given level.
pub fn new_compressor(
    kind: CompressorKind,
    level: i32,
) -> Result<Arc<dyn Compressor>, CompressionError> {
    Ok(match kind {
        CompressorKind::None => Arc::new(NoopCompressor),
        CompressorKind::Gzip => Arc::new(GzipCompressor::new(level)?),
        CompressorKind::Zlib => Arc::new(ZlibCompressor::new(level)?),
        CompressorKind::Zstd => Arc::new(ZstdCompressor::new(level)?),
    })
}

pub fn from_config(config: &SerializerConfig) -> Result<Arc<dyn Compressor>, CompressionError> {
    new_compressor(config.compressor_kind, config.compression_level)
}

// Same as zlib's compressBound(), which includes the 6 bytes of zlib framing.
fn deflate_bound(len: usize) -> usize {
    len + (len >> 12) + (len >> 14) + (len >> 25) + 13
}

fn deflate_level(kind: &'static str, level: i32) -> Result<Compression, CompressionError> {
    match u32::try_from(level) {
        Ok(level @ 0..=9) => Ok(Compression::new(level)),
        _ => Err(CompressionError::InvalidLevel { kind, level }),
    }
}

/// Pass-through compressor, for destinations that do not accept encoded bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompressor;

struct NoopEncoder<'a>(&'a mut Vec<u8>);

impl<'a> StreamEncoder<'a> for NoopEncoder<'a> {
    fn write(&mut self, data: &[u8]) -> Result<(), CompressionError> {
        self.0.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CompressionError> {
        Ok(())
    }

    fn compressed_len(&self) -> usize {
        self.0.len()
    }

    fn finish(self: Box<Self>) -> Result<&'a mut Vec<u8>, CompressionError> {
        Ok(self.0)
    }
}

impl Compressor for NoopCompressor {
    fn compress(&self, src: &[u8]) -> Result<Vec<u8>, CompressionError> {
        Ok(src.to_vec())
    }

    fn content_encoding(&self) -> &'static str {
        "identity"
    }

    fn compress_bound(&self, len: usize) -> usize {
        len
    }

    fn stream_encoder<'a>(
        &self,
        output: &'a mut Vec<u8>,
    ) -> Result<Box<dyn StreamEncoder<'a> + 'a>, CompressionError> {
        Ok(Box::new(NoopEncoder(output)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
}

impl GzipCompressor {
    pub fn new(level: i32) -> Result<Self, CompressionError> {
        Ok(Self {
            level: deflate_level("gzip", level)?,
        })
    }
}

impl<'a> StreamEncoder<'a> for GzEncoder<&'a mut Vec<u8>> {
    fn write(&mut self, data: &[u8]) -> Result<(), CompressionError> {
        Ok(self.write_all(data)?)
    }

    fn flush(&mut self) -> Result<(), CompressionError> {
        Ok(Write::flush(self)?)
    }

    fn compressed_len(&self) -> usize {
        self.get_ref().len()
    }

    fn finish(self: Box<Self>) -> Result<&'a mut Vec<u8>, CompressionError> {
        Ok(GzEncoder::finish(*self)?)
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, src: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(src.len() / 2), self.level);
        encoder.write_all(src)?;
        Ok(encoder.finish()?)
    }

    fn content_encoding(&self) -> &'static str {
        "gzip"
    }

    fn compress_bound(&self, len: usize) -> usize {
        // gzip framing is 18 bytes where zlib's is 6
        deflate_bound(len) + 12
    }

    fn stream_encoder<'a>(
        &self,
        output: &'a mut Vec<u8>,
    ) -> Result<Box<dyn StreamEncoder<'a> + 'a>, CompressionError> {
        Ok(Box::new(GzEncoder::new(output, self.level)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ZlibCompressor {
    level: Compression,
}

impl ZlibCompressor {
    pub fn new(level: i32) -> Result<Self, CompressionError> {
        Ok(Self {
            level: deflate_level("zlib", level)?,
        })
    }
}

impl<'a> StreamEncoder<'a> for ZlibEncoder<&'a mut Vec<u8>> {
    fn write(&mut self, data: &[u8]) -> Result<(), CompressionError> {
        Ok(self.write_all(data)?)
    }

    fn flush(&mut self) -> Result<(), CompressionError> {
        Ok(Write::flush(self)?)
    }

    fn compressed_len(&self) -> usize {
        self.get_ref().len()
    }

    fn finish(self: Box<Self>) -> Result<&'a mut Vec<u8>, CompressionError> {
        Ok(ZlibEncoder::finish(*self)?)
    }
}

impl Compressor for ZlibCompressor {
    fn compress(&self, src: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(src.len() / 2), self.level);
        encoder.write_all(src)?;
        Ok(encoder.finish()?)
    }

    fn content_encoding(&self) -> &'static str {
        "deflate"
    }

    fn compress_bound(&self, len: usize) -> usize {
        deflate_bound(len)
    }

    fn stream_encoder<'a>(
        &self,
        output: &'a mut Vec<u8>,
    ) -> Result<Box<dyn StreamEncoder<'a> + 'a>, CompressionError> {
        Ok(Box::new(ZlibEncoder::new(output, self.level)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    pub fn new(level: i32) -> Result<Self, CompressionError> {
        if !zstd::compression_level_range().contains(&level) {
            return Err(CompressionError::InvalidLevel {
                kind: "zstd",
                level,
            });
        }
        Ok(Self { level })
    }
}

impl<'a> StreamEncoder<'a> for zstd::stream::write::Encoder<'static, &'a mut Vec<u8>> {
    fn write(&mut self, data: &[u8]) -> Result<(), CompressionError> {
        Ok(self.write_all(data)?)
    }

    fn flush(&mut self) -> Result<(), CompressionError> {
        Ok(Write::flush(self)?)
    }

    fn compressed_len(&self) -> usize {
        self.get_ref().len()
    }

    fn finish(self: Box<Self>) -> Result<&'a mut Vec<u8>, CompressionError> {
        Ok(zstd::stream::write::Encoder::finish(*self)?)
    }
}

impl Compressor for ZstdCompressor {
    fn compress(&self, src: &[u8]) -> Result<Vec<u8>, CompressionError> {
        Ok(zstd::bulk::compress(src, self.level)?)
    }

    fn content_encoding(&self) -> &'static str {
        "zstd"
    }

    fn compress_bound(&self, len: usize) -> usize {
        // frame epilogue: last block header and optional checksum
        zstd::zstd_safe::compress_bound(len) + 7
    }

    fn stream_encoder<'a>(
        &self,
        output: &'a mut Vec<u8>,
    ) -> Result<Box<dyn StreamEncoder<'a> + 'a>, CompressionError> {
        Ok(Box::new(zstd::stream::write::Encoder::new(
            output, self.level,
        )?))
    }
}
