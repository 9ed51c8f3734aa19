// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One compressed payload under construction.
//!
//! Items are appended to an uncompressed input buffer. The input buffer is fed to the encoder and
//! flushed only when an item does not obviously fit, so most items cost a copy and two additions.
//! After a flush the compressed length is exact, and the remaining budget is checked against the
//! worst-case bound of what is still pending.

use crate::compression::{Compressor, StreamEncoder};
use crate::config::PayloadLimits;
use crate::errors::{AddItemError, CompressionError, CompressorInitError};

/// Working buffers borrowed by a [`StreamCompressor`] for the lifetime of one payload.
#[derive(Debug, Default)]
pub struct SessionBuffers {
    pub input: Vec<u8>,
    pub output: Vec<u8>,
}

impl SessionBuffers {
    #[must_use]
    pub fn with_capacity(input: usize, output: usize) -> Self {
        Self {
            input: Vec::with_capacity(input),
            output: Vec::with_capacity(output),
        }
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.output.clear();
    }
}

/// A closed payload.
#[derive(Debug)]
pub struct ClosedPayload {
    pub encoded: Vec<u8>,
    pub unencoded_size: usize,
    pub item_count: usize,
}

pub struct StreamCompressor<'a> {
    compressor: &'a dyn Compressor,
    encoder: Box<dyn StreamEncoder<'a> + 'a>,
    input: &'a mut Vec<u8>,
    header_len: usize,
    footer: &'a [u8],
    separator: &'a [u8],
    limits: PayloadLimits,
    // header, items and separators accepted so far, flushed or not
    uncompressed_len: usize,
    item_count: usize,
}

impl<'a> StreamCompressor<'a> {
    /// Opens a payload framed by `header` and `footer`.
    ///
    /// Both buffers are cleared. Fails if an empty payload would already exceed one of the limits.
    pub fn new(
        buffers: &'a mut SessionBuffers,
        limits: PayloadLimits,
        header: &[u8],
        footer: &'a [u8],
        separator: &'a [u8],
        compressor: &'a dyn Compressor,
    ) -> Result<Self, CompressorInitError> {
        let framing_len = header.len() + footer.len();
        if framing_len > limits.max_uncompressed_size
            || compressor.compress_bound(header.len()) + compressor.compress_bound(footer.len())
                > limits.max_payload_size
        {
            return Err(CompressorInitError::LimitsTooSmall {
                framing_len,
                max_payload_size: limits.max_payload_size,
                max_uncompressed_size: limits.max_uncompressed_size,
            });
        }

        let SessionBuffers { input, output } = buffers;
        input.clear();
        output.clear();
        input.extend_from_slice(header);
        let encoder = compressor.stream_encoder(output)?;

        Ok(Self {
            compressor,
            encoder,
            input,
            header_len: header.len(),
            footer,
            separator,
            limits,
            uncompressed_len: header.len(),
            item_count: 0,
        })
    }

    /// Number of items added so far.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    fn separator_len(&self) -> usize {
        if self.item_count > 0 {
            self.separator.len()
        } else {
            0
        }
    }

    fn fits_empty_payload(&self, item_len: usize) -> bool {
        self.header_len + item_len + self.footer.len() <= self.limits.max_uncompressed_size
            && self.compressor.compress_bound(self.header_len + item_len)
                + self.compressor.compress_bound(self.footer.len())
                <= self.limits.max_payload_size
    }

    fn has_room_for(&self, item_len: usize) -> bool {
        let added = self.separator_len() + item_len;
        self.uncompressed_len + added + self.footer.len() <= self.limits.max_uncompressed_size
            && self.encoder.compressed_len()
                + self.compressor.compress_bound(self.input.len() + added)
                + self.compressor.compress_bound(self.footer.len())
                <= self.limits.max_payload_size
    }

    fn pack(&mut self) -> Result<(), CompressionError> {
        if !self.input.is_empty() {
            self.encoder.write(self.input.as_slice())?;
            self.input.clear();
        }
        self.encoder.flush()
    }

    /// Appends `item`, preceded by the separator unless it is the first one.
    ///
    /// The item is copied, so the caller may reuse its buffer. On `PayloadFull` the payload is
    /// left unchanged and the same item can be retried on a new payload.
    pub fn add_item(&mut self, item: &[u8]) -> Result<(), AddItemError> {
        if !self.fits_empty_payload(item.len()) {
            return Err(AddItemError::ItemTooBig);
        }

        if !self.has_room_for(item.len()) {
            self.pack()?;
            if !self.has_room_for(item.len()) {
                // an empty payload that cannot take the item never will
                if self.item_count == 0 {
                    return Err(AddItemError::ItemTooBig);
                }
                return Err(AddItemError::PayloadFull);
            }
        }

        if self.item_count > 0 {
            self.input.extend_from_slice(self.separator);
            self.uncompressed_len += self.separator.len();
        }
        self.input.extend_from_slice(item);
        self.uncompressed_len += item.len();
        self.item_count += 1;
        Ok(())
    }

    /// Writes the footer and terminates the compressed stream. The buffers are released for the
    /// next payload, dropping the session instead abandons the payload.
    pub fn close(mut self) -> Result<ClosedPayload, CompressionError> {
        if !self.input.is_empty() {
            self.encoder.write(self.input.as_slice())?;
            self.input.clear();
        }
        self.encoder.write(self.footer)?;
        let output = self.encoder.finish()?;

        Ok(ClosedPayload {
            encoded: output.as_slice().to_vec(),
            unencoded_size: self.uncompressed_len + self.footer.len(),
            item_count: self.item_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{
        new_compressor, CompressorKind, GzipCompressor, NoopCompressor, ZstdCompressor,
    };
    use std::io::Read;

    fn limits(max_payload_size: usize, max_uncompressed_size: usize) -> PayloadLimits {
        PayloadLimits {
            max_payload_size,
            max_uncompressed_size,
        }
    }

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(data)
            .read_to_end(&mut out)
            .expect("gzip decode");
        out
    }

    #[test]
    fn test_identity_payload_content() {
        let compressor = NoopCompressor;
        let mut buffers = SessionBuffers::default();
        let mut session = StreamCompressor::new(
            &mut buffers,
            limits(100, 100),
            b"[",
            b"]",
            b",",
            &compressor,
        )
        .expect("session");

        session.add_item(b"{\"a\":1}").unwrap();
        session.add_item(b"{\"b\":2}").unwrap();
        assert_eq!(session.item_count(), 2);

        let closed = session.close().expect("close");
        assert_eq!(closed.encoded, b"[{\"a\":1},{\"b\":2}]");
        assert_eq!(closed.unencoded_size, closed.encoded.len());
        assert_eq!(closed.item_count, 2);
        assert_eq!(buffers.output, closed.encoded);
    }

    #[test]
    fn test_payload_full_on_uncompressed_limit() {
        let compressor = NoopCompressor;
        let mut buffers = SessionBuffers::default();
        let mut session = StreamCompressor::new(
            &mut buffers,
            limits(100, 10),
            b"",
            b"",
            b",",
            &compressor,
        )
        .unwrap();

        session.add_item(b"1234").unwrap();
        session.add_item(b"5678").unwrap();
        assert!(matches!(
            session.add_item(b"9abc"),
            Err(AddItemError::PayloadFull)
        ));

        let closed = session.close().unwrap();
        assert_eq!(closed.encoded, b"1234,5678");
    }

    #[test]
    fn test_item_too_big() {
        let compressor = NoopCompressor;
        let mut buffers = SessionBuffers::default();
        let mut session = StreamCompressor::new(
            &mut buffers,
            limits(100, 10),
            b"[",
            b"]",
            b",",
            &compressor,
        )
        .unwrap();

        assert!(matches!(
            session.add_item(b"123456789"),
            Err(AddItemError::ItemTooBig)
        ));
        session.add_item(b"12345678").unwrap();
    }

    #[test]
    fn test_item_too_big_on_compressed_limit() {
        let compressor = GzipCompressor::new(6).unwrap();
        let mut buffers = SessionBuffers::default();
        let mut session = StreamCompressor::new(
            &mut buffers,
            limits(80, 1_000),
            b"",
            b"",
            b",",
            &compressor,
        )
        .unwrap();

        assert!(matches!(
            session.add_item(&[b'x'; 100]),
            Err(AddItemError::ItemTooBig)
        ));
    }

    #[test]
    fn test_limits_too_small_for_framing() {
        let compressor = NoopCompressor;
        let mut buffers = SessionBuffers::default();
        let result = StreamCompressor::new(
            &mut buffers,
            limits(100, 3),
            b"{\"series\":[",
            b"]}",
            b",",
            &compressor,
        );
        assert!(matches!(
            result,
            Err(CompressorInitError::LimitsTooSmall {
                framing_len: 13,
                ..
            })
        ));
    }

    #[test]
    fn test_compressed_payload_respects_limit() {
        let compressor = GzipCompressor::new(6).unwrap();
        let max_payload_size = 200;
        let mut buffers = SessionBuffers::default();
        let mut session = StreamCompressor::new(
            &mut buffers,
            limits(max_payload_size, 100_000),
            b"[",
            b"]",
            b",",
            &compressor,
        )
        .unwrap();

        let mut expected = b"[".to_vec();
        let mut added = 0;
        loop {
            let item = format!("{{\"metric\":\"m{added}\",\"value\":{}}}", added * 7919);
            match session.add_item(item.as_bytes()) {
                Ok(()) => {
                    if added > 0 {
                        expected.push(b',');
                    }
                    expected.extend_from_slice(item.as_bytes());
                    added += 1;
                }
                Err(AddItemError::PayloadFull) => break,
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        expected.push(b']');

        let closed = session.close().unwrap();
        assert!(added > 1);
        assert!(closed.encoded.len() <= max_payload_size);
        assert_eq!(gunzip(&closed.encoded), expected);
        assert_eq!(closed.unencoded_size, expected.len());
    }

    #[test]
    fn test_empty_session_closes_with_framing() {
        let compressor = ZstdCompressor::new(1).unwrap();
        let mut buffers = SessionBuffers::default();
        let session = StreamCompressor::new(
            &mut buffers,
            limits(1_000, 1_000),
            b"[",
            b"]",
            b",",
            &compressor,
        )
        .unwrap();

        let closed = session.close().unwrap();
        assert_eq!(closed.item_count, 0);
        assert_eq!(zstd::decode_all(closed.encoded.as_slice()).unwrap(), b"[]");
    }

    #[test]
    fn test_buffers_are_reused() {
        let compressor = new_compressor(CompressorKind::Zlib, 6).unwrap();
        let mut buffers = SessionBuffers::with_capacity(4096, 4096);
        let mut session = StreamCompressor::new(
            &mut buffers,
            limits(10_000, 10_000),
            b"[",
            b"]",
            b",",
            compressor.as_ref(),
        )
        .unwrap();
        session.add_item(b"{}").unwrap();

        let closed = session.close().unwrap();
        assert!(buffers.input.capacity() >= 4096);
        assert!(buffers.output.capacity() >= 4096);
        // the payload owns its own copy, sized to the content
        assert!(closed.encoded.capacity() < 4096);
        assert_eq!(closed.encoded, buffers.output);
    }

    #[test]
    fn test_abandoned_session_keeps_buffers() {
        let compressor = GzipCompressor::new(6).unwrap();
        let mut buffers = SessionBuffers::with_capacity(4096, 4096);
        {
            let mut session = StreamCompressor::new(
                &mut buffers,
                limits(64, 64),
                b"[",
                b"]",
                b",",
                &compressor,
            )
            .unwrap();
            session.add_item(b"{\"a\":1}").unwrap();
            assert!(matches!(
                session.add_item(&[b'x'; 100]),
                Err(AddItemError::ItemTooBig)
            ));
        }
        assert!(buffers.input.capacity() >= 4096);
        assert!(buffers.output.capacity() >= 4096);

        let session = StreamCompressor::new(
            &mut buffers,
            limits(64, 64),
            b"[",
            b"]",
            b",",
            &compressor,
        )
        .unwrap();
        let closed = session.close().unwrap();
        assert_eq!(gunzip(&closed.encoded), b"[]");
    }
}
