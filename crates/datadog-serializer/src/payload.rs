// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::message::MessageMetadata;

/// A compressed, size-bounded unit ready to be handed to a forwarder.
#[derive(Debug, Clone)]
pub struct Payload {
    metadata: Vec<MessageMetadata>,
    encoded: Vec<u8>,
    encoding: &'static str,
    point_count: usize,
    unencoded_size: usize,
}

impl Payload {
    #[must_use]
    pub fn new(
        metadata: Vec<MessageMetadata>,
        encoded: Vec<u8>,
        encoding: &'static str,
        point_count: usize,
        unencoded_size: usize,
    ) -> Self {
        Self {
            metadata,
            encoded,
            encoding,
            point_count,
            unencoded_size,
        }
    }

    /// Compressed bytes.
    #[must_use]
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    /// Metadata of the items folded into this payload, in insertion order.
    #[must_use]
    pub fn metadata(&self) -> &[MessageMetadata] {
        &self.metadata
    }

    /// Value for the `Content-Encoding` header.
    #[must_use]
    pub fn encoding(&self) -> &'static str {
        self.encoding
    }

    /// Number of points (metrics) or rows (logs) represented.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Size of the payload before compression, framing included.
    #[must_use]
    pub fn unencoded_size(&self) -> usize {
        self.unencoded_size
    }

    /// Number of items folded into this payload.
    #[must_use]
    pub fn count(&self) -> usize {
        self.metadata.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.encoded.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }

    #[must_use]
    pub fn into_encoded(self) -> Vec<u8> {
        self.encoded
    }
}
