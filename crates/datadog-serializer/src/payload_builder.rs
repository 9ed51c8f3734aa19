// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching payload builder.
//!
//! [`PayloadBuilder::build`] drains an [`ItemSource`] into as many compressed payloads as needed
//! for each of them to stay under both the compressed and the uncompressed size limits. Every
//! payload is framed by the source's header and footer, so each one is independently valid.
//!
//! # Item failures
//!
//! - An item that fails to render is skipped.
//! - An item that does not fit the current payload is retried, without rendering it again, on a
//!   new payload.
//! - An item that cannot fit any payload is dropped or fails the whole call, depending on the
//!   [`ItemTooBigPolicy`].
//!
//! # Buffers
//!
//! A builder either shares one pair of working buffers between calls, serializing callers on a
//! lock, or allocates fresh buffers on every call, sized after what the previous call needed.

use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, warn};

use crate::compression::{self, Compressor};
use crate::config::{PayloadLimits, SharedConfig};
use crate::errors::{AddItemError, BuildError, CompressionError};
use crate::marshaler::ItemSource;
use crate::message::MessageMetadata;
use crate::payload::Payload;
use crate::stats::{BuilderStats, StatsSnapshot};
use crate::stream_compressor::{ClosedPayload, SessionBuffers, StreamCompressor};

const DEFAULT_BUFFER_SIZE: usize = 4096;
const ITEM_BUFFER_SIZE: usize = 1024;

/// What to do with an item that cannot fit even an empty payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemTooBigPolicy {
    /// Skip the item and keep going.
    #[default]
    Drop,
    /// Abort the build and return [`BuildError::ItemTooBig`].
    Fail,
}

enum Buffers {
    Shared(Mutex<SessionBuffers>),
    Fresh {
        input_size_hint: AtomicUsize,
        output_size_hint: AtomicUsize,
    },
}

/// Builds size-bounded compressed payloads.
///
/// Memory is allocated based on what previous calls needed: use separate builders for sources
/// producing payloads of very different sizes.
pub struct PayloadBuilder {
    buffers: Buffers,
    config: SharedConfig,
    compressor: Arc<dyn Compressor>,
    stats: BuilderStats,
}

impl PayloadBuilder {
    #[must_use]
    pub fn new(
        share_and_lock_buffers: bool,
        config: SharedConfig,
        compressor: Arc<dyn Compressor>,
    ) -> Self {
        let buffers = if share_and_lock_buffers {
            Buffers::Shared(Mutex::new(SessionBuffers::with_capacity(
                DEFAULT_BUFFER_SIZE,
                DEFAULT_BUFFER_SIZE,
            )))
        } else {
            Buffers::Fresh {
                input_size_hint: AtomicUsize::new(DEFAULT_BUFFER_SIZE),
                output_size_hint: AtomicUsize::new(DEFAULT_BUFFER_SIZE),
            }
        };

        Self {
            buffers,
            config,
            compressor,
            stats: BuilderStats::default(),
        }
    }

    /// Creates a builder using the compressor and buffer mode selected by `config`.
    pub fn from_config(config: SharedConfig) -> Result<Self, CompressionError> {
        let current = config.get();
        let compressor = compression::from_config(&current)?;
        Ok(Self::new(current.share_buffers, config, compressor))
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    #[must_use]
    pub fn content_encoding(&self) -> &'static str {
        self.compressor.content_encoding()
    }

    /// Serializes every item of `source` into payloads, in order.
    ///
    /// Returns at least one payload, even when the source is empty or every item was dropped.
    /// On error no payload is returned.
    pub fn build<S: ItemSource + ?Sized>(
        &self,
        source: &mut S,
        policy: ItemTooBigPolicy,
    ) -> Result<Vec<Payload>, BuildError> {
        // the limits may change between calls
        let limits = self.config.limits();

        match &self.buffers {
            Buffers::Shared(shared) => {
                self.stats.lock_wait_started();
                let start = Instant::now();
                // buffers are cleared before use, a panic in a previous call leaves nothing behind
                let mut buffers = shared.lock().unwrap_or_else(PoisonError::into_inner);
                self.stats.lock_wait_finished(start.elapsed());

                buffers.clear();
                self.build_with(&mut buffers, limits, source, policy)
            }
            Buffers::Fresh {
                input_size_hint,
                output_size_hint,
            } => {
                let mut buffers = SessionBuffers::with_capacity(
                    input_size_hint.load(Ordering::Relaxed),
                    output_size_hint.load(Ordering::Relaxed),
                );
                let payloads = self.build_with(&mut buffers, limits, source, policy)?;
                input_size_hint.store(buffers.input.capacity(), Ordering::Relaxed);
                output_size_hint.store(buffers.output.capacity(), Ordering::Relaxed);
                Ok(payloads)
            }
        }
    }

    fn build_with<S: ItemSource + ?Sized>(
        &self,
        buffers: &mut SessionBuffers,
        limits: PayloadLimits,
        source: &mut S,
        policy: ItemTooBigPolicy,
    ) -> Result<Vec<Payload>, BuildError> {
        self.stats.call();
        let start = Instant::now();

        // rendered once, every payload repeats them
        let mut header = Vec::new();
        source.write_header(&mut header).map_err(BuildError::Header)?;
        let mut footer = Vec::new();
        source.write_footer(&mut footer).map_err(BuildError::Footer)?;
        let separator = source.separator().to_vec();

        let compressor = self.compressor.as_ref();
        // the session only borrows the buffers, an early return leaves them with the builder
        let mut session = StreamCompressor::new(
            &mut *buffers,
            limits,
            &header,
            &footer,
            &separator,
            compressor,
        )?;

        let mut payloads = Vec::new();
        let mut metadata: Vec<MessageMetadata> = Vec::new();
        let mut point_count = 0;
        // rendered bytes of the current item, kept across payload rotations
        let mut pending_item = Vec::with_capacity(ITEM_BUFFER_SIZE);

        let mut has_item = source.move_next();
        while has_item {
            pending_item.clear();
            if let Err(e) = source.write_current_item(&mut pending_item) {
                warn!("error marshalling an item, skipping: {}", e);
                self.stats.write_item_error();
                has_item = source.move_next();
                continue;
            }

            loop {
                match session.add_item(&pending_item) {
                    Ok(()) => {
                        point_count += source.current_item_point_count();
                        let mut meta = source.current_item_metadata();
                        meta.raw_data_len = pending_item.len();
                        metadata.push(meta);
                        self.stats.item();
                        break;
                    }
                    Err(AddItemError::PayloadFull) => {
                        self.stats.payload_full();
                        let closed = session.close()?;
                        debug!(
                            "Payload full after {} items ({} bytes), starting a new payload",
                            closed.item_count,
                            closed.encoded.len()
                        );
                        payloads.push(self.to_payload(
                            closed,
                            mem::take(&mut metadata),
                            point_count,
                        ));
                        point_count = 0;
                        session = StreamCompressor::new(
                            &mut *buffers,
                            limits,
                            &header,
                            &footer,
                            &separator,
                            compressor,
                        )?;
                    }
                    Err(AddItemError::ItemTooBig) if policy == ItemTooBigPolicy::Fail => {
                        return Err(BuildError::ItemTooBig);
                    }
                    Err(e) => {
                        warn!(
                            "Dropping an item, {}: {}",
                            source.describe_current_item(),
                            e
                        );
                        self.stats.item_drop();
                        break;
                    }
                }
            }

            has_item = source.move_next();
        }

        let closed = session.close()?;
        payloads.push(self.to_payload(closed, metadata, point_count));

        self.stats.serialization_time(start.elapsed());
        Ok(payloads)
    }

    fn to_payload(
        &self,
        closed: ClosedPayload,
        metadata: Vec<MessageMetadata>,
        point_count: usize,
    ) -> Payload {
        Payload::new(
            metadata,
            closed.encoded,
            self.compressor.content_encoding(),
            point_count,
            closed.unencoded_size,
        )
    }
}
