// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;

/// Failures raised by a [`crate::compression::Compressor`].
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("compression I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid {kind} compression level {level}")]
    InvalidLevel { kind: &'static str, level: i32 },
    #[error("unknown compressor kind: {0}")]
    UnknownKind(String),
}

/// Failures raised while rendering an item, header or footer into bytes.
#[derive(Debug, thiserror::Error)]
pub enum MarshalError {
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Custom(String),
}

/// Outcome of [`crate::stream_compressor::StreamCompressor::add_item`] when the
/// item was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum AddItemError {
    /// The item would exceed a ceiling of the current payload but fits a new one.
    #[error("payload is full")]
    PayloadFull,
    /// The item cannot fit any payload.
    #[error("item is too big to fit in a payload")]
    ItemTooBig,
    #[error(transparent)]
    Compression(#[from] CompressionError),
}

/// Failures opening a new compressed payload.
#[derive(Debug, thiserror::Error)]
pub enum CompressorInitError {
    #[error(
        "payload limits too small for framing: {framing_len} framing bytes, \
         max payload size {max_payload_size}, max uncompressed size {max_uncompressed_size}"
    )]
    LimitsTooSmall {
        framing_len: usize,
        max_payload_size: usize,
        max_uncompressed_size: usize,
    },
    #[error("failed to initialize stream compressor: {0}")]
    Compression(#[from] CompressionError),
}

/// Call-level failures of [`crate::payload_builder::PayloadBuilder::build`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("item is too big to fit in a payload")]
    ItemTooBig,
    #[error(transparent)]
    CompressorInit(#[from] CompressorInitError),
    #[error("failed to write stream header: {0}")]
    Header(#[source] MarshalError),
    #[error("failed to write stream footer: {0}")]
    Footer(#[source] MarshalError),
    #[error("failed to finalize payload: {0}")]
    Compression(#[from] CompressionError),
}

/// Failures of the stream strategy worker and its lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("encoding failed: {0}")]
    Compression(#[from] CompressionError),
    #[error("output queue closed")]
    OutputClosed,
    #[error("stream strategy already started")]
    AlreadyStarted,
    #[error("stream strategy not running")]
    NotRunning,
    #[error("stream worker panicked: {0}")]
    WorkerPanicked(String),
    #[error("no tokio runtime to run the stream worker on")]
    NoRuntime,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
