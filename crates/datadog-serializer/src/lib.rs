// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Payload serialization for Datadog intake endpoints.
//!
//! Two ways of turning data into compressed payloads:
//! - [`PayloadBuilder`] packs a sequence of items into as few payloads as possible, each one
//!   under a compressed and an uncompressed size ceiling.
//! - [`StreamStrategy`] emits one compressed payload per log message, for destinations that
//!   stream their output.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod compression;
pub mod config;
pub mod errors;
pub mod marshaler;
pub mod message;
pub mod payload;
pub mod payload_builder;
pub mod stats;
pub mod stream_compressor;
pub mod stream_strategy;

pub use compression::{new_compressor, Compressor, CompressorKind, StreamEncoder};
pub use config::{PayloadLimits, SerializerConfig, SharedConfig};
pub use errors::{BuildError, CompressionError, MarshalError, StreamError};
pub use marshaler::{ItemSource, JsonArraySource, JsonStreamItem};
pub use message::{LogSource, Message, MessageMetadata, Origin};
pub use payload::Payload;
pub use payload_builder::{ItemTooBigPolicy, PayloadBuilder};
pub use stats::StatsSnapshot;
pub use stream_strategy::{StrategyState, StreamStrategy};
