// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::sync::{Arc, PoisonError, RwLock};

use crate::compression::CompressorKind;
use crate::errors::ConfigError;

/// Compressed payload ceiling accepted by the intake, in bytes.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 2_621_440;
/// Uncompressed payload ceiling accepted by the intake, in bytes.
pub const DEFAULT_MAX_UNCOMPRESSED_PAYLOAD_SIZE: usize = 4_194_304;
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 1;
pub const DEFAULT_STREAM_QUEUE_SIZE: usize = 100;

/// Configuration for payload serialization
#[derive(Debug, Clone, PartialEq)]
pub struct SerializerConfig {
    /// Maximum compressed size of a single payload
    pub max_payload_size: usize,
    /// Maximum uncompressed size of a single payload
    pub max_uncompressed_payload_size: usize,
    /// Algorithm used to encode payloads
    pub compressor_kind: CompressorKind,
    /// Level passed to the compression algorithm
    pub compression_level: i32,
    /// Whether payload builders reuse a single pair of buffers behind a lock
    pub share_buffers: bool,
    /// Capacity of the stream strategy input and output queues
    pub stream_queue_size: usize,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_uncompressed_payload_size: DEFAULT_MAX_UNCOMPRESSED_PAYLOAD_SIZE,
            compressor_kind: CompressorKind::Zstd,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            share_buffers: false,
            stream_queue_size: DEFAULT_STREAM_QUEUE_SIZE,
        }
    }
}

impl SerializerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_payload_size = env::var("DD_SERIALIZER_MAX_PAYLOAD_SIZE")
            .ok()
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_PAYLOAD_SIZE);
        let max_uncompressed_payload_size = env::var("DD_SERIALIZER_MAX_UNCOMPRESSED_PAYLOAD_SIZE")
            .ok()
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_UNCOMPRESSED_PAYLOAD_SIZE);
        let compressor_kind = match env::var("DD_SERIALIZER_COMPRESSOR_KIND") {
            Ok(val) => val
                .parse::<CompressorKind>()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            Err(_) => CompressorKind::Zstd,
        };
        let compression_level = env::var("DD_SERIALIZER_COMPRESSION_LEVEL")
            .ok()
            .and_then(|val| val.trim().parse::<i32>().ok())
            .unwrap_or(DEFAULT_COMPRESSION_LEVEL);
        let share_buffers = env::var("DD_SERIALIZER_SHARE_BUFFERS")
            .map(|val| val.to_lowercase() == "true")
            .unwrap_or(false);
        let stream_queue_size = env::var("DD_LOGS_STREAM_QUEUE_SIZE")
            .ok()
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_STREAM_QUEUE_SIZE);

        let config = Self {
            max_payload_size,
            max_uncompressed_payload_size,
            compressor_kind,
            compression_level,
            share_buffers,
            stream_queue_size,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payload_size == 0 {
            return Err(ConfigError::Invalid(
                "max payload size must be greater than 0".to_string(),
            ));
        }

        if self.max_uncompressed_payload_size == 0 {
            return Err(ConfigError::Invalid(
                "max uncompressed payload size must be greater than 0".to_string(),
            ));
        }

        // tokio channels panic on a zero capacity
        if self.stream_queue_size == 0 {
            return Err(ConfigError::Invalid(
                "stream queue size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn limits(&self) -> PayloadLimits {
        PayloadLimits {
            max_payload_size: self.max_payload_size,
            max_uncompressed_size: self.max_uncompressed_payload_size,
        }
    }
}

/// The two ceilings every payload must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimits {
    pub max_payload_size: usize,
    pub max_uncompressed_size: usize,
}

/// Configuration shared with long-lived components, which read it again on every use.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig(Arc<RwLock<SerializerConfig>>);

impl SharedConfig {
    #[must_use]
    pub fn new(config: SerializerConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    /// Returns a copy of the current configuration.
    #[must_use]
    pub fn get(&self) -> SerializerConfig {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn limits(&self) -> PayloadLimits {
        self.0.read().unwrap_or_else(PoisonError::into_inner).limits()
    }

    /// Replaces the configuration if the new one is valid.
    pub fn update(&self, config: SerializerConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }
}

impl From<SerializerConfig> for SharedConfig {
    fn from(config: SerializerConfig) -> Self {
        Self::new(config)
    }
}
