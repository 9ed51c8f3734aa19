// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One payload per message, for destinations that stream their output (TCP) instead of
//! batching messages together.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Instrument};

use crate::compression::{self, Compressor};
use crate::config::SerializerConfig;
use crate::errors::StreamError;
use crate::message::Message;
use crate::payload::Payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StrategyState {
    Idle,
    Running,
    /// Input closed, the worker is flushing what was already queued.
    Draining,
    Stopped,
}

impl StrategyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StrategyState::Idle,
            1 => StrategyState::Running,
            2 => StrategyState::Draining,
            _ => StrategyState::Stopped,
        }
    }
}

/// Emits one payload per message received on its input queue.
///
/// All methods take `&self`, so the strategy can be shared (for example in an [`Arc`]) between
/// the task stopping it and the ones watching its state.
pub struct StreamStrategy {
    input: Mutex<Option<mpsc::Receiver<Message>>>,
    output: mpsc::Sender<Payload>,
    compressor: Arc<dyn Compressor>,
    cancel_token: CancellationToken,
    worker: Mutex<Option<JoinHandle<Result<(), StreamError>>>>,
    state: AtomicU8,
}

impl StreamStrategy {
    #[must_use]
    pub fn new(
        input: mpsc::Receiver<Message>,
        output: mpsc::Sender<Payload>,
        compressor: Arc<dyn Compressor>,
    ) -> Self {
        Self {
            input: Mutex::new(Some(input)),
            output,
            compressor,
            cancel_token: CancellationToken::new(),
            worker: Mutex::new(None),
            state: AtomicU8::new(StrategyState::Idle as u8),
        }
    }

    /// Creates a strategy with bounded queues of `stream_queue_size` messages and payloads, and
    /// the configured compressor. Returns the producer side of the input queue and the consumer
    /// side of the output queue.
    pub fn from_config(
        config: &SerializerConfig,
    ) -> Result<(Self, mpsc::Sender<Message>, mpsc::Receiver<Payload>), StreamError> {
        // a zero capacity would make the channel constructor panic
        config.validate()?;
        let compressor = compression::from_config(config)?;
        let (input_tx, input_rx) = mpsc::channel(config.stream_queue_size);
        let (output_tx, output_rx) = mpsc::channel(config.stream_queue_size);
        Ok((Self::new(input_rx, output_tx, compressor), input_tx, output_rx))
    }

    #[must_use]
    pub fn state(&self) -> StrategyState {
        StrategyState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: StrategyState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Whether the worker exited, either because it was stopped, because every producer went
    /// away, or because it hit an encoding failure.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(JoinHandle::is_finished)
    }

    /// Spawns the worker on the current tokio runtime.
    pub fn start(&self) -> Result<(), StreamError> {
        let runtime = Handle::try_current().map_err(|_| StreamError::NoRuntime)?;
        let Some(input) = self
            .input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Err(StreamError::AlreadyStarted);
        };

        let worker = StreamWorker {
            input,
            output: self.output.clone(),
            compressor: Arc::clone(&self.compressor),
            cancel_token: self.cancel_token.clone(),
        };
        let handle = runtime.spawn(worker.run().in_current_span());
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        self.set_state(StrategyState::Running);
        Ok(())
    }

    /// Closes the input queue and waits for the worker to send everything already queued.
    ///
    /// Returns the reason the worker exited early, if it did.
    pub async fn stop(&self) -> Result<(), StreamError> {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return Err(StreamError::NotRunning);
        };

        self.set_state(StrategyState::Draining);
        self.cancel_token.cancel();
        let result = match worker.await {
            Ok(result) => result,
            Err(e) => Err(StreamError::WorkerPanicked(e.to_string())),
        };
        self.set_state(StrategyState::Stopped);
        result
    }
}

struct StreamWorker {
    input: mpsc::Receiver<Message>,
    output: mpsc::Sender<Payload>,
    compressor: Arc<dyn Compressor>,
    cancel_token: CancellationToken,
}

impl StreamWorker {
    async fn run(mut self) -> Result<(), StreamError> {
        debug!("Stream strategy started");
        let mut input_closed = false;

        loop {
            let msg = tokio::select! {
                biased;
                () = self.cancel_token.cancelled(), if !input_closed => {
                    // producers can no longer send, buffered messages are still received
                    self.input.close();
                    input_closed = true;
                    continue;
                }
                msg = self.input.recv() => msg,
            };

            let Some(msg) = msg else {
                break;
            };

            if let Err(e) = self.send(msg).await {
                // queued messages are abandoned, the destination cannot skip a frame
                match &e {
                    StreamError::Compression(_) => {
                        warn!("Encoding failed - dropping payload: {}", e);
                    }
                    _ => error!("Stream strategy stopping: {}", e),
                }
                return Err(e);
            }
        }

        debug!("Stream strategy stopped");
        Ok(())
    }

    async fn send(&self, msg: Message) -> Result<(), StreamError> {
        if let Some(origin) = &msg.metadata.origin {
            origin.log_source.latency_stats.add(msg.latency());
        }

        let encoded = self.compressor.compress(msg.content())?;
        let unencoded_size = msg.content().len();

        // keep the metadata only, the content is no longer needed
        let metadata = msg.into_metadata();
        let payload = Payload::new(
            vec![metadata],
            encoded,
            self.compressor.content_encoding(),
            1,
            unencoded_size,
        );

        self.output
            .send(payload)
            .await
            .map_err(|_| StreamError::OutputClosed)
    }
}
