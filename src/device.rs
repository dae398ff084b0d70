//! Transport seam for the USB FIFO bridge carrying the radar bitstream.
//!
//! The bridge driver itself lives outside this crate. Acquisition only needs
//! a blocking streaming read that hands back arbitrary-sized chunks, plus an
//! outbound endpoint for configuration writes; hardware integrations
//! implement [`FifoBridge`], and [`crate::replay::ReplayBridge`] implements
//! it for offline replay and tests.

use thiserror::Error;

/// Inbound transfer chunk size, matching the FT2232H configuration used by
/// the radar hardware.
pub const READ_CHUNK_SIZE: usize = 0x10000;
/// Outbound transfer chunk size.
pub const WRITE_CHUNK_SIZE: usize = 0x10000;
/// Latency timer bound on chunk delivery, in milliseconds.
pub const LATENCY_TIMER_MS: u8 = 2;

/// Errors surfaced by a bridge implementation.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to open device: {0}")]
    Open(String),

    #[error("failed to configure device: {0}")]
    Configure(String),

    #[error("stream read failed: {0}")]
    Read(String),

    #[error("device write failed: {0}")]
    Write(String),
}

/// Transport tunables applied when the device is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Latency timer in milliseconds; bounds how long the device may sit on
    /// buffered data before delivering a chunk.
    pub latency_timer_ms: u8,
    /// Inbound transfer chunk size in bytes.
    pub read_chunk_size: usize,
    /// Outbound transfer chunk size in bytes.
    pub write_chunk_size: usize,
    /// Enable RTS/CTS hardware flow control.
    pub rts_cts_flow_control: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            latency_timer_ms: LATENCY_TIMER_MS,
            read_chunk_size: READ_CHUNK_SIZE,
            write_chunk_size: WRITE_CHUNK_SIZE,
            rts_cts_flow_control: true,
        }
    }
}

/// Continuation decision returned by the stream sink for each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    /// Keep streaming.
    Continue,
    /// Stop streaming and return from `read_stream`.
    Stop,
}

/// Blocking byte-stream interface to the radar's FIFO bridge.
///
/// One handle serves both directions: the producer thread blocks inside
/// [`read_stream`](FifoBridge::read_stream) while the control thread issues
/// occasional writes. The underlying transport is assumed to tolerate
/// concurrent transfers on distinct endpoints, so implementations carry
/// their own interior synchronization.
pub trait FifoBridge: Send + Sync {
    /// Apply the transport configuration: synchronous FIFO posture, flow
    /// control, latency timer, and transfer sizes.
    fn configure(&self, config: &BridgeConfig) -> Result<(), DeviceError>;

    /// Discard any data pending in the transport buffers.
    fn purge(&self) -> Result<(), DeviceError>;

    /// Stream inbound data, invoking `sink` for each received chunk until
    /// the stream ends or `sink` returns [`StreamControl::Stop`]. Chunks may
    /// be empty when the latency timer fires with nothing buffered; sinks
    /// use those to observe cancellation while the stream is idle.
    fn read_stream(
        &self,
        sink: &mut dyn FnMut(&[u8]) -> StreamControl,
    ) -> Result<(), DeviceError>;

    /// Write `bytes` to the outbound endpoint, returning how many were
    /// accepted.
    fn write(&self, bytes: &[u8]) -> Result<usize, DeviceError>;
}
