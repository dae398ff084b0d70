//! Replay device: a [`FifoBridge`] fed from byte chunks in memory.
//!
//! Two uses: replaying a raw acquisition log offline, and standing in for
//! the hardware in demos and tests. In streaming mode the reader wakes on a
//! latency-timer cadence and delivers empty chunks while idle, so a cancel
//! request is observed even when no data flows, just like the real bridge.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::device::{
    BridgeConfig, DeviceError, FifoBridge, StreamControl, LATENCY_TIMER_MS, READ_CHUNK_SIZE,
};

struct Inbound {
    chunks: VecDeque<Vec<u8>>,
    /// No further chunks will arrive; `read_stream` drains and returns.
    finished: bool,
}

/// In-memory stand-in for the USB FIFO bridge.
pub struct ReplayBridge {
    inbound: Mutex<Inbound>,
    available: Condvar,
    outbound: Mutex<Vec<u8>>,
    /// Idle wake-up period for the streaming reader.
    poll_interval: Duration,
}

impl ReplayBridge {
    /// Empty bridge in streaming mode: push data with
    /// [`push_chunk`](Self::push_chunk) and end the stream with
    /// [`close_stream`](Self::close_stream).
    pub fn new() -> Self {
        Self {
            inbound: Mutex::new(Inbound {
                chunks: VecDeque::new(),
                finished: false,
            }),
            available: Condvar::new(),
            outbound: Mutex::new(Vec::new()),
            poll_interval: Duration::from_millis(LATENCY_TIMER_MS as u64),
        }
    }

    /// Preloaded bridge replaying `data` split into `chunk_size`-byte
    /// chunks; the stream ends after the last chunk.
    pub fn from_bytes(data: &[u8], chunk_size: usize) -> Self {
        let bridge = Self::new();
        {
            let mut inbound = bridge.inbound.lock();
            for chunk in data.chunks(chunk_size.max(1)) {
                inbound.chunks.push_back(chunk.to_vec());
            }
            inbound.finished = true;
        }
        bridge
    }

    /// Preloaded bridge replaying a raw acquisition log, chunked at the
    /// transport read size.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        Ok(Self::from_bytes(&fs::read(path)?, READ_CHUNK_SIZE))
    }

    /// Queue one inbound chunk for the streaming reader.
    pub fn push_chunk(&self, chunk: impl Into<Vec<u8>>) {
        let mut inbound = self.inbound.lock();
        inbound.chunks.push_back(chunk.into());
        self.available.notify_one();
    }

    /// Mark the end of the inbound stream; the reader returns once the
    /// queued chunks are drained.
    pub fn close_stream(&self) {
        self.inbound.lock().finished = true;
        self.available.notify_one();
    }

    /// Bytes written to the outbound endpoint so far.
    pub fn outbound(&self) -> Vec<u8> {
        self.outbound.lock().clone()
    }
}

impl Default for ReplayBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl FifoBridge for ReplayBridge {
    fn configure(&self, _config: &BridgeConfig) -> Result<(), DeviceError> {
        Ok(())
    }

    // Replay data is the payload, not stale transport residue; purging at
    // open must not erase it.
    fn purge(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn read_stream(
        &self,
        sink: &mut dyn FnMut(&[u8]) -> StreamControl,
    ) -> Result<(), DeviceError> {
        loop {
            let chunk = {
                let mut inbound = self.inbound.lock();
                loop {
                    if let Some(chunk) = inbound.chunks.pop_front() {
                        break Some(chunk);
                    }
                    if inbound.finished {
                        break None;
                    }
                    // Latency-timer cadence: deliver an empty chunk so the
                    // sink can observe cancellation while idle.
                    if self
                        .available
                        .wait_for(&mut inbound, self.poll_interval)
                        .timed_out()
                    {
                        break Some(Vec::new());
                    }
                }
            };
            match chunk {
                Some(chunk) => {
                    if sink(&chunk) == StreamControl::Stop {
                        return Ok(());
                    }
                }
                None => return Ok(()),
            }
        }
    }

    fn write(&self, bytes: &[u8]) -> Result<usize, DeviceError> {
        self.outbound.lock().extend_from_slice(bytes);
        Ok(bytes.len())
    }
}
