//! Resumable frame parser for the radar bitstream.
//!
//! The USB layer delivers arbitrary-sized byte chunks with no alignment to
//! sample, sweep, or flag boundaries. All framing state lives in the parser,
//! so a chunk may end mid-flag, mid-sample, or mid-byte and the next chunk
//! resumes seamlessly. The parser never fails: every input byte either
//! advances the current frame or restarts flag hunting.

use crate::protocol::{FrameFormat, Sample, START_FLAG, STOP_FLAG};
use crate::sweep::SweepSlot;

/// Parsing phase within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Hunting for a complete run of start flags.
    AwaitStart,
    /// Accumulating sample words.
    ReadSamples,
    /// Validating the trailing run of stop flags.
    AwaitStop,
}

/// Counters describing what the parser has seen so far.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaptureStats {
    /// Sweeps committed to the slot.
    pub sweeps_published: u64,
    /// Completed sweeps dropped because the consumer had not drained the
    /// slot yet.
    pub sweeps_dropped: u64,
    /// Sweeps discarded on an invalid stop sequence.
    pub frames_discarded: u64,
    /// Total bytes consumed into framing.
    pub bytes_consumed: u64,
}

/// Streaming state machine that recovers framed sweeps from raw chunks.
pub struct FrameParser {
    fmt: FrameFormat,
    phase: Phase,
    /// Consecutive start flags seen in the current run.
    start_run: usize,
    /// Consecutive stop flags seen in the current run.
    stop_run: usize,
    /// Samples decoded into the current sweep.
    sweep_idx: usize,
    /// Byte position within the sample being assembled.
    byte_idx: usize,
    /// Raw word being assembled, MSB first.
    accum: u64,
    /// Final sample of the sweep, held back until the stop run validates it.
    last_sample: Sample,
    /// Samples `0..sweep_len-1` of the sweep in progress.
    head: Vec<Sample>,
    stats: CaptureStats,
}

impl FrameParser {
    pub fn new(fmt: FrameFormat) -> Self {
        Self {
            fmt,
            phase: Phase::AwaitStart,
            start_run: 0,
            stop_run: 0,
            sweep_idx: 0,
            byte_idx: 0,
            accum: 0,
            last_sample: 0,
            head: vec![0; fmt.sweep_len() - 1],
            stats: CaptureStats::default(),
        }
    }

    pub fn format(&self) -> FrameFormat {
        self.fmt
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats.clone()
    }

    /// Advance the state machine over `chunk`, committing each sweep that
    /// completes with a valid stop run into `slot` (or dropping it when the
    /// slot is still occupied).
    ///
    /// Returns the number of bytes consumed into framing. Every byte either
    /// advances the frame or restarts flag hunting, so this is always the
    /// whole chunk; the raw log uses it as the prefix to persist.
    pub fn feed(&mut self, chunk: &[u8], slot: &mut SweepSlot) -> usize {
        for &byte in chunk {
            match self.phase {
                Phase::AwaitStart => self.on_start_byte(byte),
                Phase::ReadSamples => self.on_sample_byte(byte),
                Phase::AwaitStop => self.on_stop_byte(byte, slot),
            }
        }
        self.stats.bytes_consumed += chunk.len() as u64;
        chunk.len()
    }

    fn on_start_byte(&mut self, byte: u8) {
        if byte != START_FLAG {
            // A broken start run is discarded entirely; this byte cannot
            // begin a new one.
            self.start_run = 0;
            return;
        }
        self.start_run += 1;
        if self.start_run == self.fmt.nflags() {
            self.start_run = 0;
            self.sweep_idx = 0;
            self.byte_idx = 0;
            self.accum = 0;
            self.phase = Phase::ReadSamples;
        }
    }

    fn on_sample_byte(&mut self, byte: u8) {
        let bytes = self.fmt.sample_bytes();
        self.accum |= (byte as u64) << (8 * (bytes - 1 - self.byte_idx));
        self.byte_idx += 1;
        if self.byte_idx < bytes {
            return;
        }

        let value = self.fmt.decode(self.accum);
        // The final sample stays out of the buffer until the stop run
        // validates the frame; the slot must never hold a truncated sweep.
        if self.sweep_idx < self.fmt.sweep_len() - 1 {
            self.head[self.sweep_idx] = value;
        } else {
            self.last_sample = value;
        }
        self.sweep_idx += 1;
        self.byte_idx = 0;
        self.accum = 0;

        if self.sweep_idx == self.fmt.sweep_len() {
            self.phase = Phase::AwaitStop;
        }
    }

    fn on_stop_byte(&mut self, byte: u8, slot: &mut SweepSlot) {
        if byte != STOP_FLAG {
            // The radar de-synced: the whole sweep is invalid. The offending
            // byte is consumed; the next byte is the first candidate for a
            // new start run.
            self.stats.frames_discarded += 1;
            self.stop_run = 0;
            self.sweep_idx = 0;
            self.phase = Phase::AwaitStart;
            return;
        }
        self.stop_run += 1;
        if self.stop_run == self.fmt.nflags() {
            if slot.publish(&self.head, self.last_sample) {
                self.stats.sweeps_published += 1;
            } else {
                self.stats.sweeps_dropped += 1;
            }
            self.stop_run = 0;
            self.sweep_idx = 0;
            self.phase = Phase::AwaitStart;
        }
    }
}
