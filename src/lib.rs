//! Host-side acquisition driver for an FMCW radar.
//!
//! The radar front-end streams digitized sweep samples over a USB FIFO
//! bridge as a continuous bitstream with in-band framing. This crate
//! consumes that stream in real time: it recovers sweep boundaries from the
//! start/stop flag runs, decodes each sample word, and hands completed
//! sweeps to a polling consumer through a single most-recent-sweep slot.
//!
//! - [`protocol`]: wire format, flag/padding arithmetic, sample decoding
//! - [`parser`]: resumable framing state machine fed arbitrary-sized chunks
//! - [`sweep`]: single-slot handoff of the most recent completed sweep
//! - [`acquisition`]: device lifecycle, producer thread, raw-stream logging
//! - [`writer`]: queued host-to-device configuration writes
//! - [`replay`]: byte-stream replay device for offline use and tests
//! - [`session`]: process-wide singleton shell over one [`Radar`]
//!
//! The USB bridge itself stays behind the [`FifoBridge`] trait: hardware
//! integrations implement it, while [`ReplayBridge`] replays captured
//! streams without hardware.

pub mod acquisition;
pub mod device;
pub mod parser;
pub mod protocol;
pub mod replay;
pub mod session;
pub mod sweep;
pub mod writer;

pub use acquisition::{Radar, StartError};
pub use device::{BridgeConfig, DeviceError, FifoBridge, StreamControl};
pub use parser::{CaptureStats, FrameParser};
pub use protocol::{ConfigError, FrameFormat, Sample, START_FLAG, STOP_FLAG};
pub use replay::ReplayBridge;
pub use sweep::SweepSlot;
pub use writer::{WriteError, WriteQueue};
