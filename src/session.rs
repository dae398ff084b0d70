//! Process-wide acquisition session.
//!
//! Thin boolean shell over one owned [`Radar`], for consumers that want the
//! driver's original flat call surface. Errors collapse to `false` after
//! being reported through the log facade; install a logger (for example
//! `env_logger`) to see them on stderr.
//!
//! The typed [`Radar`] API is the primary surface; prefer it when the
//! consumer can hold a value.

use std::path::Path;
use std::sync::Arc;

use lazy_static::lazy_static;
use log::error;
use parking_lot::Mutex;

use crate::acquisition::Radar;
use crate::device::FifoBridge;
use crate::protocol::{FrameFormat, Sample};

lazy_static! {
    static ref SESSION: Mutex<Option<Radar>> = Mutex::new(None);
}

/// Open the device and install it as the process session. Fails when a
/// session is already open or the transport rejects configuration.
pub fn open(bridge: Arc<dyn FifoBridge>) -> bool {
    let mut session = SESSION.lock();
    if session.is_some() {
        error!("a radar session is already open");
        return false;
    }
    match Radar::open(bridge) {
        Ok(radar) => {
            *session = Some(radar);
            true
        }
        Err(e) => {
            error!("failed to open radar: {e}");
            false
        }
    }
}

/// Begin streaming on the open session. `log_path` optionally receives the
/// byte-exact raw stream.
pub fn start_acquisition(
    log_path: Option<&Path>,
    sample_bits: u32,
    sweep_len: usize,
    fft: bool,
) -> bool {
    let format = match FrameFormat::new(sample_bits, sweep_len, fft) {
        Ok(format) => format,
        Err(e) => {
            error!("invalid acquisition config: {e}");
            return false;
        }
    };
    match SESSION.lock().as_mut() {
        Some(radar) => match radar.start_acquisition(log_path, format) {
            Ok(()) => true,
            Err(e) => {
                error!("failed to start acquisition: {e}");
                false
            }
        },
        None => {
            error!("no open radar session");
            false
        }
    }
}

/// Copy the most recent completed sweep into `out`; true iff a new sweep
/// was ready. Never blocks on the device.
pub fn read_sweep(out: &mut [Sample]) -> bool {
    match SESSION.lock().as_ref() {
        Some(radar) => radar.read_sweep(out),
        None => false,
    }
}

/// Queue the low `nbytes` of `value` for the next outbound transfer.
pub fn enqueue_write(value: u32, nbytes: usize) -> bool {
    match SESSION.lock().as_mut() {
        Some(radar) => match radar.enqueue_write(value, nbytes) {
            Ok(()) => true,
            Err(e) => {
                error!("enqueue_write failed: {e}");
                false
            }
        },
        None => {
            error!("no open radar session");
            false
        }
    }
}

/// Send all queued configuration bytes. The queue survives a failure so the
/// transfer can be retried.
pub fn flush_writes() -> bool {
    match SESSION.lock().as_mut() {
        Some(radar) => match radar.flush_writes() {
            Ok(()) => true,
            Err(e) => {
                error!("flush_writes failed: {e}");
                false
            }
        },
        None => {
            error!("no open radar session");
            false
        }
    }
}

/// Stop acquisition and release the device. Safe to call with no session
/// open; afterwards every other call reports failure until the next `open`.
pub fn close() {
    if let Some(radar) = SESSION.lock().take() {
        radar.close();
    }
}
