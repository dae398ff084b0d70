//! Replay a raw acquisition log and print the recovered sweeps.
//!
//! Usage: cargo run --example replay_log -- LOG_FILE SAMPLE_BITS SWEEP_LEN [fft]
//!
//! The log is the byte-exact stream written by `start_acquisition` with a
//! log path set; replaying it recovers the same sweeps the live run saw.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fmcw_daq::{FifoBridge, FrameFormat, Radar, ReplayBridge, Sample};

fn parse_args() -> Option<(PathBuf, u32, usize, bool)> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 3 {
        return None;
    }
    let path = PathBuf::from(&args[0]);
    let sample_bits = args[1].parse().ok()?;
    let sweep_len = args[2].parse().ok()?;
    let fft = args.get(3).map(|s| s == "fft").unwrap_or(false);
    Some((path, sample_bits, sweep_len, fft))
}

fn main() {
    env_logger::init();

    let (path, sample_bits, sweep_len, fft) = match parse_args() {
        Some(args) => args,
        None => {
            eprintln!("usage: replay_log LOG_FILE SAMPLE_BITS SWEEP_LEN [fft]");
            return;
        }
    };

    let format = match FrameFormat::new(sample_bits, sweep_len, fft) {
        Ok(format) => format,
        Err(e) => {
            eprintln!("bad format: {e}");
            return;
        }
    };

    let bridge = match ReplayBridge::from_file(&path) {
        Ok(bridge) => Arc::new(bridge),
        Err(e) => {
            eprintln!("cannot read {}: {e}", path.display());
            return;
        }
    };

    let mut radar = match Radar::open(bridge as Arc<dyn FifoBridge>) {
        Ok(radar) => radar,
        Err(e) => {
            eprintln!("open failed: {e}");
            return;
        }
    };
    if let Err(e) = radar.start_acquisition(None, format) {
        eprintln!("start failed: {e}");
        return;
    }

    let mut sweep = vec![0 as Sample; sweep_len];
    let mut taken = 0usize;
    loop {
        let running = radar.is_running();
        if radar.read_sweep(&mut sweep) {
            taken += 1;
            let peak = sweep.iter().copied().max().unwrap_or(0);
            println!(
                "sweep {taken}: first={} last={} peak={peak}",
                sweep[0],
                sweep[sweep_len - 1]
            );
        } else if running {
            thread::sleep(Duration::from_millis(1));
        } else {
            break;
        }
    }

    let stats = radar.stats();
    println!(
        "\n{} sweeps recovered ({} published, {} dropped, {} discarded) from {} bytes",
        taken,
        stats.sweeps_published,
        stats.sweeps_dropped,
        stats.frames_discarded,
        stats.bytes_consumed
    );
    radar.close();
}
