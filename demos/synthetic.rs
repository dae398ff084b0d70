//! Synthetic acquisition run without hardware.
//!
//! Usage: cargo run --example synthetic
//!
//! Builds a few hundred frames of a 12-bit ramp, streams them through a
//! replay bridge in deliberately unaligned chunks, and polls sweeps off the
//! slot while printing throughput, the way a display layer would.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fmcw_daq::{FifoBridge, FrameFormat, Radar, ReplayBridge, Sample};

const SAMPLE_BITS: u32 = 12;
const SWEEP_LEN: usize = 256;
const FRAMES: usize = 400;

fn main() {
    env_logger::init();

    println!("FMCW synthetic acquisition");
    println!("==========================\n");

    let format = match FrameFormat::new(SAMPLE_BITS, SWEEP_LEN, false) {
        Ok(format) => format,
        Err(e) => {
            eprintln!("bad format: {e}");
            return;
        }
    };
    println!(
        "{} bits/sample -> {} bytes on the wire, {} flag bytes per run",
        format.sample_bits(),
        format.sample_bytes(),
        format.nflags()
    );

    // Each frame carries a ramp offset by its index so dropped sweeps are
    // visible in the output.
    let mut stream = Vec::with_capacity(FRAMES * format.frame_len());
    for k in 0..FRAMES {
        let words: Vec<u64> = (0..SWEEP_LEN)
            .map(|i| format.real_word((i as Sample % 4000) - 2000 + k as Sample))
            .collect();
        stream.extend(format.build_frame(&words));
    }
    println!("stream: {} frames, {} bytes", FRAMES, stream.len());

    // 4093 is prime, so chunk boundaries drift across every frame field.
    let bridge = Arc::new(ReplayBridge::from_bytes(&stream, 4093));
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

    let started = Instant::now();
    let mut sweep = vec![0 as Sample; SWEEP_LEN];
    let mut taken = 0usize;
    loop {
        let running = radar.is_running();
        if radar.read_sweep(&mut sweep) {
            taken += 1;
            if taken % 50 == 0 {
                println!(
                    "sweep {:4}: first={} last={}",
                    taken,
                    sweep[0],
                    sweep[SWEEP_LEN - 1]
                );
            }
        } else if running {
            thread::sleep(Duration::from_millis(1));
        } else {
            break;
        }
    }
    let elapsed = started.elapsed();

    let stats = radar.stats();
    println!("\nconsumer took {taken} sweeps in {elapsed:.2?}");
    println!(
        "parser: {} published, {} dropped (slow consumer), {} discarded, {} bytes",
        stats.sweeps_published, stats.sweeps_dropped, stats.frames_discarded, stats.bytes_consumed
    );
    println!(
        "bandwidth: {:.1} KiB/s",
        stats.bytes_consumed as f64 / 1024.0 / elapsed.as_secs_f64()
    );

    radar.close();
}
