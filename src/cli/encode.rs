use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::MultiProgress;

use iec61937::process::encode::Encoder;

use crate::byteorder::swap_pairs_in_place;
use crate::cli::command::{Cli, EncodeArgs};
use crate::mp4::reader::Mp4Reader;

pub fn cmd_encode(args: &EncodeArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!(
        "Packing {} into an IEC 61937-13 stream (factor: {:?}, swap: {})",
        args.input.display(),
        args.factor,
        args.swap
    );

    let mut reader = Mp4Reader::open(&args.input)
        .with_context(|| format!("cannot read {}", args.input.display()))?;
    if reader.timescale() != 48000 {
        log::warn!(
            "track timescale is {}, not 48000; durations are passed through unscaled",
            reader.timescale()
        );
    }
    let mut output = BufWriter::new(File::create(&args.output)?);
    let pb = multi.map(|multi| super::decode::create_progress_bar(multi, "encoded"));
    let start_time = Instant::now();

    let mut encoder = Encoder::new(args.factor.rate_factor());
    let mut burst = vec![0u8; encoder.burst_size()];
    let mut bursts_written = 0u64;

    for index in 0..reader.sample_count() {
        let (access_unit, duration) = reader.read_sample(index)?;

        // Redrive the same unit until the encoder takes it; every pass
        // emits at most one burst.
        loop {
            let result = encoder.process(&access_unit, duration, &mut burst)?;
            if result.size > 0 {
                write_burst(&mut output, &mut burst[..result.size], args.swap)?;
                bursts_written += 1;
            }
            if result.input_consumed {
                break;
            }
        }
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }

    // Drain the units still queued short of a full audio frame.
    loop {
        let written = encoder.flush(&mut burst)?;
        if written == 0 {
            break;
        }
        write_burst(&mut output, &mut burst[..written], args.swap)?;
        bursts_written += 1;
    }

    output.flush()?;
    if let Some(pb) = &pb {
        pb.finish_with_message(format!("{} samples", reader.sample_count()));
    }
    log::info!(
        "Wrote {} bursts ({} bytes) to {} in {:.2?}",
        bursts_written,
        bursts_written * encoder.burst_size() as u64,
        args.output.display(),
        start_time.elapsed()
    );
    Ok(())
}

fn write_burst<W: Write>(output: &mut W, burst: &mut [u8], swap: bool) -> Result<()> {
    if swap {
        swap_pairs_in_place(burst);
    }
    output.write_all(burst)?;
    Ok(())
}
