use std::time::Instant;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use iec61937::process::decode::{DecodeOutput, Decoder};
use iec61937::structs::burst::MAX_MPEGH_FRAME_SIZE;
use iec61937::structs::mhas::is_random_access_point;

use crate::byteorder::swap_pairs_in_place;
use crate::cli::command::{Cli, DecodeArgs};
use crate::input::InputReader;
use crate::mp4::writer::Mp4Writer;

/// MP4 media timescale; IEC 61937-13 PCM offsets count 48 kHz samples.
const MEDIA_TIMESCALE: u32 = 48000;

const INPUT_CHUNK_SIZE: usize = 1024 * 2 * 2 * 4;

/// One decoded access unit waiting for its successor: a sample's duration
/// is the PTS difference to the next one, so writing always trails by one.
struct PendingSample {
    data: Vec<u8>,
    pts: i64,
    sync: bool,
}

pub fn cmd_decode(args: &DecodeArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!(
        "Unpacking IEC 61937-13 stream: {} (swap: {})",
        args.input.display(),
        args.swap
    );

    let mut reader = InputReader::new(&args.input)?;
    let mut writer = Mp4Writer::create(&args.output, MEDIA_TIMESCALE)?;
    let pb = multi.map(|multi| create_progress_bar(multi, "decoded"));
    let start_time = Instant::now();

    let mut decoder = Decoder::default();
    let mut chunk = vec![0u8; INPUT_CHUNK_SIZE];
    let mut unit = vec![0u8; MAX_MPEGH_FRAME_SIZE];

    // Reconstructed time line: each completed burst advances the reference
    // by its audio frame length, each unit's PTS is reference + PCM offset.
    let mut time_base: i64 = 0;
    let mut last_frame_length: u32 = 0;
    let mut last_sample: Option<PendingSample> = None;

    loop {
        let bytes_read = reader.read_chunk(&mut chunk)?;
        if bytes_read == 0 {
            break;
        }
        let data = &mut chunk[..bytes_read];
        if args.swap {
            swap_pairs_in_place(data);
        }
        decoder.feed(data)?;

        loop {
            match decoder.process(&mut unit)? {
                DecodeOutput::AccessUnit {
                    size,
                    pcm_offset,
                    audio_frame_length,
                    burst_complete,
                } => {
                    if size > 0 {
                        let pts = time_base + pcm_offset as i64;
                        let sync = is_random_access_point(&unit[..size]);
                        if sync {
                            log::debug!(
                                "sample {} is a random access point",
                                writer.sample_count() + last_sample.is_some() as usize
                            );
                        }

                        if let Some(previous) = last_sample.take() {
                            let duration = (pts - previous.pts).max(0) as u32;
                            writer.add_sample(&previous.data, duration, previous.sync)?;
                            if let Some(pb) = &pb {
                                pb.inc(1);
                            }
                        }
                        last_sample = Some(PendingSample {
                            data: unit[..size].to_vec(),
                            pts,
                            sync,
                        });
                    }
                    if burst_complete {
                        time_base += audio_frame_length as i64;
                        last_frame_length = audio_frame_length;
                    }
                }
                DecodeOutput::NeedData => break,
            }
        }
    }

    // The final sample has no successor; give it one burst's worth.
    if let Some(previous) = last_sample.take() {
        writer.add_sample(&previous.data, last_frame_length, previous.sync)?;
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }

    let samples = writer.sample_count();
    writer.finalize()?;

    if let Some(pb) = &pb {
        pb.finish_with_message(format!("{samples} samples"));
    }
    log::info!(
        "Wrote {} samples to {} in {:.2?}",
        samples,
        args.output.display(),
        start_time.elapsed()
    );
    Ok(())
}

pub(super) fn create_progress_bar(multi: &MultiProgress, verb: &str) -> ProgressBar {
    let pb = multi.add(ProgressBar::new_spinner());
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {pos} samples {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(verb.to_string());
    pb
}
