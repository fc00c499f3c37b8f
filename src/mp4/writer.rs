//! Plain (non-fragmented) MP4 writing: one `mhm1` audio track.
//!
//! Layout is "mdat first, moov last": the ftyp box and an mdat header are
//! written up front, samples stream straight into mdat, and `finalize`
//! backfills the mdat size and appends the moov box built from the
//! recorded sample metadata.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{bail, Result};
use log::debug;
use mpeghiec_macros::mp4_box;

use super::boxes::{wrap_box, Mp4Box};
use crate::join_bytes_be;

const UNITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

#[mp4_box(b"mvhd")]
struct MovieHeader {
    version_flags: u32,
    creation_time: u32,
    modification_time: u32,
    timescale: u32,
    duration: u32,
    rate: u32,
    volume: u16,
    reserved: [u8; 10],
    matrix: [u32; 9],
    pre_defined: [u32; 6],
    next_track_id: u32,
}

#[mp4_box(b"tkhd")]
struct TrackHeader {
    version_flags: u32,
    creation_time: u32,
    modification_time: u32,
    track_id: u32,
    reserved: u32,
    duration: u32,
    reserved2: [u32; 2],
    layer: u16,
    alternate_group: u16,
    volume: u16,
    reserved3: u16,
    matrix: [u32; 9],
    width: u32,
    height: u32,
}

#[mp4_box(b"mdhd")]
struct MediaHeader {
    version_flags: u32,
    creation_time: u32,
    modification_time: u32,
    timescale: u32,
    duration: u32,
    /// ISO 639-2 "und", packed.
    language: u16,
    pre_defined: u16,
}

#[mp4_box(b"hdlr")]
struct HandlerReference {
    version_flags: u32,
    pre_defined: u32,
    handler_type: [u8; 4],
    reserved: [u32; 3],
    name: Vec<u8>,
}

#[mp4_box(b"smhd")]
struct SoundMediaHeader {
    version_flags: u32,
    balance: u16,
    reserved: u16,
}

#[mp4_box(b"url ")]
struct DataEntryUrl {
    /// Flag 1: media data is in the same file.
    version_flags: u32,
}

/// MHASampleEntryV0 without a configuration box; an mhm1 stream carries
/// its configuration in band.
#[mp4_box(b"mhm1")]
struct MpeghSampleEntry {
    reserved: [u8; 6],
    data_reference_index: u16,
    reserved2: [u32; 2],
    channel_count: u16,
    sample_size: u16,
    pre_defined: u16,
    reserved3: u16,
    /// 16.16 fixed point.
    sample_rate: u32,
}

struct SampleMeta {
    size: u32,
    duration: u32,
    sync: bool,
}

/// Streams samples of one `mhm1` track into an MP4 file.
pub struct Mp4Writer {
    file: File,
    timescale: u32,
    mdat_header_offset: u64,
    mdat_data_start: u64,
    mdat_written: u64,
    samples: Vec<SampleMeta>,
}

impl Mp4Writer {
    pub fn create<P: AsRef<Path>>(path: P, timescale: u32) -> Result<Self> {
        let mut file = File::create(path)?;

        let mut head = Vec::new();
        wrap_box(
            b"ftyp",
            &join_bytes_be!(*b"mp42", 0u32, *b"mp42", *b"isom"),
            &mut head,
        );
        file.write_all(&head)?;

        // mdat header; the size is backfilled by finalize().
        let mdat_header_offset = head.len() as u64;
        file.write_all(&join_bytes_be!(0u32, *b"mdat"))?;

        Ok(Self {
            file,
            timescale,
            mdat_header_offset,
            mdat_data_start: mdat_header_offset + 8,
            mdat_written: 0,
            samples: Vec::new(),
        })
    }

    /// Appends one sample to mdat and records its metadata.
    pub fn add_sample(&mut self, data: &[u8], duration: u32, sync: bool) -> Result<()> {
        if data.len() > u32::MAX as usize {
            bail!("sample of {} bytes is too large", data.len());
        }
        self.file.write_all(data)?;
        self.mdat_written += data.len() as u64;
        self.samples.push(SampleMeta {
            size: data.len() as u32,
            duration,
            sync,
        });
        Ok(())
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Backfills the mdat size and writes the moov box.
    pub fn finalize(&mut self) -> Result<()> {
        let mdat_total = 8 + self.mdat_written;
        if mdat_total > u32::MAX as u64 {
            bail!("mdat of {mdat_total} bytes needs a large box, unsupported");
        }
        self.file.seek(SeekFrom::Start(self.mdat_header_offset))?;
        self.file.write_all(&(mdat_total as u32).to_be_bytes())?;
        self.file.seek(SeekFrom::End(0))?;

        let mut moov = Vec::new();
        wrap_box(b"moov", &self.build_moov(), &mut moov);
        self.file.write_all(&moov)?;
        self.file.flush()?;

        debug!(
            "finalized MP4: {} samples, {} mdat bytes",
            self.samples.len(),
            self.mdat_written
        );
        Ok(())
    }

    fn duration(&self) -> u32 {
        self.samples.iter().map(|s| s.duration).sum()
    }

    fn build_moov(&self) -> Vec<u8> {
        let duration = self.duration();
        let mut moov = Vec::new();

        MovieHeader {
            version_flags: 0,
            creation_time: 0,
            modification_time: 0,
            timescale: self.timescale,
            duration,
            rate: 0x0001_0000,
            volume: 0x0100,
            reserved: [0; 10],
            matrix: UNITY_MATRIX,
            pre_defined: [0; 6],
            next_track_id: 2,
        }
        .write_into(&mut moov);

        let mut trak = Vec::new();
        TrackHeader {
            // Track enabled and presented.
            version_flags: 0x0000_0003,
            creation_time: 0,
            modification_time: 0,
            track_id: 1,
            reserved: 0,
            duration,
            reserved2: [0; 2],
            layer: 0,
            alternate_group: 0,
            volume: 0x0100,
            reserved3: 0,
            matrix: UNITY_MATRIX,
            width: 0,
            height: 0,
        }
        .write_into(&mut trak);
        wrap_box(b"mdia", &self.build_mdia(duration), &mut trak);
        wrap_box(b"trak", &trak, &mut moov);

        moov
    }

    fn build_mdia(&self, duration: u32) -> Vec<u8> {
        let mut mdia = Vec::new();

        MediaHeader {
            version_flags: 0,
            creation_time: 0,
            modification_time: 0,
            timescale: self.timescale,
            duration,
            language: 0x55C4,
            pre_defined: 0,
        }
        .write_into(&mut mdia);

        HandlerReference {
            version_flags: 0,
            pre_defined: 0,
            handler_type: *b"soun",
            reserved: [0; 3],
            name: b"SoundHandler\0".to_vec(),
        }
        .write_into(&mut mdia);

        let mut minf = Vec::new();
        SoundMediaHeader {
            version_flags: 0,
            balance: 0,
            reserved: 0,
        }
        .write_into(&mut minf);

        let mut dref_content = join_bytes_be!(0u32, 1u32);
        DataEntryUrl { version_flags: 1 }.write_into(&mut dref_content);
        let mut dinf = Vec::new();
        wrap_box(b"dref", &dref_content, &mut dinf);
        wrap_box(b"dinf", &dinf, &mut minf);

        wrap_box(b"stbl", &self.build_stbl(), &mut minf);
        wrap_box(b"minf", &minf, &mut mdia);

        mdia
    }

    fn build_stbl(&self) -> Vec<u8> {
        let mut stbl = Vec::new();

        let mut stsd = join_bytes_be!(0u32, 1u32);
        MpeghSampleEntry {
            reserved: [0; 6],
            data_reference_index: 1,
            reserved2: [0; 2],
            channel_count: 2,
            sample_size: 16,
            pre_defined: 0,
            reserved3: 0,
            sample_rate: self.timescale << 16,
        }
        .write_into(&mut stsd);
        wrap_box(b"stsd", &stsd, &mut stbl);

        // stts as run-length pairs of equal durations.
        let mut runs: Vec<(u32, u32)> = Vec::new();
        for sample in &self.samples {
            match runs.last_mut() {
                Some((count, delta)) if *delta == sample.duration => *count += 1,
                _ => runs.push((1, sample.duration)),
            }
        }
        let mut stts = join_bytes_be!(0u32, runs.len() as u32);
        for (count, delta) in runs {
            stts.extend_from_slice(&join_bytes_be!(count, delta));
        }
        wrap_box(b"stts", &stts, &mut stbl);

        // All samples live in a single chunk at the start of mdat.
        wrap_box(
            b"stsc",
            &join_bytes_be!(0u32, 1u32, 1u32, self.samples.len() as u32, 1u32),
            &mut stbl,
        );

        let mut stsz = join_bytes_be!(0u32, 0u32, self.samples.len() as u32);
        for sample in &self.samples {
            stsz.extend_from_slice(&sample.size.to_be_bytes());
        }
        wrap_box(b"stsz", &stsz, &mut stbl);

        wrap_box(
            b"stco",
            &join_bytes_be!(0u32, 1u32, self.mdat_data_start as u32),
            &mut stbl,
        );

        // Absent stss means every sample is a sync sample.
        if !self.samples.iter().all(|s| s.sync) {
            let sync_samples: Vec<u32> = self
                .samples
                .iter()
                .enumerate()
                .filter(|(_, s)| s.sync)
                .map(|(i, _)| i as u32 + 1)
                .collect();
            let mut stss = join_bytes_be!(0u32, sync_samples.len() as u32);
            for index in sync_samples {
                stss.extend_from_slice(&index.to_be_bytes());
            }
            wrap_box(b"stss", &stss, &mut stbl);
        }

        stbl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxes_carry_their_size_prefix() {
        let mut out = Vec::new();
        SoundMediaHeader {
            version_flags: 0,
            balance: 0,
            reserved: 0,
        }
        .write_into(&mut out);
        assert_eq!(out, [0, 0, 0, 16, b's', b'm', b'h', b'd', 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn variable_length_fields_are_counted() {
        let mut out = Vec::new();
        HandlerReference {
            version_flags: 0,
            pre_defined: 0,
            handler_type: *b"soun",
            reserved: [0; 3],
            name: b"SoundHandler\0".to_vec(),
        }
        .write_into(&mut out);
        assert_eq!(out.len(), 8 + 24 + 13);
        assert_eq!(u32::from_be_bytes(out[..4].try_into().unwrap()), 45);
        assert_eq!(&out[4..8], b"hdlr");
        assert_eq!(&out[out.len() - 13..], b"SoundHandler\0");
    }
}
