//! Plain (non-fragmented) MP4 reading, reduced to what the encoder needs:
//! the first `mhm1` audio track with its per-sample data and durations.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{debug, info};

use super::boxes::{fourcc_str, read_box_header, walk_boxes};
use super::sample_table::{SampleInfo, SampleTable};

/// Reads the samples of the first `mhm1` track of an MP4 file.
pub struct Mp4Reader {
    file: BufReader<File>,
    timescale: u32,
    samples: Vec<SampleInfo>,
}

impl Mp4Reader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = BufReader::new(File::open(&path)?);

        let moov = read_moov(&mut file)?;
        let track = find_mhm1_track(&moov)?;
        info!(
            "mhm1 track: {} samples, timescale {}",
            track.samples.len(),
            track.timescale
        );

        Ok(Self {
            file,
            timescale: track.timescale,
            samples: track.samples,
        })
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn timescale(&self) -> u32 {
        self.timescale
    }

    /// Reads sample `index`, returning its bytes and duration in media
    /// timescale units.
    pub fn read_sample(&mut self, index: usize) -> Result<(Vec<u8>, u32)> {
        let info = self
            .samples
            .get(index)
            .with_context(|| format!("sample {index} out of range"))?;

        self.file.seek(SeekFrom::Start(info.offset))?;
        let mut data = vec![0u8; info.size as usize];
        self.file
            .read_exact(&mut data)
            .with_context(|| format!("sample {index} overruns the file"))?;
        Ok((data, info.duration))
    }
}

struct Track {
    timescale: u32,
    samples: Vec<SampleInfo>,
}

/// Scans the top-level boxes and returns the moov content.
fn read_moov<R: Read + Seek>(reader: &mut R) -> Result<Vec<u8>> {
    while let Some(header) = read_box_header(reader)? {
        debug!(
            "top-level box '{}', {} bytes",
            fourcc_str(&header.fourcc),
            header.content_size
        );
        if &header.fourcc == b"moov" {
            let mut moov = vec![0u8; header.content_size as usize];
            reader.read_exact(&mut moov)?;
            return Ok(moov);
        }
        reader.seek(SeekFrom::Current(header.content_size as i64))?;
    }
    bail!("no moov box found");
}

fn find_mhm1_track(moov: &[u8]) -> Result<Track> {
    let mut found = None;

    walk_boxes(moov, |fourcc, content| {
        if &fourcc != b"trak" || found.is_some() {
            return Ok(());
        }
        match parse_trak(content)? {
            track if &track.1.codec == b"mhm1" => {
                let samples = track.1.resolve()?;
                found = Some(Track {
                    timescale: track.0,
                    samples,
                });
            }
            track => {
                info!(
                    "skipping track with unsupported codec '{}'",
                    fourcc_str(&track.1.codec)
                );
            }
        }
        Ok(())
    })?;

    found.ok_or_else(|| anyhow::anyhow!("no mhm1 track found"))
}

/// Extracts the media timescale and sample tables of one track.
fn parse_trak(trak: &[u8]) -> Result<(u32, SampleTable)> {
    let mut timescale = 0u32;
    let mut table = SampleTable::default();

    walk_boxes(trak, |fourcc, mdia| {
        if &fourcc != b"mdia" {
            return Ok(());
        }
        walk_boxes(mdia, |fourcc, content| {
            match &fourcc {
                b"mdhd" => timescale = parse_mdhd_timescale(content)?,
                b"minf" => {
                    walk_boxes(content, |fourcc, minf_child| {
                        if &fourcc != b"stbl" {
                            return Ok(());
                        }
                        walk_boxes(minf_child, |fourcc, stbl_child| {
                            match &fourcc {
                                b"stsd" => table.parse_stsd(stbl_child)?,
                                b"stts" => table.parse_stts(stbl_child)?,
                                b"stsc" => table.parse_stsc(stbl_child)?,
                                b"stsz" => table.parse_stsz(stbl_child)?,
                                b"stco" => table.parse_stco(stbl_child)?,
                                b"co64" => table.parse_co64(stbl_child)?,
                                _ => {}
                            }
                            Ok(())
                        })
                    })?;
                }
                _ => {}
            }
            Ok(())
        })
    })?;

    Ok((timescale, table))
}

fn parse_mdhd_timescale(content: &[u8]) -> Result<u32> {
    if content.is_empty() {
        bail!("empty mdhd");
    }
    // Version 1 widens the creation and modification times to 64 bit.
    let offset = match content[0] {
        0 => 12,
        1 => 20,
        v => bail!("unsupported mdhd version {v}"),
    };
    if content.len() < offset + 4 {
        bail!("mdhd too short");
    }
    Ok(u32::from_be_bytes(content[offset..offset + 4].try_into()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::writer::Mp4Writer;

    #[test]
    fn reads_back_written_samples() -> Result<()> {
        let path = std::env::temp_dir().join(format!("mpeghiec-reader-{}.mp4", std::process::id()));

        let samples: Vec<Vec<u8>> = (0..5u8)
            .map(|i| (0..50 + i as usize * 13).map(|j| (j as u8).wrapping_mul(i)).collect())
            .collect();

        let mut writer = Mp4Writer::create(&path, 48000)?;
        for (i, sample) in samples.iter().enumerate() {
            writer.add_sample(sample, 1024, i == 0)?;
        }
        writer.finalize()?;

        let mut reader = Mp4Reader::open(&path)?;
        assert_eq!(reader.sample_count(), 5);
        assert_eq!(reader.timescale(), 48000);
        for (i, expected) in samples.iter().enumerate() {
            let (data, duration) = reader.read_sample(i)?;
            assert_eq!(&data, expected);
            assert_eq!(duration, 1024);
        }

        std::fs::remove_file(&path)?;
        Ok(())
    }
}
