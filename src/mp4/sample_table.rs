//! Sample-table (`stbl`) resolution.
//!
//! Collects the raw stts/stsc/stsz/stco tables of one track and resolves
//! them into a flat per-sample list of file offset, size and duration.

use anyhow::{bail, Result};

/// One resolved sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    pub offset: u64,
    pub size: u32,
    pub duration: u32,
}

#[derive(Debug, Clone, Copy)]
struct ChunkRun {
    first_chunk: u32,
    samples_per_chunk: u32,
}

/// Raw sample tables of one track, filled box by box.
#[derive(Debug, Default)]
pub struct SampleTable {
    /// Coding name of the first sample description entry.
    pub codec: [u8; 4],
    /// stts runs as (sample count, delta) pairs.
    durations: Vec<(u32, u32)>,
    /// Constant stsz size, or zero with per-sample sizes.
    constant_size: u32,
    sizes: Vec<u32>,
    sample_count: u32,
    chunk_offsets: Vec<u64>,
    chunk_runs: Vec<ChunkRun>,
}

impl SampleTable {
    pub fn parse_stsd(&mut self, content: &[u8]) -> Result<()> {
        if content.len() < 16 {
            bail!("stsd too short");
        }
        // version/flags, entry count, then the first sample entry's
        // size and coding name; the entry internals are not needed.
        let entry_count = u32::from_be_bytes(content[4..8].try_into()?);
        if entry_count == 0 {
            bail!("stsd without sample entries");
        }
        self.codec = content[12..16].try_into()?;
        Ok(())
    }

    pub fn parse_stts(&mut self, content: &[u8]) -> Result<()> {
        let entry_count = table_entries(content, 8)?;
        for i in 0..entry_count {
            let pos = 8 + i * 8;
            self.durations.push((
                u32::from_be_bytes(content[pos..pos + 4].try_into()?),
                u32::from_be_bytes(content[pos + 4..pos + 8].try_into()?),
            ));
        }
        Ok(())
    }

    pub fn parse_stsc(&mut self, content: &[u8]) -> Result<()> {
        let entry_count = table_entries(content, 12)?;
        for i in 0..entry_count {
            let pos = 8 + i * 12;
            self.chunk_runs.push(ChunkRun {
                first_chunk: u32::from_be_bytes(content[pos..pos + 4].try_into()?),
                samples_per_chunk: u32::from_be_bytes(content[pos + 4..pos + 8].try_into()?),
            });
        }
        Ok(())
    }

    pub fn parse_stsz(&mut self, content: &[u8]) -> Result<()> {
        if content.len() < 12 {
            bail!("stsz too short");
        }
        self.constant_size = u32::from_be_bytes(content[4..8].try_into()?);
        self.sample_count = u32::from_be_bytes(content[8..12].try_into()?);
        if self.constant_size == 0 {
            let table = &content[12..];
            if table.len() < self.sample_count as usize * 4 {
                bail!("stsz table shorter than its sample count");
            }
            self.sizes = table
                .chunks_exact(4)
                .take(self.sample_count as usize)
                .map(|c| u32::from_be_bytes(c.try_into().unwrap()))
                .collect();
        }
        Ok(())
    }

    pub fn parse_stco(&mut self, content: &[u8]) -> Result<()> {
        let entry_count = table_entries(content, 4)?;
        for i in 0..entry_count {
            let pos = 8 + i * 4;
            self.chunk_offsets
                .push(u32::from_be_bytes(content[pos..pos + 4].try_into()?) as u64);
        }
        Ok(())
    }

    pub fn parse_co64(&mut self, content: &[u8]) -> Result<()> {
        let entry_count = table_entries(content, 8)?;
        for i in 0..entry_count {
            let pos = 8 + i * 8;
            self.chunk_offsets
                .push(u64::from_be_bytes(content[pos..pos + 8].try_into()?));
        }
        Ok(())
    }

    fn size_of(&self, sample: usize) -> u32 {
        if self.constant_size != 0 {
            self.constant_size
        } else {
            self.sizes[sample]
        }
    }

    /// Resolves the tables into a flat sample list.
    pub fn resolve(&self) -> Result<Vec<SampleInfo>> {
        let total = self.sample_count as usize;
        let mut samples = Vec::with_capacity(total);

        let mut durations = self
            .durations
            .iter()
            .flat_map(|&(count, delta)| std::iter::repeat(delta).take(count as usize));

        for (run_index, run) in self.chunk_runs.iter().enumerate() {
            // A run covers the chunks up to the next run's first chunk.
            let run_end = self
                .chunk_runs
                .get(run_index + 1)
                .map(|next| next.first_chunk)
                .unwrap_or(self.chunk_offsets.len() as u32 + 1);
            if run.first_chunk == 0 || run_end <= run.first_chunk {
                bail!("invalid stsc chunk run");
            }

            for chunk in run.first_chunk..run_end {
                let Some(&base) = self.chunk_offsets.get(chunk as usize - 1) else {
                    bail!("stsc refers to chunk {chunk} without an offset");
                };
                let mut offset = base;
                for _ in 0..run.samples_per_chunk {
                    if samples.len() == total {
                        break;
                    }
                    let size = self.size_of(samples.len());
                    let duration = durations.next().unwrap_or(0);
                    samples.push(SampleInfo {
                        offset,
                        size,
                        duration,
                    });
                    offset += u64::from(size);
                }
            }
        }

        if samples.len() != total {
            bail!(
                "sample tables resolve to {} samples, stsz declares {total}",
                samples.len()
            );
        }
        Ok(samples)
    }
}

fn table_entries(content: &[u8], entry_size: usize) -> Result<usize> {
    if content.len() < 8 {
        bail!("sample table box too short");
    }
    let entry_count = u32::from_be_bytes(content[4..8].try_into()?) as usize;
    if content.len() < 8 + entry_count * entry_size {
        bail!("sample table shorter than its entry count");
    }
    Ok(entry_count)
}
