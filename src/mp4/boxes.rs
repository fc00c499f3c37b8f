//! ISO BMFF box primitives shared by the reader and the writer.

use std::io::Read;

use anyhow::{bail, Result};

/// One sized, typed MP4 box. The `#[mp4_box(b"....")]` attribute
/// implements this for fixed-layout box structs, generating the
/// size-prefixed serialization from their fields.
pub trait Mp4Box {
    fn fourcc(&self) -> &[u8; 4];
    fn write_into(&self, dst: &mut Vec<u8>);
}

/// Wraps already-serialized content into a box.
pub fn wrap_box(fourcc: &[u8; 4], content: &[u8], dst: &mut Vec<u8>) {
    dst.extend_from_slice(&((8 + content.len()) as u32).to_be_bytes());
    dst.extend_from_slice(fourcc);
    dst.extend_from_slice(content);
}

/// One parsed box header.
#[derive(Debug, Clone, Copy)]
pub struct BoxHeader {
    pub fourcc: [u8; 4],
    /// Content size in bytes, header excluded.
    pub content_size: u64,
}

/// Reads one box header from a stream; `None` at a clean end of file.
pub fn read_box_header<R: Read>(reader: &mut R) -> Result<Option<BoxHeader>> {
    let mut head = [0u8; 8];
    let mut filled = 0;
    while filled < head.len() {
        let n = reader.read(&mut head[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            bail!("truncated box header");
        }
        filled += n;
    }

    let size = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
    let fourcc = [head[4], head[5], head[6], head[7]];

    let content_size = match size {
        0 => bail!("box '{}' extends to end of file, unsupported", fourcc_str(&fourcc)),
        1 => {
            let mut large = [0u8; 8];
            reader.read_exact(&mut large)?;
            u64::from_be_bytes(large)
                .checked_sub(16)
                .ok_or_else(|| anyhow::anyhow!("invalid large box size"))?
        }
        2..=7 => bail!("invalid box size {size}"),
        _ => u64::from(size) - 8,
    };

    Ok(Some(BoxHeader {
        fourcc,
        content_size,
    }))
}

/// Iterates the boxes packed back to back in `data`, calling `visit` with
/// each fourcc and content slice.
pub fn walk_boxes<'a>(
    data: &'a [u8],
    mut visit: impl FnMut([u8; 4], &'a [u8]) -> Result<()>,
) -> Result<()> {
    let mut pos = 0usize;
    while pos + 8 <= data.len() {
        let size = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
        let fourcc = [data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]];

        let (content_start, total) = match size {
            0 => (pos + 8, data.len() - pos),
            1 => {
                if pos + 16 > data.len() {
                    bail!("truncated large box");
                }
                let large = u64::from_be_bytes(data[pos + 8..pos + 16].try_into()?) as usize;
                if large < 16 {
                    bail!("invalid large box size");
                }
                (pos + 16, large)
            }
            2..=7 => bail!("invalid box size {size}"),
            _ => (pos + 8, size as usize),
        };

        if pos + total > data.len() {
            bail!("box '{}' overruns its container", fourcc_str(&fourcc));
        }
        visit(fourcc, &data[content_start..pos + total])?;
        pos += total;
    }
    Ok(())
}

pub fn fourcc_str(fourcc: &[u8; 4]) -> String {
    fourcc.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() -> Result<()> {
        let mut data = Vec::new();
        wrap_box(b"ftyp", &[1, 2, 3, 4], &mut data);

        let mut cursor = std::io::Cursor::new(&data[..]);
        let header = read_box_header(&mut cursor)?.unwrap();
        assert_eq!(&header.fourcc, b"ftyp");
        assert_eq!(header.content_size, 4);
        Ok(())
    }

    #[test]
    fn walk_visits_siblings() -> Result<()> {
        let mut data = Vec::new();
        wrap_box(b"aaaa", &[0; 3], &mut data);
        wrap_box(b"bbbb", &[1; 9], &mut data);

        let mut seen = Vec::new();
        walk_boxes(&data, |fourcc, content| {
            seen.push((fourcc, content.len()));
            Ok(())
        })?;
        assert_eq!(seen, [(*b"aaaa", 3), (*b"bbbb", 9)]);
        Ok(())
    }

    #[test]
    fn walk_rejects_overrun() {
        let mut data = Vec::new();
        wrap_box(b"aaaa", &[0; 3], &mut data);
        data[3] = 200; // size beyond the buffer
        assert!(walk_boxes(&data, |_, _| Ok(())).is_err());
    }
}
