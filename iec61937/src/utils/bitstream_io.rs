//! Bitstream reading over byte slices.
//!
//! Thin wrapper around [`bitstream_io`] used by the MHAS package walker.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, UnsignedInteger};

#[derive(Debug)]
pub struct BsIoSliceReader<'a> {
    bs: BitReader<io::Cursor<&'a [u8]>, BigEndian>,
    len: u64,
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self {
            bs: BitReader::new(io::Cursor::new(buf)),
            len: (buf.len() as u64) << 3,
        }
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        self.bs.read_unsigned_var(n)
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        self.bs.skip(n)
    }

    /// Remaining bits.
    pub fn available(&mut self) -> io::Result<u64> {
        Ok(self.len.saturating_sub(self.bs.position_in_bits()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_bits_big_endian() -> io::Result<()> {
        let mut reader = BsIoSliceReader::from_slice(&[0b1010_1100, 0xFF]);
        assert_eq!(reader.get_n::<u8>(3)?, 0b101);
        assert_eq!(reader.get_n::<u8>(5)?, 0b01100);
        assert_eq!(reader.available()?, 8);
        reader.skip_n(8)?;
        assert_eq!(reader.available()?, 0);
        assert!(reader.get_n::<u8>(1).is_err());
        Ok(())
    }
}
