//! MHAS package-list scanning.
//!
//! An MPEG-H access unit is a sequence of MHAS packages, each introduced by
//! a header of escaped values (ISO/IEC 23003-3 table 16): package type,
//! label and payload length. Walking the headers is enough to tell whether
//! an access unit can start a decode: a `SYNC` package (type 1) marks it
//! as a random access point.
//!
//! Identifying a RAP this way is a simplification: a complete answer would
//! also inspect the 3DAFrame and 3DAConfig packages.

use std::io;

use crate::utils::bitstream_io::BsIoSliceReader;

/// MHAS package type marking a random access point.
const PACTYP_SYNC: u64 = 1;

/// Reads an integer of varying width from the bitstream
/// (q.v. ISO/IEC 23003-3 table 16, `escapedValue`).
fn escaped_value(
    reader: &mut BsIoSliceReader,
    num_bits_1: u32,
    num_bits_2: u32,
    num_bits_3: u32,
) -> io::Result<u64> {
    let mut value: u64 = reader.get_n(num_bits_1)?;
    if value == (1 << num_bits_1) - 1 {
        let extra: u64 = reader.get_n(num_bits_2)?;
        value += extra;
        if extra == (1 << num_bits_2) - 1 {
            let extra: u64 = reader.get_n(num_bits_3)?;
            value += extra;
        }
    }
    Ok(value)
}

/// Returns true if the access unit contains a `SYNC` package and can
/// therefore serve as a random access point.
///
/// Truncated or overrunning package headers end the scan; such an access
/// unit is never reported as a RAP.
pub fn is_random_access_point(access_unit: &[u8]) -> bool {
    scan_packages(access_unit).unwrap_or(false)
}

fn scan_packages(access_unit: &[u8]) -> io::Result<bool> {
    let mut reader = BsIoSliceReader::from_slice(access_unit);

    while reader.available()? > 0 {
        let pack_type = escaped_value(&mut reader, 3, 8, 8)?;
        if pack_type == PACTYP_SYNC {
            return Ok(true);
        }

        let _pack_label = escaped_value(&mut reader, 2, 8, 32)?;
        let pack_length = escaped_value(&mut reader, 11, 24, 24)?;

        reader.skip_n((pack_length as u32) << 3)?;
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitstream_io::{BigEndian, BitWrite, BitWriter};

    fn write_escaped(writer: &mut BitWriter<Vec<u8>, BigEndian>, value: u64, n1: u32, n2: u32) {
        let cap1 = (1u64 << n1) - 1;
        if value < cap1 {
            writer.write_var(n1, value).unwrap();
        } else {
            assert!(value - cap1 < (1 << n2) - 1);
            writer.write_var(n1, cap1).unwrap();
            writer.write_var(n2, value - cap1).unwrap();
        }
    }

    fn package(pack_type: u64, payload: &[u8]) -> Vec<u8> {
        let mut writer = BitWriter::new(Vec::new());
        write_escaped(&mut writer, pack_type, 3, 8);
        write_escaped(&mut writer, 0, 2, 8);
        write_escaped(&mut writer, payload.len() as u64, 11, 24);
        writer.byte_align().unwrap();
        let mut bytes = writer.into_writer();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn escaped_value_escapes() -> io::Result<()> {
        // 0b111 escapes into the second field, 0xFF into the third.
        let mut reader = BsIoSliceReader::from_slice(&[0b111_00101, 0b000_11111]);
        assert_eq!(escaped_value(&mut reader, 3, 8, 8)?, 7 + 0b0010_1000);

        let mut reader = BsIoSliceReader::from_slice(&[0xFF, 0xFF, 0x03]);
        assert_eq!(escaped_value(&mut reader, 3, 8, 8)?, 7 + 255 + 0b1111_1000);
        Ok(())
    }

    #[test]
    fn sync_package_is_rap() {
        let mut au = package(6, &[0xA5; 4]);
        au.extend(package(PACTYP_SYNC, &[0xC0]));
        au.extend(package(2, &[0x00; 8]));
        assert!(is_random_access_point(&au));
    }

    #[test]
    fn media_only_access_unit_is_no_rap() {
        let mut au = package(6, &[0xA5; 4]);
        au.extend(package(2, &[0x11; 16]));
        assert!(!is_random_access_point(&au));
    }

    #[test]
    fn truncated_package_is_no_rap() {
        let mut au = package(6, &[0xA5; 4]);
        au.extend(package(2, &[0x11; 16]));
        au.truncate(au.len() - 10);
        assert!(!is_random_access_point(&au));
    }

    #[test]
    fn empty_access_unit_is_no_rap() {
        assert!(!is_random_access_point(&[]));
    }
}
