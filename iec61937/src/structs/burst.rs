//! IEC 61937-13 data-burst framing.
//!
//! ## Burst layout
//!
//! ```text
//! Pa Pb (sync preamble, 4 bytes)
//! Pc Pd (burst info, 4 bytes)
//! payload sub-headers, terminated by an all-zero entry
//! access-unit payload, zero padding
//! burst spacing (all zero)
//! ```
//!
//! Every multi-byte field is big-endian. The total burst length (the burst
//! repetition period) is fixed by `audio_frame_length`, `audio_mode` and
//! `rate_factor`; everything after the payload is zero filled.

use crate::utils::errors::EncodeError;

/// Sync preamble Pa/Pb (0xF872, 0x4E1F) as it appears on the wire.
pub const SYNC_PREAMBLE: [u8; 4] = [0xF8, 0x72, 0x4E, 0x1F];

/// Bytes covered by preamble plus burst info (Pa Pb Pc Pd).
pub const IEC_HEADER_SIZE_BYTES: usize = 8;

/// One IEC 60958 frame carries two 16-bit subframes.
pub const IEC60958_FRAME_SIZE_BYTES: usize = 4;

/// All-zero gap closing every burst; two IEC 60958 frames.
pub const IEC_BURST_SPACING_SIZE_BYTES: usize = 2 * IEC60958_FRAME_SIZE_BYTES;

/// Pc data-type code assigned to MPEG-H 3D Audio.
pub const MPEGH_DATA_TYPE: u8 = 25;

/// Upper bound for one MPEG-H access unit (MPEG-H level 4 plus overhead).
pub const MAX_MPEGH_FRAME_SIZE: usize = 65536;

/// Upper bound for one access unit's duration in PCM samples.
pub const MAX_MPEGH_FRAME_DURATION: u32 = 4096;

/// Audio frame length used by the encoder (samples per burst).
pub const IEC61937_AUDIOFRAME_LENGTH: u32 = 1024;

/// Largest audio frame length accepted on decode.
pub const MAX_AUDIOFRAME_LENGTH: usize = 4096;

/// Largest sample-rate factor defined by IEC 61937-13 subclause 5.3.2.
pub const IEC61937_MAX_SAMPLERATE_FACTOR: usize = 16;

/// Largest possible burst repetition period in bytes.
pub const MAX_IEC61937_FRAME_SIZE_BYTES: usize =
    MAX_AUDIOFRAME_LENGTH * IEC61937_MAX_SAMPLERATE_FACTOR * IEC60958_FRAME_SIZE_BYTES;

/// Pc audio-mode field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    /// MPEG-H 3D Audio.
    Standard,
    /// MPEG-H 3D Audio HBR (high bit rate).
    Hbr,
}

impl AudioMode {
    /// Size in bytes of one payload sub-header for this mode.
    pub fn sub_header_size(self) -> usize {
        match self {
            AudioMode::Standard => 6,
            AudioMode::Hbr => 8,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(AudioMode::Standard),
            1 => Some(AudioMode::Hbr),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            AudioMode::Standard => 0,
            AudioMode::Hbr => 1,
        }
    }
}

/// Sample-rate factor accepted by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateFactor {
    X4,
    X16,
}

impl RateFactor {
    /// Pc rate-factor code (IEC 61937-13 subclause 5.3.2).
    pub fn code(self) -> u8 {
        match self {
            RateFactor::X4 => 1,
            RateFactor::X16 => 3,
        }
    }
}

impl TryFrom<u32> for RateFactor {
    type Error = EncodeError;

    fn try_from(factor: u32) -> Result<Self, EncodeError> {
        match factor {
            4 => Ok(RateFactor::X4),
            16 => Ok(RateFactor::X16),
            _ => Err(EncodeError::UnsupportedRateFactor(factor)),
        }
    }
}

/// Audio frame length in samples for a Pc frame-length code.
pub fn audio_frame_length(code: u8) -> Option<u32> {
    match code {
        0 => Some(1024),
        1 => Some(2048),
        2 => Some(4096),
        3 => Some(768),
        4 => Some(1536),
        5 => Some(3072),
        _ => None,
    }
}

/// Total burst length in bytes for the given framing parameters.
pub fn burst_repetition_period(audio_frame_length: u32, mode: AudioMode, rate_factor: u8) -> usize {
    let period = audio_frame_length as usize * IEC60958_FRAME_SIZE_BYTES;
    match mode {
        AudioMode::Standard => period,
        AudioMode::Hbr => period << (rate_factor + 1),
    }
}

/// Parsed Pc/Pd burst info together with the sizes derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstInfo {
    pub audio_mode: AudioMode,
    pub rate_factor: u8,
    /// Audio frame length in samples.
    pub audio_frame_length: u32,
    /// Data-burst length (sub-headers plus payload) in bytes.
    pub payload_length: usize,
    /// Total burst length in bytes.
    pub burst_repetition_period: usize,
    /// Size of one payload sub-header in bytes.
    pub sub_header_size: usize,
}

impl BurstInfo {
    /// Parses Pc/Pd from a preamble-aligned header.
    ///
    /// Returns `None` for anything that is not a plausible MPEG-H burst:
    /// wrong data type, reserved audio mode, reserved frame-length code or a
    /// payload length that cannot fit the burst.
    pub fn parse(header: &[u8]) -> Option<Self> {
        debug_assert!(header.len() >= IEC_HEADER_SIZE_BYTES);

        let data_type = header[5] & 0x1F;
        let audio_mode = AudioMode::from_code((header[5] >> 5) & 0x3)?;
        let frame_length_code = header[4] & 0x7;
        let rate_factor = (header[4] >> 3) & 0x3;
        let mut payload_length = u16::from_be_bytes([header[6], header[7]]) as usize;

        if data_type != MPEGH_DATA_TYPE {
            return None;
        }

        let audio_frame_length = audio_frame_length(frame_length_code)?;
        let burst_repetition_period =
            burst_repetition_period(audio_frame_length, audio_mode, rate_factor);

        // HBR expresses Pd in units of eight bytes.
        if audio_mode == AudioMode::Hbr {
            payload_length *= 8;
        }

        if payload_length
            > burst_repetition_period - IEC_HEADER_SIZE_BYTES - IEC_BURST_SPACING_SIZE_BYTES
        {
            return None;
        }

        Some(BurstInfo {
            audio_mode,
            rate_factor,
            audio_frame_length,
            payload_length,
            burst_repetition_period,
            sub_header_size: audio_mode.sub_header_size(),
        })
    }
}

/// One payload sub-header: the location of a single access unit inside the
/// burst and its PCM offset against the burst's time base.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadHeader {
    /// Byte offset of the access unit, counted from the burst start.
    pub data_offset: usize,
    /// Access-unit length in bytes; zero terminates the sub-header list.
    pub data_length: usize,
    /// Signed sample offset of the access unit's presentation time.
    pub pcm_offset: i32,
}

impl PayloadHeader {
    /// Parses one sub-header; `data` must hold `mode.sub_header_size()` bytes.
    pub fn parse(mode: AudioMode, data: &[u8]) -> Self {
        match mode {
            AudioMode::Standard => PayloadHeader {
                data_offset: u16::from_be_bytes([data[0], data[1]]) as usize,
                data_length: u16::from_be_bytes([data[2], data[3]]) as usize,
                pcm_offset: i16::from_be_bytes([data[4], data[5]]) as i32,
            },
            AudioMode::Hbr => PayloadHeader {
                data_offset: u32::from_be_bytes([0, data[0], data[1], data[2]]) as usize,
                data_length: u32::from_be_bytes([0, data[3], data[4], data[5]]) as usize,
                pcm_offset: i16::from_be_bytes([data[6], data[7]]) as i32,
            },
        }
    }

    /// Serializes one sub-header into `out`.
    pub fn write(&self, mode: AudioMode, out: &mut [u8]) {
        match mode {
            AudioMode::Standard => {
                out[..2].copy_from_slice(&(self.data_offset as u16).to_be_bytes());
                out[2..4].copy_from_slice(&(self.data_length as u16).to_be_bytes());
                out[4..6].copy_from_slice(&(self.pcm_offset as i16).to_be_bytes());
            }
            AudioMode::Hbr => {
                out[..3].copy_from_slice(&(self.data_offset as u32).to_be_bytes()[1..]);
                out[3..6].copy_from_slice(&(self.data_length as u32).to_be_bytes()[1..]);
                out[6..8].copy_from_slice(&(self.pcm_offset as i16).to_be_bytes());
            }
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.data_length == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hbr_header(frame_length_code: u8, rate_factor: u8, pd: u16) -> [u8; 8] {
        let mut header = [0u8; 8];
        header[..4].copy_from_slice(&SYNC_PREAMBLE);
        header[4] = frame_length_code | (rate_factor << 3);
        header[5] = (1 << 5) | MPEGH_DATA_TYPE;
        header[6..8].copy_from_slice(&pd.to_be_bytes());
        header
    }

    #[test]
    fn parse_hbr_burst_info() {
        let info = BurstInfo::parse(&hbr_header(0, 1, 100)).unwrap();
        assert_eq!(info.audio_mode, AudioMode::Hbr);
        assert_eq!(info.rate_factor, 1);
        assert_eq!(info.audio_frame_length, 1024);
        assert_eq!(info.payload_length, 800);
        assert_eq!(info.burst_repetition_period, 16384);
        assert_eq!(info.sub_header_size, 8);
    }

    #[test]
    fn rejects_foreign_data_type() {
        let mut header = hbr_header(0, 1, 100);
        header[5] = (1 << 5) | 10;
        assert!(BurstInfo::parse(&header).is_none());
    }

    #[test]
    fn rejects_reserved_audio_mode() {
        let mut header = hbr_header(0, 1, 100);
        header[5] = (2 << 5) | MPEGH_DATA_TYPE;
        assert!(BurstInfo::parse(&header).is_none());
    }

    #[test]
    fn rejects_reserved_frame_length_code() {
        assert!(BurstInfo::parse(&hbr_header(6, 1, 100)).is_none());
        assert!(BurstInfo::parse(&hbr_header(7, 1, 100)).is_none());
    }

    #[test]
    fn rejects_oversized_payload() {
        // 16384-byte period leaves 16368 bytes for the data burst.
        assert!(BurstInfo::parse(&hbr_header(0, 1, 2046)).is_some());
        assert!(BurstInfo::parse(&hbr_header(0, 1, 2047)).is_none());
    }

    #[test]
    fn frame_length_table() {
        let lengths: Vec<_> = (0u8..6).map(|c| audio_frame_length(c).unwrap()).collect();
        assert_eq!(lengths, [1024, 2048, 4096, 768, 1536, 3072]);
        assert!(audio_frame_length(6).is_none());
    }

    #[test]
    fn sub_header_round_trip() {
        let header = PayloadHeader {
            data_offset: 0x012345,
            data_length: 0x00FFEE,
            pcm_offset: -1024,
        };

        let mut raw = [0u8; 8];
        header.write(AudioMode::Hbr, &mut raw);
        assert_eq!(raw, [0x01, 0x23, 0x45, 0x00, 0xFF, 0xEE, 0xFC, 0x00]);
        assert_eq!(PayloadHeader::parse(AudioMode::Hbr, &raw), header);

        let header = PayloadHeader {
            data_offset: 24,
            data_length: 100,
            pcm_offset: 0,
        };
        let mut raw = [0u8; 6];
        header.write(AudioMode::Standard, &mut raw);
        assert_eq!(PayloadHeader::parse(AudioMode::Standard, &raw), header);
    }

    #[test]
    fn terminator_is_all_zero() {
        let mut raw = [0xFFu8; 8];
        PayloadHeader::default().write(AudioMode::Hbr, &mut raw);
        assert_eq!(raw, [0u8; 8]);
        assert!(PayloadHeader::parse(AudioMode::Hbr, &raw).is_terminator());
    }
}
