use log::{debug, trace};

use crate::structs::burst::{
    BurstInfo, PayloadHeader, IEC_BURST_SPACING_SIZE_BYTES, IEC_HEADER_SIZE_BYTES,
    MAX_IEC61937_FRAME_SIZE_BYTES, MAX_MPEGH_FRAME_SIZE, SYNC_PREAMBLE,
};
use crate::utils::errors::DecodeError;

/// Three times the largest burst; enough to hold a burst however the input
/// is chunked.
const WORK_BUFFER_SIZE_BYTES: usize = 3 * MAX_IEC61937_FRAME_SIZE_BYTES;

/// Extracts MPEG-H access units from an IEC 61937-13 byte stream.
///
/// Burst boundaries are located by scanning for the sync preamble and
/// validated against the burst spacing and the payload sub-header list;
/// anything that does not validate is skipped and the scan continues.
/// Access units split across two bursts are reassembled internally.
///
/// # Example
///
/// ```rust,no_run
/// use iec61937::process::decode::{DecodeOutput, Decoder};
/// use iec61937::structs::burst::MAX_MPEGH_FRAME_SIZE;
///
/// let mut decoder = Decoder::default();
/// let mut au = vec![0u8; MAX_MPEGH_FRAME_SIZE];
///
/// let data = std::fs::read("stream.iec")?;
/// decoder.feed(&data)?;
///
/// while let DecodeOutput::AccessUnit { size, pcm_offset, .. } = decoder.process(&mut au)? {
///     if size > 0 {
///         println!("access unit: {size} bytes at PCM offset {pcm_offset}");
///     }
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Decoder {
    work: Vec<u8>,
    sync: Sync,
    pending: Vec<u8>,
    pending_missing: usize,
    pending_pcm_offset: i32,
}

/// Synchronization progress. A held candidate always sits at work-buffer
/// offset zero.
#[derive(Debug, Clone, Copy)]
enum Sync {
    Searching,
    Candidate(BurstInfo),
    Locked {
        info: BurstInfo,
        sub_headers: usize,
        next_sub_header: usize,
    },
}

/// Result of one [`Decoder::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutput {
    /// One access unit was produced. `size` may be zero: a burst that
    /// carries no complete access unit still reports progress this way.
    AccessUnit {
        /// Bytes written to the output buffer.
        size: usize,
        /// Signed PCM offset of the access unit against the burst time base.
        pcm_offset: i32,
        /// The burst's audio frame length in samples; together with
        /// `burst_complete` this reconstructs presentation timestamps.
        audio_frame_length: u32,
        /// True once the current burst is fully consumed; the caller's
        /// time line advances by `audio_frame_length` samples.
        burst_complete: bool,
    },
    /// Nothing can be produced until more input is fed.
    NeedData,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            work: Vec::with_capacity(WORK_BUFFER_SIZE_BYTES),
            sync: Sync::Searching,
            pending: Vec::with_capacity(MAX_MPEGH_FRAME_SIZE),
            pending_missing: 0,
            pending_pcm_offset: 0,
        }
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw stream bytes to the work buffer.
    ///
    /// Chunking is arbitrary; a preamble or burst split across `feed` calls
    /// is handled transparently.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        if self.work.len() + data.len() > WORK_BUFFER_SIZE_BYTES {
            return Err(DecodeError::WorkBufferFull {
                fed: data.len(),
                used: self.work.len(),
                capacity: WORK_BUFFER_SIZE_BYTES,
            });
        }
        self.work.extend_from_slice(data);
        Ok(())
    }

    /// Produces at most one access unit into `out`.
    ///
    /// Call repeatedly until [`DecodeOutput::NeedData`] is returned. On
    /// [`DecodeError::OutputBufferTooSmall`] the decoder state is untouched
    /// and the call may be repeated with a larger buffer; pending-data
    /// errors reset the decoder, which then resynchronizes from the next
    /// preamble.
    pub fn process(&mut self, out: &mut [u8]) -> Result<DecodeOutput, DecodeError> {
        if !self.synchronize() {
            return Ok(DecodeOutput::NeedData);
        }

        let Sync::Locked {
            info,
            sub_headers,
            next_sub_header,
        } = self.sync
        else {
            unreachable!("synchronize() leaves the decoder locked");
        };
        let audio_frame_length = info.audio_frame_length;

        if self.pending_missing > 0 {
            if sub_headers == 0 {
                // The whole burst continues the pending access unit.
                let Some(available) = info.payload_length.checked_sub(info.sub_header_size) else {
                    return Err(self.fail(DecodeError::PendingDataOverrun {
                        missing: self.pending_missing,
                        available: 0,
                    }));
                };
                let data_index = IEC_HEADER_SIZE_BYTES + info.sub_header_size;

                if self.pending_missing > available {
                    if self.pending.len() + available > MAX_MPEGH_FRAME_SIZE {
                        return Err(self.fail(DecodeError::PendingDataTooLarge {
                            max: MAX_MPEGH_FRAME_SIZE,
                        }));
                    }
                    self.pending
                        .extend_from_slice(&self.work[data_index..data_index + available]);
                    self.pending_missing -= available;
                    self.pending_pcm_offset -= audio_frame_length as i32;
                    // Not complete yet; fall through and consume the burst.
                } else if self.pending_missing == available {
                    let size = self.pending.len() + self.pending_missing;
                    if size > out.len() {
                        return Err(self.fail(DecodeError::OutputBufferTooSmall {
                            needed: size,
                            provided: out.len(),
                        }));
                    }
                    out[..self.pending.len()].copy_from_slice(&self.pending);
                    out[self.pending.len()..size]
                        .copy_from_slice(&self.work[data_index..data_index + self.pending_missing]);
                    let pcm_offset = self.pending_pcm_offset;
                    self.reset_pending();
                    return Ok(DecodeOutput::AccessUnit {
                        size,
                        pcm_offset,
                        audio_frame_length,
                        burst_complete: false,
                    });
                } else {
                    return Err(self.fail(DecodeError::PendingDataOverrun {
                        missing: self.pending_missing,
                        available,
                    }));
                }
            } else {
                // The first sub-header's offset locates the continuation:
                // it occupies the bytes right before the first new unit.
                let size = self.pending.len() + self.pending_missing;
                if size > out.len() {
                    return Err(self.fail(DecodeError::OutputBufferTooSmall {
                        needed: size,
                        provided: out.len(),
                    }));
                }

                let header_index = IEC_HEADER_SIZE_BYTES;
                let sub = PayloadHeader::parse(
                    info.audio_mode,
                    &self.work[header_index..header_index + info.sub_header_size],
                );
                if sub.data_offset < self.pending_missing {
                    return Err(self.fail(DecodeError::PendingDataOffset {
                        data_offset: sub.data_offset,
                        missing: self.pending_missing,
                    }));
                }
                let data_index = sub.data_offset - self.pending_missing;

                out[..self.pending.len()].copy_from_slice(&self.pending);
                out[self.pending.len()..size]
                    .copy_from_slice(&self.work[data_index..data_index + self.pending_missing]);
                let pcm_offset = self.pending_pcm_offset;
                self.reset_pending();
                // The sub-header cursor stays put: the first sub-header
                // describes the first unit starting in this burst.
                return Ok(DecodeOutput::AccessUnit {
                    size,
                    pcm_offset,
                    audio_frame_length,
                    burst_complete: false,
                });
            }
        }

        let mut size = 0;
        let mut pcm_offset = 0;
        let mut next_sub_header = next_sub_header;

        if next_sub_header < sub_headers {
            let header_index = IEC_HEADER_SIZE_BYTES + next_sub_header * info.sub_header_size;
            let sub = PayloadHeader::parse(
                info.audio_mode,
                &self.work[header_index..header_index + info.sub_header_size],
            );

            if sub.data_length > out.len() {
                return Err(self.fail(DecodeError::OutputBufferTooSmall {
                    needed: sub.data_length,
                    provided: out.len(),
                }));
            }

            if sub.data_offset + sub.data_length > IEC_HEADER_SIZE_BYTES + info.payload_length {
                // Unit continues in the next burst; stash the prefix.
                if sub.data_length > MAX_MPEGH_FRAME_SIZE {
                    return Err(self.fail(DecodeError::PendingDataTooLarge {
                        max: MAX_MPEGH_FRAME_SIZE,
                    }));
                }
                let prefix = info.payload_length - sub.data_offset + IEC_HEADER_SIZE_BYTES;
                self.pending
                    .extend_from_slice(&self.work[sub.data_offset..sub.data_offset + prefix]);
                self.pending_missing = sub.data_length - prefix;
                self.pending_pcm_offset = sub.pcm_offset - audio_frame_length as i32;
            } else {
                out[..sub.data_length]
                    .copy_from_slice(&self.work[sub.data_offset..sub.data_offset + sub.data_length]);
                size = sub.data_length;
                pcm_offset = sub.pcm_offset;
            }

            next_sub_header += 1;
        }

        let burst_complete = next_sub_header == sub_headers;
        if burst_complete {
            self.work.drain(..info.burst_repetition_period);
            self.sync = Sync::Searching;
        } else {
            self.sync = Sync::Locked {
                info,
                sub_headers,
                next_sub_header,
            };
        }

        Ok(DecodeOutput::AccessUnit {
            size,
            pcm_offset,
            audio_frame_length,
            burst_complete,
        })
    }

    /// Runs sync search and burst validation until a burst is locked or the
    /// buffered input is exhausted.
    fn synchronize(&mut self) -> bool {
        loop {
            match self.sync {
                Sync::Locked { .. } => return true,
                Sync::Searching => {
                    if !self.search_candidate() {
                        return false;
                    }
                }
                Sync::Candidate(info) => {
                    if self.work.len() < info.burst_repetition_period {
                        return false;
                    }

                    if !self.burst_spacing_is_zero(&info) {
                        debug!("sync candidate with non-zero burst spacing, skipping header");
                        self.work.drain(..IEC_HEADER_SIZE_BYTES);
                        self.sync = Sync::Searching;
                        continue;
                    }

                    match self.validate_sub_headers(&info) {
                        Some(sub_headers) => {
                            self.sync = Sync::Locked {
                                info,
                                sub_headers,
                                next_sub_header: 0,
                            };
                            return true;
                        }
                        None => {
                            debug!("sync candidate with inconsistent sub-headers, skipping header");
                            self.work.drain(..IEC_HEADER_SIZE_BYTES);
                            self.sync = Sync::Searching;
                            self.reset_pending();
                        }
                    }
                }
            }
        }
    }

    /// Scans for the next parseable burst header and compacts the work
    /// buffer so it sits at offset zero.
    fn search_candidate(&mut self) -> bool {
        let len = self.work.len();
        if len < IEC_HEADER_SIZE_BYTES {
            return false;
        }

        for i in 0..=(len - IEC_HEADER_SIZE_BYTES) {
            if self.work[i..i + 4] != SYNC_PREAMBLE {
                continue;
            }
            match BurstInfo::parse(&self.work[i..i + IEC_HEADER_SIZE_BYTES]) {
                Some(info) => {
                    self.work.drain(..i);
                    self.sync = Sync::Candidate(info);
                    return true;
                }
                None => trace!("preamble at offset {i} is not an MPEG-H burst"),
            }
        }

        // A preamble may start in the last few bytes; keep that tail so it
        // survives into the next feed.
        let keep = IEC_HEADER_SIZE_BYTES - 1;
        if len > keep {
            self.work.drain(..len - keep);
        }
        false
    }

    fn burst_spacing_is_zero(&self, info: &BurstInfo) -> bool {
        let period = info.burst_repetition_period;
        self.work[period - IEC_BURST_SPACING_SIZE_BYTES..period]
            .iter()
            .all(|&b| b == 0)
    }

    /// Walks the sub-header list and returns the number of entries before
    /// the terminator, or `None` if the list is inconsistent.
    fn validate_sub_headers(&self, info: &BurstInfo) -> Option<usize> {
        let header_end = info.burst_repetition_period - IEC_BURST_SPACING_SIZE_BYTES;
        let mut pos = IEC_HEADER_SIZE_BYTES;
        let mut count = 0;
        let mut first_offset = 0;
        let mut previous_offset = 0;

        loop {
            if pos + info.sub_header_size > header_end {
                return None;
            }
            let sub =
                PayloadHeader::parse(info.audio_mode, &self.work[pos..pos + info.sub_header_size]);
            pos += info.sub_header_size;

            if sub.is_terminator() {
                break;
            }

            if count == 0 {
                first_offset = sub.data_offset;
            } else if sub.data_offset <= previous_offset {
                return None;
            }
            previous_offset = sub.data_offset;

            if sub.data_offset > info.payload_length {
                return None;
            }
            count += 1;
        }

        if count > 0 {
            let headers_len = pos - IEC_HEADER_SIZE_BYTES;
            if first_offset < headers_len + IEC_HEADER_SIZE_BYTES + self.pending_missing {
                return None;
            }
        }

        Some(count)
    }

    /// Routes an error out of [`process`](Decoder::process): reassembly
    /// violations abandon sync, parser and pending state so the stream
    /// resynchronizes from the next preamble; any other error leaves the
    /// decoder untouched and the call can be retried.
    fn fail(&mut self, err: DecodeError) -> DecodeError {
        if err.is_pending_data() {
            self.reset_all();
        }
        err
    }

    fn reset_pending(&mut self) {
        self.pending.clear();
        self.pending_missing = 0;
        self.pending_pcm_offset = 0;
    }

    fn reset_all(&mut self) {
        self.sync = Sync::Searching;
        self.reset_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::encode::Encoder;
    use crate::structs::burst::RateFactor;

    fn test_au(len: usize, seed: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 37 + seed) % 256) as u8).collect()
    }

    fn encode_stream(rate_factor: RateFactor, units: &[(Vec<u8>, u32)]) -> Vec<u8> {
        let mut encoder = Encoder::new(rate_factor);
        let mut burst = vec![0u8; MAX_IEC61937_FRAME_SIZE_BYTES];
        let mut stream = Vec::new();

        for (au, duration) in units {
            loop {
                let output = encoder.process(au, *duration, &mut burst).unwrap();
                stream.extend_from_slice(&burst[..output.size]);
                if output.input_consumed {
                    break;
                }
            }
        }
        loop {
            let written = encoder.flush(&mut burst).unwrap();
            if written == 0 {
                break;
            }
            stream.extend_from_slice(&burst[..written]);
        }
        stream
    }

    fn decode_stream(data: &[u8], chunk_size: usize) -> Vec<(Vec<u8>, i32, i64)> {
        let mut decoder = Decoder::default();
        let mut out = vec![0u8; MAX_MPEGH_FRAME_SIZE];
        let mut units = Vec::new();
        let mut time_base = 0i64;

        for chunk in data.chunks(chunk_size.max(1)) {
            decoder.feed(chunk).unwrap();
            loop {
                match decoder.process(&mut out).unwrap() {
                    DecodeOutput::AccessUnit {
                        size,
                        pcm_offset,
                        audio_frame_length,
                        burst_complete,
                    } => {
                        if size > 0 {
                            units.push((out[..size].to_vec(), pcm_offset, time_base));
                        }
                        if burst_complete {
                            time_base += audio_frame_length as i64;
                        }
                    }
                    DecodeOutput::NeedData => break,
                }
            }
        }
        units
    }

    #[test]
    fn single_unit_burst() {
        let au = test_au(100, 7);
        let stream = encode_stream(RateFactor::X4, &[(au.clone(), 1024)]);
        assert_eq!(stream.len(), 16384);

        let units = decode_stream(&stream, stream.len());
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, au);
        assert_eq!(units[0].1, 0);
    }

    #[test]
    fn reports_frame_length_and_completion() {
        let stream = encode_stream(RateFactor::X4, &[(test_au(100, 7), 1024)]);

        let mut decoder = Decoder::default();
        decoder.feed(&stream).unwrap();
        let mut out = vec![0u8; MAX_MPEGH_FRAME_SIZE];
        let output = decoder.process(&mut out).unwrap();
        assert_eq!(
            output,
            DecodeOutput::AccessUnit {
                size: 100,
                pcm_offset: 0,
                audio_frame_length: 1024,
                burst_complete: true,
            }
        );
        assert_eq!(decoder.process(&mut out).unwrap(), DecodeOutput::NeedData);
    }

    #[test]
    fn accumulated_burst_yields_units_in_order() {
        let units: Vec<_> = (0..4).map(|i| (test_au(500, i), 256u32)).collect();
        let stream = encode_stream(RateFactor::X16, &units);
        assert_eq!(stream.len(), 65536);

        let decoded = decode_stream(&stream, 4096);
        assert_eq!(decoded.len(), 4);
        for (i, (au, pcm_offset, time_base)) in decoded.iter().enumerate() {
            assert_eq!(*au, units[i].0);
            assert_eq!(*pcm_offset, 256 * i as i32);
            assert_eq!(*time_base, 0);
        }
    }

    #[test]
    fn reassembles_split_unit() {
        // First unit overflows the burst payload; its tail rides in the
        // next burst ahead of the second unit.
        let big = test_au(20000, 3);
        let small = test_au(1000, 11);
        let stream = encode_stream(
            RateFactor::X4,
            &[(big.clone(), 1024), (small.clone(), 1024)],
        );
        assert_eq!(stream.len(), 2 * 16384);

        let decoded = decode_stream(&stream, 1000);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].0, big);
        assert_eq!(decoded[0].1 + decoded[0].2 as i32, 0);
        assert_eq!(decoded[1].0, small);
        assert_eq!(decoded[1].1 + decoded[1].2 as i32, 1024);
    }

    #[test]
    fn reassembles_tail_only_continuation() {
        // The tail is drained by flush into a burst of its own. 16448
        // bytes leave a 96-byte remainder, a multiple of eight, so the
        // continuation burst advertises its payload exactly.
        let big = test_au(16448, 5);
        let stream = encode_stream(RateFactor::X4, &[(big.clone(), 1024)]);
        assert_eq!(stream.len(), 2 * 16384);

        let decoded = decode_stream(&stream, 777);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].0, big);
        assert_eq!(decoded[0].1 + decoded[0].2 as i32, 0);
    }

    #[test]
    fn reassembles_tail_spanning_several_bursts() {
        // 40000 bytes: one burst with the sub-header, one full continuation
        // burst and a final 7288-byte tail, all drained by flush.
        let big = test_au(40000, 9);
        let stream = encode_stream(RateFactor::X4, &[(big.clone(), 1024)]);
        assert_eq!(stream.len(), 3 * 16384);

        let decoded = decode_stream(&stream, 4096);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].0, big);
        assert_eq!(decoded[0].1 + decoded[0].2 as i32, 0);
    }

    #[test]
    fn resyncs_after_garbage() {
        let au = test_au(100, 7);
        let mut data = test_au(1024, 99);
        // Scrub accidental preambles from the garbage prefix.
        for i in 0..data.len() - 1 {
            if data[i] == SYNC_PREAMBLE[0] && data[i + 1] == SYNC_PREAMBLE[1] {
                data[i] = 0;
            }
        }
        let stream = encode_stream(RateFactor::X4, &[(au.clone(), 1024)]);
        data.extend_from_slice(&stream);

        let decoded = decode_stream(&data, 128);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].0, au);
    }

    #[test]
    fn skips_candidate_with_wrong_data_type() {
        let au = test_au(64, 1);
        let mut data = Vec::new();
        // A well-formed preamble whose Pc carries data type 10.
        data.extend_from_slice(&SYNC_PREAMBLE);
        data.extend_from_slice(&[1 << 3, (1 << 5) | 10, 0x00, 0x40]);
        data.extend_from_slice(&encode_stream(RateFactor::X4, &[(au.clone(), 1024)]));

        let decoded = decode_stream(&data, data.len());
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].0, au);
    }

    #[test]
    fn chunking_is_irrelevant() {
        let units: Vec<_> = vec![
            (test_au(100, 1), 1024u32),
            (test_au(17000, 2), 1024),
            (test_au(8, 3), 1024),
            (test_au(3000, 4), 1024),
        ];
        let stream = encode_stream(RateFactor::X4, &units);

        let reference = decode_stream(&stream, stream.len());
        assert_eq!(reference.len(), 4);
        for chunk_size in [1, 7, 512, 16384, 16385] {
            assert_eq!(decode_stream(&stream, chunk_size), reference);
        }
    }

    #[test]
    fn round_trip_reconstructs_durations() {
        let units: Vec<_> = vec![
            (test_au(312, 1), 1024u32),
            (test_au(4096, 2), 1024),
            (test_au(555, 3), 1024),
            (test_au(64, 4), 1024),
        ];
        let stream = encode_stream(RateFactor::X16, &units);
        let decoded = decode_stream(&stream, 9999);

        assert_eq!(decoded.len(), units.len());
        let pts: Vec<i64> = decoded
            .iter()
            .map(|(_, pcm_offset, time_base)| time_base + *pcm_offset as i64)
            .collect();
        for pair in pts.windows(2) {
            assert_eq!(pair[1] - pair[0], 1024);
        }
    }

    #[test]
    fn decodes_standard_mode_burst() {
        // Hand-built audio_mode 0 burst: 4096-byte period, 6-byte
        // sub-headers, Pd counted in plain bytes.
        let au = test_au(20, 2);
        let mut burst = vec![0u8; 4096];
        burst[..4].copy_from_slice(&SYNC_PREAMBLE);
        burst[4] = 0;
        burst[5] = 25;
        burst[6..8].copy_from_slice(&32u16.to_be_bytes());
        burst[8..10].copy_from_slice(&20u16.to_be_bytes());
        burst[10..12].copy_from_slice(&20u16.to_be_bytes());
        burst[12..14].copy_from_slice(&0u16.to_be_bytes());
        burst[20..40].copy_from_slice(&au);

        let decoded = decode_stream(&burst, 512);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].0, au);
        assert_eq!(decoded[0].1, 0);
    }

    #[test]
    fn feed_rejects_overflow() {
        let mut decoder = Decoder::default();
        decoder.feed(&vec![0u8; WORK_BUFFER_SIZE_BYTES]).unwrap();
        assert!(matches!(
            decoder.feed(&[0u8]),
            Err(DecodeError::WorkBufferFull { .. })
        ));
    }

    #[test]
    fn small_output_buffer_is_recoverable() {
        let au = test_au(100, 7);
        let stream = encode_stream(RateFactor::X4, &[(au.clone(), 1024)]);

        let mut decoder = Decoder::default();
        decoder.feed(&stream).unwrap();
        let mut small = [0u8; 10];
        assert!(matches!(
            decoder.process(&mut small),
            Err(DecodeError::OutputBufferTooSmall {
                needed: 100,
                provided: 10
            })
        ));

        let mut out = vec![0u8; MAX_MPEGH_FRAME_SIZE];
        match decoder.process(&mut out).unwrap() {
            DecodeOutput::AccessUnit { size, .. } => assert_eq!(&out[..size], &au[..]),
            other => panic!("expected access unit, got {other:?}"),
        }
    }
}
