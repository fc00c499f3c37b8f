use crate::structs::burst::{
    burst_repetition_period, AudioMode, PayloadHeader, RateFactor, IEC61937_AUDIOFRAME_LENGTH,
    IEC_BURST_SPACING_SIZE_BYTES, IEC_HEADER_SIZE_BYTES, MAX_MPEGH_FRAME_DURATION,
    MAX_MPEGH_FRAME_SIZE, MPEGH_DATA_TYPE, SYNC_PREAMBLE,
};
use crate::utils::errors::EncodeError;

/// Most access units queued at once.
const MAX_NUM_MPEGH_FRAMES: usize = 5;

const WORK_BUFFER_SIZE_BYTES: usize = MAX_NUM_MPEGH_FRAMES * MAX_MPEGH_FRAME_SIZE;

/// Packs MPEG-H access units into IEC 61937-13 data bursts.
///
/// Access units are queued together with their durations until one audio
/// frame's worth of samples (1024 at 48 kHz) has accumulated; each
/// [`process`](Encoder::process) call then emits at most one fixed-length
/// burst. A unit that does not fit the remaining payload is split and its
/// tail leads the next burst without a sub-header of its own.
#[derive(Debug)]
pub struct Encoder {
    audio_mode: AudioMode,
    rate_code: u8,
    burst_repetition_period: usize,
    sub_header_size: usize,
    audio_frame_length: u32,

    pcm_offset: i32,
    overall_duration: i32,

    work: Vec<u8>,
    queued: usize,
    frame_length: [usize; MAX_NUM_MPEGH_FRAMES],
    frame_duration: [u32; MAX_NUM_MPEGH_FRAMES],
    /// The first queued entry is the tail of a unit split by the previous
    /// burst; it gets no sub-header.
    au_pending: bool,
}

/// Result of one [`Encoder::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOutput {
    /// Bytes written to the output buffer; zero or one full burst.
    pub size: usize,
    /// False when the access unit was deferred; the caller must pass the
    /// same unit again after consuming the produced burst.
    pub input_consumed: bool,
}

impl Encoder {
    pub fn new(rate_factor: RateFactor) -> Self {
        let audio_mode = AudioMode::Hbr;
        let audio_frame_length = IEC61937_AUDIOFRAME_LENGTH;
        Self {
            audio_mode,
            rate_code: rate_factor.code(),
            burst_repetition_period: burst_repetition_period(
                audio_frame_length,
                audio_mode,
                rate_factor.code(),
            ),
            sub_header_size: audio_mode.sub_header_size(),
            audio_frame_length,
            pcm_offset: 0,
            overall_duration: 0,
            work: Vec::with_capacity(WORK_BUFFER_SIZE_BYTES),
            queued: 0,
            frame_length: [0; MAX_NUM_MPEGH_FRAMES],
            frame_duration: [0; MAX_NUM_MPEGH_FRAMES],
            au_pending: false,
        }
    }

    /// Total burst length in bytes; every produced burst has exactly this
    /// size and the output buffer must be able to hold it.
    pub fn burst_size(&self) -> usize {
        self.burst_repetition_period
    }

    /// Queues one access unit and emits at most one burst into `out`.
    ///
    /// `duration` is the unit's length in PCM samples (the PTS difference
    /// to the next unit). When `input_consumed` comes back false the unit
    /// was deferred and must be passed again after the burst in `out` has
    /// been consumed.
    pub fn process(
        &mut self,
        access_unit: &[u8],
        duration: u32,
        out: &mut [u8],
    ) -> Result<EncodeOutput, EncodeError> {
        if out.len() < self.burst_repetition_period {
            return Err(EncodeError::OutputBufferTooSmall {
                needed: self.burst_repetition_period,
                provided: out.len(),
            });
        }
        if duration > MAX_MPEGH_FRAME_DURATION {
            return Err(EncodeError::DurationTooLong {
                duration,
                max: MAX_MPEGH_FRAME_DURATION,
            });
        }

        // A full audio frame is already queued; emit first, defer the input.
        let accept = !access_unit.is_empty()
            && self.overall_duration < self.audio_frame_length as i32;

        let mut input_consumed = false;
        let mut planned = None;

        if accept {
            if self.queued + 1 >= MAX_NUM_MPEGH_FRAMES {
                return Err(EncodeError::QueueFull);
            }
            if self.work.len() + access_unit.len() > WORK_BUFFER_SIZE_BYTES {
                return Err(EncodeError::WorkBufferFull {
                    len: access_unit.len(),
                    free: WORK_BUFFER_SIZE_BYTES - self.work.len(),
                });
            }

            input_consumed = true;
            self.overall_duration += duration as i32;

            self.work.extend_from_slice(access_unit);
            self.frame_length[self.queued] = access_unit.len();
            self.frame_duration[self.queued] = duration;
            self.queued += 1;

            let writable = self.writable_frames();
            planned = Some(writable);

            if self.overall_duration < self.audio_frame_length as i32 || writable == 0 {
                return Ok(EncodeOutput {
                    size: 0,
                    input_consumed,
                });
            }
        }

        let writable = planned.unwrap_or_else(|| self.writable_frames());
        let size = self.write_burst(writable, out);
        self.overall_duration -= self.audio_frame_length as i32;
        self.pcm_offset -= self.audio_frame_length as i32;

        Ok(EncodeOutput {
            size,
            input_consumed,
        })
    }

    /// Emits one burst from the queued units without accepting new input;
    /// returns the number of bytes written, zero once the queue is empty.
    ///
    /// Units queued short of a full audio frame would be lost at end of
    /// stream; call until zero to drain them.
    pub fn flush(&mut self, out: &mut [u8]) -> Result<usize, EncodeError> {
        if out.len() < self.burst_repetition_period {
            return Err(EncodeError::OutputBufferTooSmall {
                needed: self.burst_repetition_period,
                provided: out.len(),
            });
        }
        if self.queued == 0 {
            return Ok(0);
        }

        let writable = self.writable_frames();
        let size = self.write_burst(writable, out);
        // The queued durations are exhausted while draining; pinning the
        // accumulator at zero keeps a multi-burst tail flowing.
        self.overall_duration = (self.overall_duration - self.audio_frame_length as i32).max(0);
        self.pcm_offset -= self.audio_frame_length as i32;
        Ok(size)
    }

    /// Number of queued units the next burst can carry: bounded by the
    /// payload bytes left after headers and by the accumulated duration.
    fn writable_frames(&self) -> usize {
        let mut available =
            self.burst_repetition_period - IEC_HEADER_SIZE_BYTES - IEC_BURST_SPACING_SIZE_BYTES;
        if !self.au_pending {
            available -= self.sub_header_size;
        }

        let mut write_length = 0;
        let mut duration = 0i32;
        let mut count = 0;
        while write_length < available
            && duration <= self.overall_duration
            && count != self.queued
        {
            write_length += self.frame_length[count] + self.sub_header_size;
            duration += self.frame_duration[count] as i32;
            count += 1;
        }
        count
    }

    /// Writes one complete burst and maintains the queue, keeping the
    /// remainder of a split unit as the new queue head.
    fn write_burst(&mut self, frames_to_write: usize, out: &mut [u8]) -> usize {
        let shs = self.sub_header_size;

        let mut available =
            self.burst_repetition_period - IEC_HEADER_SIZE_BYTES - IEC_BURST_SPACING_SIZE_BYTES;
        if !self.au_pending {
            available -= shs;
        }
        let mut payload_length = 0;
        for i in 0..frames_to_write {
            payload_length += self.frame_length[i];
            available -= shs;
        }

        let sub_headers = frames_to_write - self.au_pending as usize;
        let written_payload = payload_length.min(available);

        // Pa Pb Pc Pd
        out[..4].copy_from_slice(&SYNC_PREAMBLE);
        out[4] = self.rate_code << 3;
        out[5] = (self.audio_mode.code() << 5) | MPEGH_DATA_TYPE;
        let data_burst_length_bytes = written_payload + (sub_headers + 1) * shs;
        let data_burst_length = match self.audio_mode {
            AudioMode::Hbr => (data_burst_length_bytes + 7) >> 3,
            AudioMode::Standard => data_burst_length_bytes,
        };
        out[6..8].copy_from_slice(&(data_burst_length as u16).to_be_bytes());

        // Sub-headers; a pending tail occupies the front of the payload
        // but is described by the previous burst.
        let mut data_offset = IEC_HEADER_SIZE_BYTES + (sub_headers + 1) * shs;
        let mut pos = IEC_HEADER_SIZE_BYTES;
        let mut frame = 0;
        if self.au_pending {
            data_offset += self.frame_length[frame];
            frame += 1;
        }
        for _ in 0..sub_headers {
            PayloadHeader {
                data_offset,
                data_length: self.frame_length[frame],
                pcm_offset: self.pcm_offset,
            }
            .write(self.audio_mode, &mut out[pos..pos + shs]);

            self.pcm_offset += self.frame_duration[frame] as i32;
            data_offset += self.frame_length[frame];
            pos += shs;
            frame += 1;
        }
        PayloadHeader::default().write(self.audio_mode, &mut out[pos..pos + shs]);
        pos += shs;

        // Payload, zero padding and burst spacing.
        out[pos..pos + written_payload].copy_from_slice(&self.work[..written_payload]);
        out[pos + written_payload..self.burst_repetition_period].fill(0);

        // Pop fully written units; a split unit shrinks to its remainder.
        let mut delete = 0;
        for i in 0..frames_to_write {
            if i == frames_to_write - 1 && payload_length > available {
                self.au_pending = true;
                self.frame_length[i] = payload_length - available;
                self.frame_duration[i] = 0;
            } else {
                self.au_pending = false;
                self.frame_length[i] = 0;
                self.frame_duration[i] = 0;
                delete += 1;
            }
        }
        if delete > 0 {
            self.queued -= delete;
            self.frame_length.copy_within(delete..delete + self.queued, 0);
            self.frame_duration
                .copy_within(delete..delete + self.queued, 0);
        }
        self.work.drain(..written_payload);

        self.burst_repetition_period
    }
}
