//! IEC 61937-13 transport of MPEG-H 3D Audio.
//!
//! IEC 61937-13 packetizes variable-length MPEG-H access units into
//! fixed-length "data bursts" suitable for IEC 60958 (S/PDIF-style) links.
//! Each burst starts with the Pa/Pb sync preamble and the Pc/Pd burst
//! info, followed by a list of payload sub-headers locating the access
//! units inside the burst, the unit payload itself, zero padding and an
//! all-zero burst spacing. An access unit that does not fit the remaining
//! payload continues at the front of the next burst.
//!
//! Both directions are covered:
//!
//! 1. **Encoding** ([`process::encode::Encoder`]): queue access units with
//!    their durations, emit one burst whenever an audio frame's worth of
//!    samples has accumulated.
//! 2. **Decoding** ([`process::decode::Decoder`]): feed arbitrary byte
//!    chunks, recover burst boundaries by preamble search and validation,
//!    and extract access units together with the PCM offsets needed to
//!    reconstruct presentation timestamps.
//!
//! ```rust,no_run
//! use iec61937::process::decode::{DecodeOutput, Decoder};
//! use iec61937::process::encode::Encoder;
//! use iec61937::structs::burst::{RateFactor, MAX_MPEGH_FRAME_SIZE};
//!
//! let mut encoder = Encoder::new(RateFactor::X4);
//! let mut burst = vec![0u8; encoder.burst_size()];
//!
//! let access_unit = [0x2Au8; 512]; // one MPEG-H access unit
//! let output = encoder.process(&access_unit, 1024, &mut burst)?;
//!
//! let mut decoder = Decoder::default();
//! decoder.feed(&burst[..output.size])?;
//!
//! let mut unit = vec![0u8; MAX_MPEGH_FRAME_SIZE];
//! while let DecodeOutput::AccessUnit { size, .. } = decoder.process(&mut unit)? {
//!     println!("recovered {size} bytes");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The decoder never fails on malformed wire data: invalid headers, wrong
//! burst spacing and inconsistent sub-header lists are skipped silently and
//! synchronization restarts at the next preamble. Only a violated
//! reassembly invariant surfaces as an error, after which the decoder has
//! reset itself and resynchronizes.

/// Packetization state machines.
///
/// 1. **Encoding** ([`process::encode`]): access-unit accumulation and
///    burst emission with split handling.
/// 2. **Decoding** ([`process::decode`]): sync search, burst validation
///    and access-unit extraction with split reassembly.
pub mod process;

/// Data structures of the transport format.
///
/// - **Burst framing** ([`structs::burst`]): preamble, burst info, payload
///   sub-headers and the size constants shared by both directions.
/// - **MHAS packages** ([`structs::mhas`]): random-access-point detection.
pub mod structs;

/// Supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): bit-level reading.
/// - **Error types** ([`utils::errors`]).
pub mod utils;
