/// Burst decoding: sync search and access-unit extraction.
///
/// Provides the [`Decoder`](decode::Decoder) that turns an IEC 61937-13
/// byte stream back into MPEG-H access units with their PCM offsets.
pub mod decode;

/// Burst encoding: access-unit accumulation and burst emission.
///
/// Provides the [`Encoder`](encode::Encoder) that packs MPEG-H access
/// units into fixed-length IEC 61937-13 data bursts.
pub mod encode;
