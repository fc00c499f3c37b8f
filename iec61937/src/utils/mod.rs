/// Bitstream reading over byte slices ([`bitstream_io::BsIoSliceReader`]).
pub mod bitstream_io;

/// Error types for both sides of the codec.
pub mod errors;
