/// IEC 61937-13 burst framing: preamble and size constants, Pc/Pd burst
/// info ([`burst::BurstInfo`]) and payload sub-headers
/// ([`burst::PayloadHeader`]).
pub mod burst;

/// MHAS package-list scanning ([`mhas::is_random_access_point`]).
pub mod mhas;
