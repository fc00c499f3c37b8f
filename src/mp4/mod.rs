//! Minimal ISO BMFF support for the two subcommands: reading the first
//! `mhm1` track of an MP4 file and writing one back out.

pub mod boxes;
pub mod reader;
pub mod sample_table;
pub mod writer;
