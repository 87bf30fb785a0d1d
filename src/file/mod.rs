//! Byte-level access to module images and the files they are stored in.
//!
//! - [`io`] - endian-aware primitive reads and writes with bounds checking
//! - [`parser`] - cursor-based [`Parser`](parser::Parser) for decoding images
//! - [`writer`] - the [`Writer`](writer::Writer) used when re-serializing rewritten images
//! - `physical` - memory-mapped read-only files for on-disk archives and debug artifacts

pub mod io;
pub mod parser;
pub mod writer;

mod physical;

pub(crate) use physical::Physical;
