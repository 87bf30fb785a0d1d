use crate::Result;

use memmap2::Mmap;
use std::{fs, path::Path};

/// A read-only file mapped into memory.
///
/// Used for reading archive entries and external debug artifacts from disk without copying
/// them up front. The mapping lives as long as this value.
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
}

impl Physical {
    /// Map the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = fs::File::open(path)?;
        let mmap = unsafe { Mmap::map(&file) }?;

        Ok(Physical { data: mmap })
    }

    /// The mapped bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }
}
