use crate::{
    image::{DebugHeader, ModuleImage},
    Result,
};

/// Replaces the debug header of an image with an externally produced one.
///
/// Precompiled modules may ship a main binary whose own debug header points at symbols
/// the host cannot use, together with a separately produced header for the symbols that
/// are shipped. The splicer swaps the header in while the image is being rewritten, so
/// the result is serialized once with the supplied header and without the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugSymbolSplicer {
    header: DebugHeader,
}

impl DebugSymbolSplicer {
    /// Splice `header` into images.
    #[must_use]
    pub fn new(header: DebugHeader) -> Self {
        Self { header }
    }

    /// Build a splicer from a standalone debug header file.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] if the file is
    /// not a valid debug header.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(Self::new(DebugHeader::parse(data)?))
    }

    /// The header that will be spliced in.
    #[must_use]
    pub fn header(&self) -> &DebugHeader {
        &self.header
    }

    /// Install the supplied header on `image`, returning the header it replaced.
    pub fn splice(&self, image: &mut ModuleImage) -> Option<DebugHeader> {
        image.debug_header.replace(self.header.clone())
    }
}
