use std::{fmt, sync::Arc};

use crate::image::ModuleImage;

/// Reference-counted handle to a [`LoadedImage`].
pub type LoadedImageRc = Arc<LoadedImage>;

/// Process-unique handle of a loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageId(pub u64);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image#{}", self.0)
    }
}

/// An image resident in the process.
///
/// Loaded images are immutable and are never released.
#[derive(Debug)]
pub struct LoadedImage {
    pub(crate) id: ImageId,
    pub(crate) owner: String,
    pub(crate) image: Arc<ModuleImage>,
    pub(crate) code: Arc<[u8]>,
    pub(crate) symbols: Option<Arc<[u8]>>,
}

impl LoadedImage {
    /// Handle of this image.
    #[must_use]
    pub fn id(&self) -> ImageId {
        self.id
    }

    /// Identity the image is loaded under.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.image.name
    }

    /// Name of the module that loaded the image.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The parsed image.
    #[must_use]
    pub fn image(&self) -> &Arc<ModuleImage> {
        &self.image
    }

    /// The bytes the image was loaded from.
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Symbols loaded alongside the image.
    #[must_use]
    pub fn symbols(&self) -> Option<&[u8]> {
        self.symbols.as_deref()
    }

    /// Bytes of the image plus its symbols.
    #[must_use]
    pub fn size(&self) -> u64 {
        (self.code.len() + self.symbols.as_ref().map_or(0, |s| s.len())) as u64
    }
}
