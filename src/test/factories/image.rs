use crate::image::{DebugHeader, ModuleImage, ModuleVersion, SymbolFormat, TypeScope};

/// Fluent construction of a [`ModuleImage`].
///
/// Entry types extend `Host::Mod`. The MVID is derived from the name so that equal
/// builders produce byte-identical images.
pub(crate) struct ImageBuilder {
    image: ModuleImage,
}

impl ImageBuilder {
    pub(crate) fn new(name: &str) -> Self {
        let mut image = ModuleImage::new(name, ModuleVersion::new(1, 0, 0, 0));

        let mut mvid = [0u8; 16];
        for (index, byte) in name.bytes().enumerate() {
            mvid[index % 16] ^= byte;
        }
        image.mvid = uguid::Guid::from_bytes(mvid);

        ImageBuilder { image }
    }

    pub(crate) fn reference(mut self, name: &str) -> Self {
        self.image.add_reference(name, ModuleVersion::new(1, 0, 0, 0));
        self
    }

    pub(crate) fn entry_type(mut self, name: &str) -> Self {
        let host = match self.image.references.iter().position(|r| r.name == "Host") {
            Some(index) => index,
            None => self.image.add_reference("Host", ModuleVersion::new(1, 4, 0, 0)),
        };
        self.image
            .add_type(name, Some((TypeScope::Reference(host), "Mod")));
        self
    }

    pub(crate) fn plain_type(mut self, name: &str) -> Self {
        self.image.add_type(name, None);
        self
    }

    pub(crate) fn debug_header(mut self, path: &str) -> Self {
        self.image.debug_header = Some(DebugHeader {
            format: SymbolFormat::Portable,
            signature: uguid::Guid::from_bytes([0x5A; 16]),
            age: 1,
            path: path.to_string(),
        });
        self
    }

    pub(crate) fn payload(mut self, data: &[u8]) -> Self {
        self.image.payload = data.to_vec();
        self
    }

    /// The image. Flags are left empty, serialization derives them.
    pub(crate) fn build(self) -> ModuleImage {
        self.image
    }
}
