//! The module image container.
//!
//! A module image is the unit of binary code this crate loads. It carries just enough
//! metadata for the loader to do its job: the image's own identity, the identities of
//! every image it references, the type table used to locate a module's entry type, an
//! optional debug header, and an opaque code payload which is preserved byte for byte.
//!
//! # Layout
//!
//! All integers are little-endian; strings are 7-bit-length-prefixed UTF-8.
//!
//! | Field            | Encoding                                                   |
//! |------------------|------------------------------------------------------------|
//! | Magic            | `MODI`                                                     |
//! | Format version   | `u16` ([`FORMAT_VERSION`])                                 |
//! | Flags            | `u16` ([`ImageFlags`])                                     |
//! | Name             | string                                                     |
//! | Version          | 4 × `u16`                                                  |
//! | MVID             | 16 byte GUID                                               |
//! | References       | count, then name + version per entry                       |
//! | Types            | count, then name + base scope (`u32`) + base name per entry|
//! | Debug header     | only if [`ImageFlags::HAS_DEBUG_HEADER`]                   |
//! | Payload          | length, then raw bytes                                     |
//!
//! A base scope of `0` means the type has no base type, `1` means the base type lives in
//! the same image and `n >= 2` selects reference table entry `n - 2`. Because types refer
//! to other images only through the reference table, renaming a reference entry is enough
//! to retarget every type that derives from it.
//!
//! # Examples
//!
//! ```rust
//! use modscope::image::{ModuleImage, ModuleVersion, TypeScope};
//!
//! let mut image = ModuleImage::new("ExampleMod", ModuleVersion::new(1, 0, 0, 0));
//! let host = image.add_reference("Host", ModuleVersion::default());
//! image.add_type("ExampleMod.ExampleMod", Some((TypeScope::Reference(host), "Mod")));
//!
//! let bytes = image.to_bytes();
//! let parsed = ModuleImage::parse(&bytes)?;
//! assert_eq!(parsed.name, "ExampleMod");
//! assert_eq!(parsed.references[0].name, "Host");
//! # Ok::<(), modscope::Error>(())
//! ```

mod debug;
mod identity;

pub use debug::{DebugHeader, SymbolFormat, DEBUG_HEADER_MAGIC};
pub use identity::{
    base_name, generational_name, library_name, placeholder_name, ModuleVersion,
    GENERATION_SEPARATOR, PLACEHOLDER_GENERATION,
};

use bitflags::bitflags;

use crate::{
    file::{parser::Parser, writer::Writer},
    Error, Result,
};

/// Magic number of module images: "MODI"
pub const IMAGE_MAGIC: [u8; 4] = *b"MODI";

/// Current image format version
pub const FORMAT_VERSION: u16 = 1;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Image header flags
    pub struct ImageFlags: u16 {
        /// A debug header follows the type table
        const HAS_DEBUG_HEADER = 0x0001;
        /// The image was built for live-edit attach and must not be renamed
        const DIRECT_ATTACH = 0x0002;
        /// The image is a library carried privately by a module
        const LIBRARY = 0x0004;
    }
}

/// An entry of the reference table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Identity of the referenced image
    pub name: String,
    /// Minimum version of the referenced image
    pub version: ModuleVersion,
}

/// Where a base type is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeScope {
    /// Defined in the same image
    Local,
    /// Defined in the image named by this reference table index
    Reference(usize),
}

/// A base type named by a [`TypeDef`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseType {
    /// Image that defines the base type
    pub scope: TypeScope,
    /// Name of the base type within that image
    pub name: String,
}

/// An entry of the type table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    /// Fully qualified type name
    pub name: String,
    /// Direct base type, if any
    pub extends: Option<BaseType>,
}

/// A parsed module image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleImage {
    /// Identity this image is loaded under
    pub name: String,
    /// Declared version
    pub version: ModuleVersion,
    /// Header flags; [`ImageFlags::HAS_DEBUG_HEADER`] is derived from `debug_header` on write
    pub flags: ImageFlags,
    /// Module version id, distinct for every rewrite of the image
    pub mvid: uguid::Guid,
    /// Referenced images
    pub references: Vec<ImageReference>,
    /// Defined types
    pub types: Vec<TypeDef>,
    /// Debug directory record
    pub debug_header: Option<DebugHeader>,
    /// Opaque code payload
    pub payload: Vec<u8>,
}

impl ModuleImage {
    /// Create an empty image.
    #[must_use]
    pub fn new(name: impl Into<String>, version: ModuleVersion) -> Self {
        ModuleImage {
            name: name.into(),
            version,
            flags: ImageFlags::empty(),
            mvid: uguid::Guid::ZERO,
            references: Vec::new(),
            types: Vec::new(),
            debug_header: None,
            payload: Vec::new(),
        }
    }

    /// Parse an image from its serialized form.
    ///
    /// # Errors
    /// - [`crate::Error::Empty`] for empty input
    /// - [`crate::Error::Malformed`] for a wrong magic, an unsupported format version, a
    ///   base scope pointing outside the reference table, or trailing data
    /// - [`crate::Error::OutOfBounds`] for truncated input
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Empty);
        }

        let mut parser = Parser::new(data);
        if parser.read_bytes(4)? != IMAGE_MAGIC {
            return Err(malformed_error!("Invalid image magic"));
        }

        let format = parser.read_le::<u16>()?;
        if format != FORMAT_VERSION {
            return Err(malformed_error!(
                "Unsupported image format version {} (expected {})",
                format,
                FORMAT_VERSION
            ));
        }

        let flags = ImageFlags::from_bits_truncate(parser.read_le::<u16>()?);
        let name = parser.read_prefixed_string_utf8()?;
        let version = read_version(&mut parser)?;
        let mvid = parser.read_guid()?;

        let reference_count = parser.read_7bit_encoded_int()? as usize;
        let mut references = Vec::with_capacity(reference_count.min(parser.remaining()));
        for _ in 0..reference_count {
            references.push(ImageReference {
                name: parser.read_prefixed_string_utf8()?,
                version: read_version(&mut parser)?,
            });
        }

        let type_count = parser.read_7bit_encoded_int()? as usize;
        let mut types = Vec::with_capacity(type_count.min(parser.remaining()));
        for _ in 0..type_count {
            let name = parser.read_prefixed_string_utf8()?;
            let scope = parser.read_le::<u32>()? as usize;
            let base = parser.read_prefixed_string_utf8()?;

            let extends = match scope {
                0 => None,
                1 => Some(BaseType {
                    scope: TypeScope::Local,
                    name: base,
                }),
                n if n - 2 < references.len() => Some(BaseType {
                    scope: TypeScope::Reference(n - 2),
                    name: base,
                }),
                n => {
                    return Err(malformed_error!(
                        "Type '{}' extends through reference {} but only {} references exist",
                        name,
                        n - 2,
                        references.len()
                    ))
                }
            };

            types.push(TypeDef { name, extends });
        }

        let debug_header = if flags.contains(ImageFlags::HAS_DEBUG_HEADER) {
            Some(DebugHeader::read(&mut parser)?)
        } else {
            None
        };

        let payload_len = parser.read_7bit_encoded_int()? as usize;
        let payload = parser.read_bytes(payload_len)?.to_vec();

        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after image payload",
                parser.remaining()
            ));
        }

        Ok(ModuleImage {
            name,
            version,
            flags,
            mvid,
            references,
            types,
            debug_header,
            payload,
        })
    }

    /// Serialize the image.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::with_capacity(64 + self.payload.len());

        let mut flags = self.flags;
        flags.set(ImageFlags::HAS_DEBUG_HEADER, self.debug_header.is_some());

        writer.write_bytes(&IMAGE_MAGIC);
        writer.write_le(FORMAT_VERSION);
        writer.write_le(flags.bits());
        writer.write_prefixed_string_utf8(&self.name);
        write_version(&mut writer, &self.version);
        writer.write_guid(&self.mvid);

        writer.write_7bit_encoded_int(count(self.references.len()));
        for reference in &self.references {
            writer.write_prefixed_string_utf8(&reference.name);
            write_version(&mut writer, &reference.version);
        }

        writer.write_7bit_encoded_int(count(self.types.len()));
        for typedef in &self.types {
            writer.write_prefixed_string_utf8(&typedef.name);
            match &typedef.extends {
                None => {
                    writer.write_le(0u32);
                    writer.write_prefixed_string_utf8("");
                }
                Some(base) => {
                    let scope = match base.scope {
                        TypeScope::Local => 1,
                        TypeScope::Reference(index) => count(index).saturating_add(2),
                    };
                    writer.write_le(scope);
                    writer.write_prefixed_string_utf8(&base.name);
                }
            }
        }

        if let Some(header) = &self.debug_header {
            header.write(&mut writer);
        }

        writer.write_7bit_encoded_int(count(self.payload.len()));
        writer.write_bytes(&self.payload);

        writer.into_inner()
    }

    /// Append a reference and return its table index.
    pub fn add_reference(&mut self, name: impl Into<String>, version: ModuleVersion) -> usize {
        self.references.push(ImageReference {
            name: name.into(),
            version,
        });
        self.references.len() - 1
    }

    /// Append a type definition.
    pub fn add_type(&mut self, name: impl Into<String>, extends: Option<(TypeScope, &str)>) {
        self.types.push(TypeDef {
            name: name.into(),
            extends: extends.map(|(scope, base)| BaseType {
                scope,
                name: base.to_string(),
            }),
        });
    }

    /// Look up a type by its fully qualified name.
    #[must_use]
    pub fn find_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|typedef| typedef.name == name)
    }

    /// Identity of the image a base type scope points at, `None` for local scopes.
    #[must_use]
    pub fn scope_name(&self, scope: TypeScope) -> Option<&str> {
        match scope {
            TypeScope::Local => None,
            TypeScope::Reference(index) => self.references.get(index).map(|r| r.name.as_str()),
        }
    }

    /// Returns `true` if the image references `name`.
    #[must_use]
    pub fn references_name(&self, name: &str) -> bool {
        self.references.iter().any(|reference| reference.name == name)
    }
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn read_version(parser: &mut Parser<'_>) -> Result<ModuleVersion> {
    Ok(ModuleVersion::new(
        parser.read_le::<u16>()?,
        parser.read_le::<u16>()?,
        parser.read_le::<u16>()?,
        parser.read_le::<u16>()?,
    ))
}

fn write_version(writer: &mut Writer, version: &ModuleVersion) {
    writer.write_le(version.major);
    writer.write_le(version.minor);
    writer.write_le(version.build);
    writer.write_le(version.revision);
}
