//! Debug headers embedded in module images.
//!
//! A [`DebugHeader`] is the small record inside an image that ties the image to its
//! symbol file: which symbol format is used, the signature and age the symbol file must
//! carry, and the path it was produced at. The symbol file itself travels next to the
//! image in the module archive and is handed to the loader separately.
//!
//! Precompiled modules may ship an externally produced header as a standalone file.
//! That file uses the same record, prefixed with [`DEBUG_HEADER_MAGIC`], and is parsed
//! with [`DebugHeader::parse`].

use strum::{Display, EnumString};

use crate::{
    file::{parser::Parser, writer::Writer},
    Error, Result,
};

/// Magic prefix of a standalone debug header file: "DBGH"
pub const DEBUG_HEADER_MAGIC: [u8; 4] = *b"DBGH";

/// Format of the symbol file a debug header points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum SymbolFormat {
    /// Portable symbol file stored next to the image
    Portable = 1,
    /// Symbols embedded in the image payload
    Embedded = 2,
    /// Legacy platform-specific symbol file
    Legacy = 3,
}

impl TryFrom<u8> for SymbolFormat {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(SymbolFormat::Portable),
            2 => Ok(SymbolFormat::Embedded),
            3 => Ok(SymbolFormat::Legacy),
            other => Err(malformed_error!("Unknown symbol format {}", other)),
        }
    }
}

/// Debug directory record of a module image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugHeader {
    /// Format of the referenced symbol file
    pub format: SymbolFormat,
    /// Signature the symbol file must match
    pub signature: uguid::Guid,
    /// Age the symbol file must match
    pub age: u32,
    /// Path of the symbol file at build time
    pub path: String,
}

impl DebugHeader {
    /// Parse a standalone debug header file.
    ///
    /// # Arguments
    /// * `data` - The file contents, starting with [`DEBUG_HEADER_MAGIC`]
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the magic does not match or the record is
    /// damaged, [`crate::Error::OutOfBounds`] if it is truncated.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        if parser.read_bytes(4)? != DEBUG_HEADER_MAGIC {
            return Err(malformed_error!("Invalid debug header magic"));
        }

        Self::read(&mut parser)
    }

    /// Serialize as a standalone debug header file.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.write_bytes(&DEBUG_HEADER_MAGIC);
        self.write(&mut writer);
        writer.into_inner()
    }

    pub(crate) fn read(parser: &mut Parser<'_>) -> Result<Self> {
        let format = SymbolFormat::try_from(parser.read_le::<u8>()?)?;
        let signature = parser.read_guid()?;
        let age = parser.read_le::<u32>()?;
        let path = parser.read_prefixed_string_utf8()?;

        Ok(DebugHeader {
            format,
            signature,
            age,
            path,
        })
    }

    pub(crate) fn write(&self, writer: &mut Writer) {
        writer.write_le(self.format as u8);
        writer.write_guid(&self.signature);
        writer.write_le(self.age);
        writer.write_prefixed_string_utf8(&self.path);
    }
}
