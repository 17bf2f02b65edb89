use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

pub mod reader;
pub mod reloc;
pub mod schema;
pub mod section;
pub mod segment;

/// Length of the fixed name fields in segment and section records.
pub const NAME_LENGTH: usize = 16;

pub const LC_SEGMENT: u32 = 0x01;
pub const LC_SEGMENT_64: u32 = 0x19;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of data: needed {needed} byte(s) at offset {offset:#x}")]
    UnexpectedEof { offset: u64, needed: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{field} value {value:#x} does not fit in a 32-bit field")]
    FieldOverflow { field: &'static str, value: u64 },
}

/// Record layout variant, fixed when a command is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Bits32,
    Bits64,
}

impl Width {
    #[must_use]
    pub fn from_command(command: u32) -> Option<Self> {
        match command {
            LC_SEGMENT => Some(Self::Bits32),
            LC_SEGMENT_64 => Some(Self::Bits64),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_64(self) -> bool {
        self == Self::Bits64
    }

    /// Byte width of the address-sized fields in this layout.
    #[must_use]
    pub fn word_size(self) -> usize {
        match self {
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Mach-O `filetype` of the image a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Object,
    Execute,
    FixedVmLib,
    Core,
    Preload,
    Dylib,
    Dylinker,
    Bundle,
    DylibStub,
    Dsym,
    KextBundle,
    Fileset,
    Unknown(u32),
}

impl FileType {
    #[must_use]
    pub fn from_u32(value: u32) -> Self {
        match value {
            0x1 => Self::Object,
            0x2 => Self::Execute,
            0x3 => Self::FixedVmLib,
            0x4 => Self::Core,
            0x5 => Self::Preload,
            0x6 => Self::Dylib,
            0x7 => Self::Dylinker,
            0x8 => Self::Bundle,
            0x9 => Self::DylibStub,
            0xa => Self::Dsym,
            0xb => Self::KextBundle,
            0xc => Self::Fileset,
            _ => Self::Unknown(value),
        }
    }

    /// Stub images declare sections without shipping their bytes.
    #[must_use]
    pub fn has_section_content(self) -> bool {
        self != Self::DylibStub
    }
}

/// A 16-byte name field kept exactly as stored on disk.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedName([u8; NAME_LENGTH]);

impl FixedName {
    #[must_use]
    pub fn new(raw: [u8; NAME_LENGTH]) -> Self {
        Self(raw)
    }

    /// Builds a NUL-padded field; longer inputs are cut at 16 bytes.
    #[must_use]
    pub fn from_str_padded(name: &str) -> Self {
        let mut raw = [0u8; NAME_LENGTH];
        let len = name.len().min(NAME_LENGTH);
        raw[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self(raw)
    }

    #[must_use]
    pub fn raw(&self) -> &[u8; NAME_LENGTH] {
        &self.0
    }

    /// Bytes up to the first NUL, or all 16 when unterminated.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(NAME_LENGTH);
        &self.0[..end]
    }

    #[must_use]
    pub fn to_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.as_bytes() == name.as_bytes()
    }
}

impl fmt::Debug for FixedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_str_lossy())
    }
}

impl fmt::Display for FixedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str_lossy())
    }
}
