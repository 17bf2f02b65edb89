use std::fmt;

use crate::format::reader::{Reader, Writer};
use crate::format::schema::{relocation_schema, Schema};
use crate::format::{DecodeError, Endian};

/// High bit of the first word marks a `scattered_relocation_info`.
pub const R_SCATTERED: u32 = 0x8000_0000;

/// On-disk size of both relocation forms.
pub const RELOCATION_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationInfo {
    /// Offset of the fixup within the relocated section.
    pub address: u32,
    /// Symbol index (extern), section ordinal, or the scattered target value.
    pub value: u32,
    pub pc_relative: bool,
    /// log2 of the fixup width in bytes.
    pub length: u8,
    pub is_extern: bool,
    pub kind: u8,
    pub scattered: bool,
}

impl RelocationInfo {
    /// Decodes one entry; plain `r_word1` bitfields are packed per the reader's byte order.
    ///
    /// Any entry with [`R_SCATTERED`] set in its first word is taken as
    /// scattered. The CPU type is not consulted, so x86_64 and arm64 images,
    /// which never use scattered entries, are trusted not to set that bit.
    pub fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let first = reader.read_u32()?;
        let second = reader.read_u32()?;
        if first & R_SCATTERED != 0 {
            Ok(Self {
                address: first & 0x00ff_ffff,
                value: second,
                pc_relative: (first >> 30) & 1 != 0,
                length: ((first >> 28) & 0x3) as u8,
                is_extern: false,
                kind: ((first >> 24) & 0xf) as u8,
                scattered: true,
            })
        } else if reader.endian() == Endian::Little {
            Ok(Self {
                address: first,
                value: second & 0x00ff_ffff,
                pc_relative: (second >> 24) & 1 != 0,
                length: ((second >> 25) & 0x3) as u8,
                is_extern: (second >> 27) & 1 != 0,
                kind: (second >> 28) as u8,
                scattered: false,
            })
        } else {
            Ok(Self {
                address: first,
                value: second >> 8,
                pc_relative: (second >> 7) & 1 != 0,
                length: ((second >> 5) & 0x3) as u8,
                is_extern: (second >> 4) & 1 != 0,
                kind: (second & 0xf) as u8,
                scattered: false,
            })
        }
    }

    pub fn encode(&self, writer: &mut Writer) {
        if self.scattered {
            writer.write_u32(
                R_SCATTERED
                    | (u32::from(self.pc_relative) << 30)
                    | (u32::from(self.length & 0x3) << 28)
                    | (u32::from(self.kind & 0xf) << 24)
                    | (self.address & 0x00ff_ffff),
            );
            writer.write_u32(self.value);
        } else if writer.endian() == Endian::Little {
            writer.write_u32(self.address);
            writer.write_u32(
                (u32::from(self.kind & 0xf) << 28)
                    | (u32::from(self.is_extern) << 27)
                    | (u32::from(self.length & 0x3) << 25)
                    | (u32::from(self.pc_relative) << 24)
                    | (self.value & 0x00ff_ffff),
            );
        } else {
            writer.write_u32(self.address);
            writer.write_u32(
                ((self.value & 0x00ff_ffff) << 8)
                    | (u32::from(self.pc_relative) << 7)
                    | (u32::from(self.length & 0x3) << 5)
                    | (u32::from(self.is_extern) << 4)
                    | u32::from(self.kind & 0xf),
            );
        }
    }

    #[must_use]
    pub fn schema(&self) -> Schema {
        relocation_schema(self.scattered)
    }
}

impl fmt::Display for RelocationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Address:     {:#010x}", self.address)?;
        if self.scattered {
            writeln!(f, "Value:       {:#010x}", self.value)?;
        } else if self.is_extern {
            writeln!(f, "Symbol:      {}", self.value)?;
        } else {
            writeln!(f, "Section:     {}", self.value)?;
        }
        writeln!(f, "Scattered:   {}", self.scattered)?;
        writeln!(f, "PC Relative: {}", self.pc_relative)?;
        writeln!(f, "Length:      {} byte(s)", 1u32 << self.length)?;
        write!(f, "Type:        {}", self.kind)
    }
}
