use std::fmt;

use crate::format::reader::{Reader, Writer};
use crate::format::reloc::RelocationInfo;
use crate::format::schema::{section_schema, Schema};
use crate::format::{DecodeError, EncodeError, FixedName, Width};

pub const SECTION_TYPE_MASK: u32 = 0x0000_00ff;
pub const SECTION_ATTRIBUTES_MASK: u32 = 0xffff_ff00;

pub const S_REGULAR: u8 = 0x00;
pub const S_ZEROFILL: u8 = 0x01;
pub const S_CSTRING_LITERALS: u8 = 0x02;
pub const S_4BYTE_LITERALS: u8 = 0x03;
pub const S_8BYTE_LITERALS: u8 = 0x04;
pub const S_LITERAL_POINTERS: u8 = 0x05;
pub const S_NON_LAZY_SYMBOL_POINTERS: u8 = 0x06;
pub const S_LAZY_SYMBOL_POINTERS: u8 = 0x07;
pub const S_SYMBOL_STUBS: u8 = 0x08;
pub const S_MOD_INIT_FUNC_POINTERS: u8 = 0x09;
pub const S_MOD_TERM_FUNC_POINTERS: u8 = 0x0a;
pub const S_COALESCED: u8 = 0x0b;
pub const S_GB_ZEROFILL: u8 = 0x0c;
pub const S_THREAD_LOCAL_ZEROFILL: u8 = 0x12;

pub const S_ATTR_PURE_INSTRUCTIONS: u32 = 0x8000_0000;
pub const S_ATTR_NO_TOC: u32 = 0x4000_0000;
pub const S_ATTR_STRIP_STATIC_SYMS: u32 = 0x2000_0000;
pub const S_ATTR_NO_DEAD_STRIP: u32 = 0x1000_0000;
pub const S_ATTR_LIVE_SUPPORT: u32 = 0x0800_0000;
pub const S_ATTR_DEBUG: u32 = 0x0200_0000;
pub const S_ATTR_SOME_INSTRUCTIONS: u32 = 0x0000_0400;
pub const S_ATTR_EXT_RELOC: u32 = 0x0000_0200;
pub const S_ATTR_LOC_RELOC: u32 = 0x0000_0100;

/// One `section` / `section_64` descriptor and its relocation entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: FixedName,
    /// Copy of the owning segment's name as declared here; never cross-checked.
    pub segment_name: FixedName,
    pub address: u64,
    pub size: u64,
    pub offset: u32,
    /// log2 of the required alignment.
    pub alignment: u32,
    pub relocation_offset: u32,
    pub relocation_count: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
    /// Present on disk only in the 64-bit layout.
    pub reserved3: u32,
    pub width: Width,
    pub relocations: Vec<RelocationInfo>,
}

impl Section {
    /// Decodes one descriptor from `reader`.
    ///
    /// Relocations are read through a fork at `reloff`, so the descriptor
    /// stream itself only advances by the fixed record length.
    ///
    /// # Errors
    /// Returns `DecodeError` when the descriptor or any of its relocation entries is truncated.
    pub fn decode(reader: &mut Reader<'_>, width: Width) -> Result<Self, DecodeError> {
        let name = reader.read_name()?;
        let segment_name = reader.read_name()?;
        let (address, size) = match width {
            Width::Bits32 => (u64::from(reader.read_u32()?), u64::from(reader.read_u32()?)),
            Width::Bits64 => (reader.read_u64()?, reader.read_u64()?),
        };
        let offset = reader.read_u32()?;
        let alignment = reader.read_u32()?;
        let relocation_offset = reader.read_u32()?;
        let relocation_count = reader.read_u32()?;
        let flags = reader.read_u32()?;
        let reserved1 = reader.read_u32()?;
        let reserved2 = reader.read_u32()?;
        let reserved3 = match width {
            Width::Bits32 => 0,
            Width::Bits64 => reader.read_u32()?,
        };

        let relocations = if relocation_offset > 0 {
            let mut relocs = reader.fork_at(u64::from(relocation_offset));
            (0..relocation_count)
                .map(|_| RelocationInfo::decode(&mut relocs))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };

        Ok(Self {
            name,
            segment_name,
            address,
            size,
            offset,
            alignment,
            relocation_offset,
            relocation_count,
            flags,
            reserved1,
            reserved2,
            reserved3,
            width,
            relocations,
        })
    }

    /// Writes the descriptor only; relocation entries live elsewhere in the image.
    ///
    /// # Errors
    /// Returns `EncodeError` when a 32-bit descriptor holds an address or size above `u32::MAX`.
    pub fn encode(&self, writer: &mut Writer) -> Result<(), EncodeError> {
        writer.write_name(&self.name);
        writer.write_name(&self.segment_name);
        match self.width {
            Width::Bits32 => {
                writer.write_u32(narrow("addr", self.address)?);
                writer.write_u32(narrow("size", self.size)?);
            }
            Width::Bits64 => {
                writer.write_u64(self.address);
                writer.write_u64(self.size);
            }
        }
        writer.write_u32(self.offset);
        writer.write_u32(self.alignment);
        writer.write_u32(self.relocation_offset);
        writer.write_u32(self.relocation_count);
        writer.write_u32(self.flags);
        writer.write_u32(self.reserved1);
        writer.write_u32(self.reserved2);
        if self.width.is_64() {
            writer.write_u32(self.reserved3);
        }
        Ok(())
    }

    #[must_use]
    pub fn schema(&self) -> Schema {
        section_schema(self.width)
    }

    #[must_use]
    pub fn section_type(&self) -> u8 {
        (self.flags & SECTION_TYPE_MASK) as u8
    }

    #[must_use]
    pub fn attributes(&self) -> u32 {
        self.flags & SECTION_ATTRIBUTES_MASK
    }

    #[must_use]
    pub fn has_attribute(&self, attribute: u32) -> bool {
        self.attributes() & attribute != 0
    }

    /// Declared with a size but backed by no file bytes.
    #[must_use]
    pub fn is_zero_fill(&self) -> bool {
        self.section_type() == S_ZEROFILL
    }

    /// Inclusive on both ends: an address exactly at `address + size` is contained.
    #[must_use]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.address && address - self.address <= self.size
    }
}

/// Narrows a 64-bit model value into a 32-bit on-disk field.
pub(crate) fn narrow(field: &'static str, value: u64) -> Result<u32, EncodeError> {
    u32::try_from(value).map_err(|_| EncodeError::FieldOverflow { field, value })
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Section Name:          {}", self.name)?;
        writeln!(f, "Segment Name:          {}", self.segment_name)?;
        writeln!(f, "Address:               {:#x}", self.address)?;
        writeln!(f, "Size:                  {:#x}", self.size)?;
        writeln!(f, "Offset:                {:#x}", self.offset)?;
        writeln!(f, "Alignment:             {}", self.alignment)?;
        writeln!(f, "Relocation Offset:     {:#x}", self.relocation_offset)?;
        writeln!(f, "Number of Relocations: {}", self.relocation_count)?;
        writeln!(f, "Flags:                 {:#010x}", self.flags)?;
        writeln!(f, "Reserved1:             {:#x}", self.reserved1)?;
        write!(f, "Reserved2:             {:#x}", self.reserved2)?;
        if self.width.is_64() {
            write!(f, "\nReserved3:             {:#x}", self.reserved3)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{Section, S_ATTR_PURE_INSTRUCTIONS, S_ATTR_SOME_INSTRUCTIONS, S_ZEROFILL};
    use crate::format::reader::{Reader, Writer};
    use crate::format::{DecodeError, EncodeError, Endian, FixedName, Width};

    fn section_bytes_64(reloff: u32, nreloc: u32, flags: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(FixedName::from_str_padded("__text").raw());
        out.extend_from_slice(FixedName::from_str_padded("__TEXT").raw());
        out.extend_from_slice(&0x1_0000_1000u64.to_le_bytes());
        out.extend_from_slice(&0x80u64.to_le_bytes());
        for v in [0x1000u32, 4, reloff, nreloc, flags, 0, 0, 0] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    fn decode_64(data: &[u8]) -> Section {
        let mut reader = Reader::new(data, Endian::Little);
        Section::decode(&mut reader, Width::Bits64).expect("decode")
    }

    #[test]
    fn decodes_section_64_without_relocations() {
        let data = section_bytes_64(0, 0, S_ATTR_PURE_INSTRUCTIONS | S_ATTR_SOME_INSTRUCTIONS);
        let mut reader = Reader::new(&data, Endian::Little);
        let section = Section::decode(&mut reader, Width::Bits64).expect("decode");

        assert_eq!(reader.position(), 80);
        assert!(section.name.matches("__text"));
        assert!(section.segment_name.matches("__TEXT"));
        assert_eq!(section.address, 0x1_0000_1000);
        assert_eq!(section.size, 0x80);
        assert_eq!(section.offset, 0x1000);
        assert_eq!(section.alignment, 4);
        assert_eq!(section.section_type(), 0);
        assert!(section.has_attribute(S_ATTR_PURE_INSTRUCTIONS));
        assert!(!section.is_zero_fill());
        assert!(section.relocations.is_empty());
        assert!(section.to_string().starts_with("Section Name:          __text\n"));
    }

    #[test]
    fn decodes_relocations_from_their_own_offset() {
        let mut data = section_bytes_64(80, 2, 0);
        data.extend_from_slice(&0x4u32.to_le_bytes());
        data.extend_from_slice(&0x0c00_0001u32.to_le_bytes());
        data.extend_from_slice(&0x8u32.to_le_bytes());
        data.extend_from_slice(&0x0c00_0002u32.to_le_bytes());

        let mut reader = Reader::new(&data, Endian::Little);
        let section = Section::decode(&mut reader, Width::Bits64).expect("decode");
        assert_eq!(reader.position(), 80);
        assert_eq!(section.relocations.len(), 2);
        assert_eq!(section.relocations[1].address, 0x8);
        assert_eq!(section.relocations[1].value, 2);
        assert!(section.relocations[1].is_extern);
    }

    #[test]
    fn relocation_count_is_ignored_without_an_offset() {
        let section = decode_64(&section_bytes_64(0, 5, 0));
        assert_eq!(section.relocation_count, 5);
        assert!(section.relocations.is_empty());
    }

    #[test]
    fn missing_relocation_bytes_fail_the_descriptor() {
        let data = section_bytes_64(80, 1, 0);
        let mut reader = Reader::new(&data, Endian::Little);
        let err = Section::decode(&mut reader, Width::Bits64).expect_err("no relocation bytes");
        assert_eq!(
            err,
            DecodeError::UnexpectedEof {
                offset: 80,
                needed: 4
            }
        );
    }

    #[test]
    fn zero_fill_type_is_detected() {
        let section = decode_64(&section_bytes_64(0, 0, u32::from(S_ZEROFILL)));
        assert!(section.is_zero_fill());
    }

    #[test]
    fn containment_is_inclusive_at_both_ends() {
        let section = decode_64(&section_bytes_64(0, 0, 0));
        assert!(section.contains(0x1_0000_1000));
        assert!(section.contains(0x1_0000_1080));
        assert!(!section.contains(0x1_0000_1081));
        assert!(!section.contains(0x1_0000_0fff));
    }

    #[test]
    fn narrow_descriptor_rejects_wide_values_on_encode() {
        let mut section = decode_64(&section_bytes_64(0, 0, 0));
        section.width = Width::Bits32;
        let mut writer = Writer::new(Endian::Little);
        assert_eq!(
            section.encode(&mut writer),
            Err(EncodeError::FieldOverflow {
                field: "addr",
                value: 0x1_0000_1000
            })
        );
    }
}
