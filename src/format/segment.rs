use std::fmt;

use tracing::debug;

use crate::address::canonicalize;
use crate::format::reader::{Reader, Writer};
use crate::format::schema::{section_schema, segment_schema, Schema};
use crate::format::section::{narrow, Section};
use crate::format::{DecodeError, EncodeError, Endian, FixedName, Width};

pub const VM_PROT_READ: u32 = 0x1;
pub const VM_PROT_WRITE: u32 = 0x2;
pub const VM_PROT_EXECUTE: u32 = 0x4;

pub const SG_HIGHVM: u32 = 0x1;
pub const SG_FVMLIB: u32 = 0x2;
pub const SG_NORELOC: u32 = 0x4;
pub const SG_PROTECTED_VERSION_1: u32 = 0x8;
pub const SG_READ_ONLY: u32 = 0x10;

/// Generic `cmd`/`cmdsize` prefix shared by every load command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadCommandHeader {
    pub command: u32,
    pub size: u32,
    /// Absolute offset of the command within the container.
    pub offset: u64,
}

impl LoadCommandHeader {
    pub fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        let command = reader.read_u32()?;
        let size = reader.read_u32()?;
        Ok(Self {
            command,
            size,
            offset,
        })
    }
}

/// A decoded `segment_command` or `segment_command_64`.
///
/// Everything except the file offset is fixed at decode time; see
/// [`SegmentCommand::set_file_offset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentCommand {
    header: LoadCommandHeader,
    width: Width,
    name: FixedName,
    vm_address: u64,
    vm_size: u64,
    file_offset: u64,
    file_size: u64,
    max_protection: u32,
    initial_protection: u32,
    section_count: u32,
    flags: u32,
    sections: Vec<Section>,
}

impl SegmentCommand {
    /// Decodes the segment body that follows `header`.
    ///
    /// `reader` must sit right after the `cmd`/`cmdsize` words. Exactly
    /// `nsects` section descriptors are decoded; a short read anywhere fails
    /// the whole command.
    ///
    /// # Errors
    /// Returns `DecodeError` when the header, any section, or any relocation table is truncated.
    pub fn decode(
        reader: &mut Reader<'_>,
        header: LoadCommandHeader,
        width: Width,
    ) -> Result<Self, DecodeError> {
        let name = reader.read_name()?;
        let (vm_address, vm_size, file_offset, file_size) = match width {
            Width::Bits32 => (
                u64::from(reader.read_u32()?),
                u64::from(reader.read_u32()?),
                u64::from(reader.read_u32()?),
                u64::from(reader.read_u32()?),
            ),
            Width::Bits64 => (
                reader.read_u64()?,
                reader.read_u64()?,
                reader.read_u64()?,
                reader.read_u64()?,
            ),
        };
        let max_protection = reader.read_u32()?;
        let initial_protection = reader.read_u32()?;
        let section_count = reader.read_u32()?;
        let flags = reader.read_u32()?;

        let mut sections = Vec::new();
        for _ in 0..section_count {
            let section = Section::decode(reader, width)?;
            debug!(
                segment = %name,
                section = %section.name,
                address = section.address,
                size = section.size,
                relocations = section.relocations.len(),
                "decoded section"
            );
            sections.push(section);
        }

        Ok(Self {
            header,
            width,
            name,
            vm_address,
            vm_size,
            file_offset,
            file_size,
            max_protection,
            initial_protection,
            section_count,
            flags,
            sections,
        })
    }

    /// Writes the command header, the segment fields and every section descriptor.
    ///
    /// # Errors
    /// Returns `EncodeError` when a 32-bit command holds a value above `u32::MAX`.
    pub fn encode(&self, endian: Endian) -> Result<Vec<u8>, EncodeError> {
        let mut writer = Writer::new(endian);
        writer.write_u32(self.header.command);
        writer.write_u32(self.header.size);
        writer.write_name(&self.name);
        let words = [
            ("vmaddr", self.vm_address),
            ("vmsize", self.vm_size),
            ("fileoff", self.file_offset),
            ("filesize", self.file_size),
        ];
        for (field, value) in words {
            match self.width {
                Width::Bits32 => writer.write_u32(narrow(field, value)?),
                Width::Bits64 => writer.write_u64(value),
            }
        }
        writer.write_u32(self.max_protection);
        writer.write_u32(self.initial_protection);
        writer.write_u32(self.section_count);
        writer.write_u32(self.flags);
        for section in &self.sections {
            section.encode(&mut writer)?;
        }
        Ok(writer.into_bytes())
    }

    /// First section in declaration order whose `[address, address + size]`
    /// range contains `address`. Overlapping declarations resolve to the earlier one.
    #[must_use]
    pub fn section_containing(&self, address: u64) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains(address))
    }

    #[must_use]
    pub fn section_by_name(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name.matches(name))
    }

    /// Virtual address with kernelcache tag bits canonicalized.
    #[must_use]
    pub fn virtual_address(&self) -> u64 {
        canonicalize(self.vm_address)
    }

    /// `vmaddr` exactly as stored.
    #[must_use]
    pub fn raw_vm_address(&self) -> u64 {
        self.vm_address
    }

    #[must_use]
    pub fn vm_size(&self) -> u64 {
        self.vm_size
    }

    #[must_use]
    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    /// Post-decode patch point for loaders that move the segment within the
    /// image (for example after sliding a fileset entry). No other field changes.
    pub fn set_file_offset(&mut self, file_offset: u64) {
        self.file_offset = file_offset;
    }

    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    #[must_use]
    pub fn name(&self) -> &FixedName {
        &self.name
    }

    #[must_use]
    pub fn header(&self) -> &LoadCommandHeader {
        &self.header
    }

    #[must_use]
    pub fn width(&self) -> Width {
        self.width
    }

    #[must_use]
    pub fn max_protection(&self) -> u32 {
        self.max_protection
    }

    #[must_use]
    pub fn initial_protection(&self) -> u32 {
        self.initial_protection
    }

    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.initial_protection & VM_PROT_READ != 0
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.initial_protection & VM_PROT_WRITE != 0
    }

    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.initial_protection & VM_PROT_EXECUTE != 0
    }

    #[must_use]
    pub fn section_count(&self) -> u32 {
        self.section_count
    }

    #[must_use]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Segment payload is encrypted (`SG_PROTECTED_VERSION_1`).
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.flags & SG_PROTECTED_VERSION_1 != 0
    }

    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    #[must_use]
    pub fn schema(&self) -> Schema {
        segment_schema(self.width)
    }

    #[must_use]
    pub fn section_schema(&self) -> Schema {
        section_schema(self.width)
    }

    /// Label used in annotation failure reports.
    #[must_use]
    pub fn command_name(&self) -> &'static str {
        "segment_command"
    }
}

impl fmt::Display for SegmentCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name.to_str_lossy())
    }
}

/// Renders a protection word as `rwx` with dashes for cleared bits.
#[must_use]
pub fn protection_string(protection: u32) -> String {
    let mut out = String::with_capacity(3);
    out.push(if protection & VM_PROT_READ != 0 { 'r' } else { '-' });
    out.push(if protection & VM_PROT_WRITE != 0 { 'w' } else { '-' });
    out.push(if protection & VM_PROT_EXECUTE != 0 { 'x' } else { '-' });
    out
}
