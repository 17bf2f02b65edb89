//! Record layout descriptions for display tooling.
//!
//! A [`Schema`] names each on-disk field with its width and position. The
//! annotation driver uses the schema length to step over placed records.

use crate::format::{Width, NAME_LENGTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Dword,
    Qword,
    Ascii(usize),
}

impl FieldKind {
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::Dword => 4,
            Self::Qword => 8,
            Self::Ascii(len) => len,
        }
    }

    fn word(width: Width) -> Self {
        match width {
            Width::Bits32 => Self::Dword,
            Width::Bits64 => Self::Qword,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub name: &'static str,
    pub fields: Vec<Field>,
}

impl Schema {
    fn build(name: &'static str, fields: &[(&'static str, FieldKind)]) -> Self {
        let mut offset = 0;
        let fields = fields
            .iter()
            .map(|&(name, kind)| {
                let field = Field { name, kind, offset };
                offset += kind.size();
                field
            })
            .collect();
        Self { name, fields }
    }

    /// Total byte length of the record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.iter().map(|f| f.kind.size()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// `segment_command` / `segment_command_64`, including the generic `cmd`/`cmdsize` header.
#[must_use]
pub fn segment_schema(width: Width) -> Schema {
    let word = FieldKind::word(width);
    let name = match width {
        Width::Bits32 => "segment_command",
        Width::Bits64 => "segment_command_64",
    };
    Schema::build(
        name,
        &[
            ("cmd", FieldKind::Dword),
            ("cmdsize", FieldKind::Dword),
            ("segname", FieldKind::Ascii(NAME_LENGTH)),
            ("vmaddr", word),
            ("vmsize", word),
            ("fileoff", word),
            ("filesize", word),
            ("maxprot", FieldKind::Dword),
            ("initprot", FieldKind::Dword),
            ("nsects", FieldKind::Dword),
            ("flags", FieldKind::Dword),
        ],
    )
}

#[must_use]
pub fn section_schema(width: Width) -> Schema {
    let word = FieldKind::word(width);
    let mut fields = vec![
        ("sectname", FieldKind::Ascii(NAME_LENGTH)),
        ("segname", FieldKind::Ascii(NAME_LENGTH)),
        ("addr", word),
        ("size", word),
        ("offset", FieldKind::Dword),
        ("align", FieldKind::Dword),
        ("reloff", FieldKind::Dword),
        ("nreloc", FieldKind::Dword),
        ("flags", FieldKind::Dword),
        ("reserved1", FieldKind::Dword),
        ("reserved2", FieldKind::Dword),
    ];
    let name = match width {
        Width::Bits32 => "section",
        Width::Bits64 => {
            fields.push(("reserved3", FieldKind::Dword));
            "section_64"
        }
    };
    Schema::build(name, &fields)
}

/// Both relocation forms are two dwords; only the field names differ.
#[must_use]
pub fn relocation_schema(scattered: bool) -> Schema {
    if scattered {
        Schema::build(
            "scattered_relocation_info",
            &[("r_mask", FieldKind::Dword), ("r_value", FieldKind::Dword)],
        )
    } else {
        Schema::build(
            "relocation_info",
            &[("r_address", FieldKind::Dword), ("r_mask", FieldKind::Dword)],
        )
    }
}
