use machseg::format::reader::Reader;
use machseg::format::section::S_ZEROFILL;
use machseg::format::segment::{LoadCommandHeader, SegmentCommand};
use machseg::format::{DecodeError, Endian, FileType, FixedName, Width, LC_SEGMENT, LC_SEGMENT_64};
use machseg::markup::{annotate, Action, Never, RecordingSink};
use pretty_assertions::assert_eq;

struct Sect {
    name: &'static str,
    address: u64,
    size: u64,
    offset: u32,
    flags: u32,
}

fn put_word(out: &mut Vec<u8>, width: Width, endian: Endian, value: u64) {
    match (width, endian) {
        (Width::Bits32, Endian::Little) => {
            out.extend_from_slice(&u32::try_from(value).expect("u32").to_le_bytes());
        }
        (Width::Bits32, Endian::Big) => {
            out.extend_from_slice(&u32::try_from(value).expect("u32").to_be_bytes());
        }
        (Width::Bits64, Endian::Little) => out.extend_from_slice(&value.to_le_bytes()),
        (Width::Bits64, Endian::Big) => out.extend_from_slice(&value.to_be_bytes()),
    }
}

fn put_u32(out: &mut Vec<u8>, endian: Endian, value: u32) {
    match endian {
        Endian::Little => out.extend_from_slice(&value.to_le_bytes()),
        Endian::Big => out.extend_from_slice(&value.to_be_bytes()),
    }
}

fn command(width: Width, endian: Endian, sections: &[Sect]) -> Vec<u8> {
    let nsects = u32::try_from(sections.len()).expect("small");
    let (cmd, fixed, per_section) = match width {
        Width::Bits32 => (LC_SEGMENT, 56, 68),
        Width::Bits64 => (LC_SEGMENT_64, 72, 80),
    };
    let mut out = Vec::new();
    put_u32(&mut out, endian, cmd);
    put_u32(&mut out, endian, fixed + per_section * nsects);
    out.extend_from_slice(FixedName::from_str_padded("__DATA").raw());
    for v in [0x2000u64, 0x3000, 0x1000, 0x2000] {
        put_word(&mut out, width, endian, v);
    }
    for v in [3u32, 3, nsects, 0] {
        put_u32(&mut out, endian, v);
    }
    for s in sections {
        out.extend_from_slice(FixedName::from_str_padded(s.name).raw());
        out.extend_from_slice(FixedName::from_str_padded("__DATA").raw());
        put_word(&mut out, width, endian, s.address);
        put_word(&mut out, width, endian, s.size);
        for v in [s.offset, 2, 0, 0, s.flags, 0, 0] {
            put_u32(&mut out, endian, v);
        }
        if width.is_64() {
            put_u32(&mut out, endian, 0);
        }
    }
    out
}

fn decode(bytes: &[u8], width: Width, endian: Endian) -> Result<SegmentCommand, DecodeError> {
    let mut reader = Reader::new(bytes, endian);
    let header = LoadCommandHeader::decode(&mut reader)?;
    SegmentCommand::decode(&mut reader, header, width)
}

fn data_and_bss() -> Vec<Sect> {
    vec![
        Sect {
            name: "__data",
            address: 0x2000,
            size: 0x100,
            offset: 0x1000,
            flags: 0,
        },
        Sect {
            name: "__bss",
            address: 0x2100,
            size: 0x200,
            offset: 0,
            flags: u32::from(S_ZEROFILL),
        },
    ]
}

#[test]
fn reencoding_reproduces_original_bytes_in_both_layouts() {
    for (width, endian) in [(Width::Bits32, Endian::Little), (Width::Bits64, Endian::Big)] {
        let bytes = command(width, endian, &data_and_bss());
        let segment = decode(&bytes, width, endian).expect("decode");
        assert_eq!(segment.encode(endian).expect("encode"), bytes);
    }
}

#[test]
fn section_list_matches_declared_count() {
    let bytes = command(Width::Bits64, Endian::Little, &data_and_bss());
    let segment = decode(&bytes, Width::Bits64, Endian::Little).expect("decode");
    assert_eq!(segment.section_count(), 2);
    assert_eq!(segment.sections().len(), 2);
    assert_eq!(segment.section_by_name("__bss").map(|s| s.size), Some(0x200));
    assert!(segment.section_by_name("__text").is_none());
}

#[test]
fn missing_section_fails_the_whole_command() {
    let mut bytes = command(Width::Bits32, Endian::Little, &data_and_bss());
    bytes.truncate(bytes.len() - 1);
    assert!(decode(&bytes, Width::Bits32, Endian::Little).is_err());
}

#[test]
fn overlapping_sections_resolve_to_first_declared() {
    let sections = vec![
        Sect {
            name: "__first",
            address: 0x2000,
            size: 0x100,
            offset: 0x1000,
            flags: 0,
        },
        Sect {
            name: "__second",
            address: 0x2080,
            size: 0x100,
            offset: 0x1080,
            flags: 0,
        },
    ];
    let bytes = command(Width::Bits32, Endian::Little, &sections);
    let segment = decode(&bytes, Width::Bits32, Endian::Little).expect("decode");

    let name_at = |addr| segment.section_containing(addr).map(|s| s.name.to_string());
    assert_eq!(name_at(0x20c0), Some("__first".to_string()));
    assert_eq!(name_at(0x2100), Some("__first".to_string()));
    assert_eq!(name_at(0x2101), Some("__second".to_string()));
    assert_eq!(name_at(0x2180), Some("__second".to_string()));
    assert_eq!(name_at(0x2181), None);
    assert_eq!(name_at(0x1fff), None);
}

#[test]
fn normal_and_zero_fill_sections_annotate_as_expected() {
    let bytes = command(Width::Bits32, Endian::Little, &data_and_bss());
    let segment = decode(&bytes, Width::Bits32, Endian::Little).expect("decode");
    let mut sink = RecordingSink::default();
    let mut failures = Vec::<String>::new();
    annotate(&segment, 0, FileType::Execute, &Never, &mut sink, &mut failures);

    assert!(failures.is_empty());
    let placements = sink
        .actions
        .iter()
        .filter(|a| matches!(a, Action::PlaceRecord { record: "section", .. }))
        .count();
    let relocations = sink
        .actions
        .iter()
        .filter(|a| matches!(a, Action::PlaceRecord { record, .. } if record.contains("relocation")))
        .count();
    assert_eq!(placements, 2);
    assert_eq!(relocations, 0);
    assert_eq!(
        sink.actions
            .iter()
            .filter_map(|a| match a {
                Action::CreateLabel { name, .. } => Some(name.as_str()),
                Action::CreateFragment { name, .. } => Some(name.as_str()),
                Action::PlaceRecord { .. } => None,
            })
            .collect::<Vec<_>>(),
        vec!["__data", "SECTION_BYTES"]
    );
    assert_eq!(sink.actions.len(), 4);
    assert!(matches!(
        &sink.actions[0],
        Action::PlaceRecord { address: 56, length: 68, .. }
    ));
    assert!(matches!(
        &sink.actions[3],
        Action::PlaceRecord { address: 124, .. }
    ));
}
