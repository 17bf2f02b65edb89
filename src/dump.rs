use anyhow::{Context, Result};
use tracing::info;

use crate::cli::Args;
use crate::format::reader::Reader;
use crate::format::segment::{protection_string, LoadCommandHeader, SegmentCommand};
use crate::format::{Endian, FileType, Width};
use crate::markup::{annotate, Action, Never, RecordingSink};

pub fn run(args: &Args) -> Result<()> {
    let bytes =
        std::fs::read(&args.input).with_context(|| format!("failed to read {}", args.input))?;
    let endian = if args.big_endian {
        Endian::Big
    } else {
        Endian::Little
    };
    let offset = usize::try_from(args.offset)
        .with_context(|| format!("offset {:#x} is out of range", args.offset))?;

    let segment = decode_at(&bytes, offset, endian, args.bits)
        .with_context(|| format!("failed to decode segment command at {:#x}", args.offset))?;
    info!(
        segment = %segment.name(),
        sections = segment.sections().len(),
        "decoded segment command"
    );
    print!("{}", render_segment(&segment));

    if args.annotate {
        let mut sink = RecordingSink::default();
        let mut failures = Vec::<String>::new();
        annotate(
            &segment,
            args.image_base,
            FileType::from_u32(args.file_type),
            &Never,
            &mut sink,
            &mut failures,
        );
        print!("{}", render_actions(&sink.actions));
        for failure in &failures {
            eprintln!("warning: {failure}");
        }
    }
    Ok(())
}

/// Decodes the load command at `offset`, taking the width from `width` or the `cmd` word.
pub fn decode_at(
    bytes: &[u8],
    offset: usize,
    endian: Endian,
    width: Option<Width>,
) -> Result<SegmentCommand> {
    let mut reader = Reader::at(bytes, offset, endian);
    let header = LoadCommandHeader::decode(&mut reader)?;
    let width = match width {
        Some(width) => width,
        None => Width::from_command(header.command).ok_or_else(|| {
            anyhow::anyhow!("load command {:#x} is not a segment command", header.command)
        })?,
    };
    Ok(SegmentCommand::decode(&mut reader, header, width)?)
}

#[must_use]
pub fn render_segment(segment: &SegmentCommand) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} {} ({} section(s))\n",
        segment.schema().name,
        segment.name(),
        segment.section_count()
    ));
    out.push_str(&format!(
        "  vmaddr   {:#018x} (raw {:#018x})\n",
        segment.virtual_address(),
        segment.raw_vm_address()
    ));
    out.push_str(&format!("  vmsize   {:#x}\n", segment.vm_size()));
    out.push_str(&format!("  fileoff  {:#x}\n", segment.file_offset()));
    out.push_str(&format!("  filesize {:#x}\n", segment.file_size()));
    out.push_str(&format!(
        "  prot     {}/{}\n",
        protection_string(segment.initial_protection()),
        protection_string(segment.max_protection())
    ));
    out.push_str(&format!("  flags    {:#x}", segment.flags()));
    if segment.is_protected() {
        out.push_str(" protected");
    }
    out.push('\n');
    for section in segment.sections() {
        out.push_str(&format!(
            "  {},{} addr={:#x} size={:#x} offset={:#x} type={:#x} nreloc={}\n",
            section.segment_name,
            section.name,
            section.address,
            section.size,
            section.offset,
            section.section_type(),
            section.relocation_count
        ));
    }
    out
}

#[must_use]
pub fn render_actions(actions: &[Action]) -> String {
    let mut out = String::new();
    for action in actions {
        let line = match action {
            Action::PlaceRecord {
                address,
                record,
                length,
                ..
            } => format!("{address:#018x} record   {record} ({length} bytes)"),
            Action::CreateLabel { address, name } => format!("{address:#018x} label    {name}"),
            Action::CreateFragment {
                address,
                length,
                name,
            } => format!("{address:#018x} fragment {name} ({length:#x} bytes)"),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}
