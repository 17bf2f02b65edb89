//! Layout annotation for decoded segment commands.
//!
//! [`annotate`] walks a [`SegmentCommand`] and tells an [`AnnotationSink`]
//! where each section descriptor, section byte range and relocation table
//! sits in the image. Actions are independent and safe to replay; nothing
//! is rolled back on cancellation or failure.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, warn};

use crate::format::schema::Schema;
use crate::format::segment::SegmentCommand;
use crate::format::FileType;

/// Fragment name for the bytes backing a section.
pub const SECTION_BYTES_FRAGMENT: &str = "SECTION_BYTES";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("{0}")]
    Sink(String),
    #[error("address {base:#x} + {offset:#x} overflows the address space")]
    AddressOverflow { base: u64, offset: u64 },
}

/// Byte-level model of the image being annotated.
pub trait AnnotationSink {
    /// Lays a typed record at `address` with a descriptive comment.
    fn place_record(
        &mut self,
        address: u64,
        schema: &Schema,
        comment: &str,
    ) -> Result<(), AnnotationError>;

    fn create_label(&mut self, address: u64, name: &str) -> Result<(), AnnotationError>;

    fn create_fragment(
        &mut self,
        address: u64,
        length: u64,
        name: &str,
    ) -> Result<(), AnnotationError>;
}

pub trait FailureSink {
    fn report(&mut self, message: &str);
}

impl FailureSink for Vec<String> {
    fn report(&mut self, message: &str) {
        self.push(message.to_string());
    }
}

/// Cooperative cancellation, polled between actions.
pub trait Cancellation {
    fn is_cancelled(&self) -> bool;
}

impl Cancellation for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Shareable cancellation flag.
#[derive(Debug, Default)]
pub struct CancelToken(AtomicBool);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl Cancellation for CancelToken {
    fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// A signal that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl Cancellation for Never {
    fn is_cancelled(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    PlaceRecord {
        address: u64,
        record: &'static str,
        length: usize,
        comment: String,
    },
    CreateLabel {
        address: u64,
        name: String,
    },
    CreateFragment {
        address: u64,
        length: u64,
        name: String,
    },
}

/// Sink that only remembers what it was asked to do.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub actions: Vec<Action>,
}

impl AnnotationSink for RecordingSink {
    fn place_record(
        &mut self,
        address: u64,
        schema: &Schema,
        comment: &str,
    ) -> Result<(), AnnotationError> {
        self.actions.push(Action::PlaceRecord {
            address,
            record: schema.name,
            length: schema.len(),
            comment: comment.to_string(),
        });
        Ok(())
    }

    fn create_label(&mut self, address: u64, name: &str) -> Result<(), AnnotationError> {
        self.actions.push(Action::CreateLabel {
            address,
            name: name.to_string(),
        });
        Ok(())
    }

    fn create_fragment(
        &mut self,
        address: u64,
        length: u64,
        name: &str,
    ) -> Result<(), AnnotationError> {
        self.actions.push(Action::CreateFragment {
            address,
            length,
            name: name.to_string(),
        });
        Ok(())
    }
}

/// Annotates the on-disk layout of `segment` relative to `image_base`.
///
/// Failures are reported to `failures` and end the pass for this command
/// only; cancellation ends it silently.
pub fn annotate(
    segment: &SegmentCommand,
    image_base: u64,
    file_type: FileType,
    cancel: &dyn Cancellation,
    sink: &mut dyn AnnotationSink,
    failures: &mut dyn FailureSink,
) {
    if let Err(err) = annotate_sections(segment, image_base, file_type, cancel, sink) {
        let message = format!(
            "unable to annotate {} {}: {err}",
            segment.command_name(),
            segment.name()
        );
        warn!("{message}");
        failures.report(&message);
    }
}

fn annotate_sections(
    segment: &SegmentCommand,
    image_base: u64,
    file_type: FileType,
    cancel: &dyn Cancellation,
    sink: &mut dyn AnnotationSink,
) -> Result<(), AnnotationError> {
    let section_schema = segment.section_schema();
    let command_at = offset_from(image_base, segment.header().offset)?;
    let mut cursor = offset_from(command_at, segment.schema().len() as u64)?;

    for section in segment.sections() {
        if cancel.is_cancelled() {
            debug!(segment = %segment.name(), "annotation cancelled");
            return Ok(());
        }
        sink.place_record(cursor, &section_schema, &section.to_string())?;
        cursor = offset_from(cursor, section_schema.len() as u64)?;

        if cancel.is_cancelled() {
            debug!(segment = %segment.name(), "annotation cancelled");
            return Ok(());
        }
        if section.is_zero_fill() || !file_type.has_section_content() {
            debug!(section = %section.name, "no file bytes, skipping content");
            continue;
        }

        let name = section.name.to_str_lossy();
        if section.size > 0 {
            let bytes_at = offset_from(image_base, u64::from(section.offset))?;
            sink.create_label(bytes_at, &name)?;
            sink.create_fragment(bytes_at, section.size, SECTION_BYTES_FRAGMENT)?;
        }

        if section.relocation_offset > 0 {
            let relocs_at = offset_from(image_base, u64::from(section.relocation_offset))?;
            let mut running = 0u64;
            for reloc in &section.relocations {
                if cancel.is_cancelled() {
                    debug!(segment = %segment.name(), "annotation cancelled");
                    return Ok(());
                }
                let schema = reloc.schema();
                sink.place_record(offset_from(relocs_at, running)?, &schema, &reloc.to_string())?;
                running += schema.len() as u64;
            }
            sink.create_fragment(relocs_at, running, &format!("{name}_Relocations"))?;
        }
    }
    Ok(())
}

fn offset_from(base: u64, offset: u64) -> Result<u64, AnnotationError> {
    base.checked_add(offset)
        .ok_or(AnnotationError::AddressOverflow { base, offset })
}
