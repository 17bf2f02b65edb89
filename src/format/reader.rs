use crate::format::{DecodeError, Endian, FixedName, NAME_LENGTH};

/// Positioned cursor over a whole Mach-O container.
///
/// Positions are absolute within `input`, so offsets stored in records
/// (relocation tables, section bytes) can be followed with [`Reader::fork_at`].
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> Reader<'a> {
    #[must_use]
    pub fn new(input: &'a [u8], endian: Endian) -> Self {
        Self {
            input,
            pos: 0,
            endian,
        }
    }

    /// Cursor positioned at `offset` over the same bytes.
    #[must_use]
    pub fn at(input: &'a [u8], offset: usize, endian: Endian) -> Self {
        Self {
            input,
            pos: offset,
            endian,
        }
    }

    /// Independent cursor at an absolute offset; `self` is not moved.
    #[must_use]
    pub fn fork_at(&self, offset: u64) -> Self {
        Self {
            input: self.input,
            pos: usize::try_from(offset).unwrap_or(usize::MAX),
            endian: self.endian,
        }
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.read_array::<2>()?;
        Ok(match self.endian {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_array::<4>()?;
        Ok(match self.endian {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        })
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_array::<8>()?;
        Ok(match self.endian {
            Endian::Little => u64::from_le_bytes(bytes),
            Endian::Big => u64::from_be_bytes(bytes),
        })
    }

    pub fn read_name(&mut self) -> Result<FixedName, DecodeError> {
        Ok(FixedName::new(self.read_array::<NAME_LENGTH>()?))
    }

    pub fn read_bytes(&mut self, size: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(size)
            .filter(|&end| end <= self.input.len())
            .ok_or(DecodeError::UnexpectedEof {
                offset: self.pos as u64,
                needed: size,
            })?;
        let begin = self.pos;
        self.pos = end;
        Ok(&self.input[begin..end])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }
}

/// Byte sink mirroring [`Reader`] for re-encoding records.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    out: Vec<u8>,
    endian: Endian,
}

impl Writer {
    #[must_use]
    pub fn new(endian: Endian) -> Self {
        Self {
            out: Vec::new(),
            endian,
        }
    }

    pub fn write_u32(&mut self, value: u32) {
        match self.endian {
            Endian::Little => self.out.extend_from_slice(&value.to_le_bytes()),
            Endian::Big => self.out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    pub fn write_u64(&mut self, value: u64) {
        match self.endian {
            Endian::Little => self.out.extend_from_slice(&value.to_le_bytes()),
            Endian::Big => self.out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn write_name(&mut self, name: &FixedName) {
        self.out.extend_from_slice(name.raw());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.out.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }
}
