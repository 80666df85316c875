use std::rc::Rc;

use crate::error::{bail_format, Result};

/// The `.debug_*` sections the reader consumes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SectionKind {
    DebugInfo,
    DebugAbbrev,
    DebugLine,
    DebugLineStr,
    DebugStr,
    DebugStrOffsets,
    DebugAddr,
    DebugRanges,
    DebugRnglists,
    DebugTypes,
}

impl SectionKind {
    pub fn name(self) -> &'static str {
        match self {
            SectionKind::DebugInfo => ".debug_info",
            SectionKind::DebugAbbrev => ".debug_abbrev",
            SectionKind::DebugLine => ".debug_line",
            SectionKind::DebugLineStr => ".debug_line_str",
            SectionKind::DebugStr => ".debug_str",
            SectionKind::DebugStrOffsets => ".debug_str_offsets",
            SectionKind::DebugAddr => ".debug_addr",
            SectionKind::DebugRanges => ".debug_ranges",
            SectionKind::DebugRnglists => ".debug_rnglists",
            SectionKind::DebugTypes => ".debug_types",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// DWARF offset encoding of a section: 32-bit offsets or 64-bit offsets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    Dwarf32,
    Dwarf64,
}

impl Format {
    pub fn word_size(self) -> usize {
        match self {
            Format::Dwarf32 => 4,
            Format::Dwarf64 => 8,
        }
    }
}

/// Maps a section kind to a loaded section view.
pub trait SectionProvider {
    fn section(&self, kind: SectionKind) -> Option<Section>;
}

/// An immutable view over a contiguous byte range of a loaded section,
/// together with the metadata needed to decode it: byte order, DWARF offset
/// format and address size. Views are cheap to clone and subslice; the
/// backing bytes are shared.
#[derive(Clone, Debug)]
pub struct Section {
    kind: SectionKind,
    data: Rc<[u8]>,
    start: usize,
    end: usize,
    pub endian: Endian,
    pub format: Format,
    pub addr_size: u8,
}

impl Section {
    pub fn new(
        kind: SectionKind,
        data: impl Into<Rc<[u8]>>,
        endian: Endian,
        format: Format,
        addr_size: u8,
    ) -> Self {
        let data = data.into();
        let end = data.len();
        Section {
            kind,
            data,
            start: 0,
            end,
            endian,
            format,
            addr_size,
        }
    }

    pub(crate) fn empty(kind: SectionKind) -> Self {
        Section::new(kind, Vec::new(), Endian::Little, Format::Dwarf32, 8)
    }

    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// A subrange of this section sharing the backing bytes. The slice
    /// inherits byte order, format and address size.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Section> {
        if offset.checked_add(len).map_or(true, |end| end > self.len()) {
            bail_format!(
                "slice of {} bytes at offset {:#x} exceeds {} section of {} bytes",
                len,
                offset,
                self.kind.name(),
                self.len()
            );
        }
        let mut sub = self.clone();
        sub.start = self.start + offset;
        sub.end = sub.start + len;
        Ok(sub)
    }
}

/// A read cursor over a section view. Reads advance the position; reading
/// past the end of the section fails with a format error naming the section
/// and the offset.
pub struct Cursor<'a> {
    sec: &'a Section,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(sec: &'a Section) -> Self {
        Cursor { sec, pos: 0 }
    }

    pub fn at(sec: &'a Section, pos: usize) -> Self {
        Cursor { sec, pos }
    }

    pub fn section(&self) -> &'a Section {
        self.sec
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.sec.len()
    }

    fn overrun(&self, wanted: usize) -> crate::error::Error {
        crate::error::Error::Format(format!(
            "read of {} bytes at offset {:#x} runs past the end of {} ({} bytes)",
            wanted,
            self.pos,
            self.sec.kind().name(),
            self.sec.len()
        ))
    }

    pub fn advance(&mut self, amount: usize) -> Result<()> {
        if self.pos.checked_add(amount).map_or(true, |end| end > self.sec.len()) {
            return Err(self.overrun(amount));
        }
        self.pos += amount;
        Ok(())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos.checked_add(n).map_or(true, |end| end > self.sec.len()) {
            return Err(self.overrun(n));
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.sec.bytes()[start..self.pos])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?.try_into().unwrap();
        Ok(match self.sec.endian {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?.try_into().unwrap();
        Ok(match self.sec.endian {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        })
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?.try_into().unwrap();
        Ok(match self.sec.endian {
            Endian::Little => u64::from_le_bytes(bytes),
            Endian::Big => u64::from_be_bytes(bytes),
        })
    }

    /// Reads an address of the section's declared address size.
    pub fn address(&mut self) -> Result<u64> {
        match self.sec.addr_size {
            1 => Ok(self.read_u8()? as u64),
            2 => Ok(self.read_u16()? as u64),
            4 => Ok(self.read_u32()? as u64),
            8 => self.read_u64(),
            other => bail_format!("unsupported address size {}", other),
        }
    }

    /// Reads a section offset of the section's DWARF format width.
    pub fn offset(&mut self) -> Result<u64> {
        match self.sec.format {
            Format::Dwarf32 => Ok(self.read_u32()? as u64),
            Format::Dwarf64 => self.read_u64(),
        }
    }

    pub fn uleb128(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            if shift >= 64 {
                bail_format!(
                    "unsigned LEB128 longer than 10 bytes at offset {:#x} in {}",
                    self.pos,
                    self.sec.kind().name()
                );
            }
            result |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(result)
    }

    pub fn sleb128(&mut self) -> Result<i64> {
        let mut result = 0i64;
        let mut shift = 0;
        let mut byte;
        loop {
            byte = self.read_u8()?;
            if shift >= 64 {
                bail_format!(
                    "signed LEB128 longer than 10 bytes at offset {:#x} in {}",
                    self.pos,
                    self.sec.kind().name()
                );
            }
            result |= ((byte & 0x7f) as i64) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
        }
        if shift < 64 && (byte & 0x40) != 0 {
            result |= !0i64 << shift;
        }
        Ok(result)
    }

    /// Reads a null-terminated string, returning the bytes before the
    /// terminator.
    pub fn cstr(&mut self) -> Result<&'a [u8]> {
        let bytes = self.sec.bytes();
        let start = self.pos;
        let mut end = start;
        while end < bytes.len() && bytes[end] != 0 {
            end += 1;
        }
        if end >= bytes.len() {
            bail_format!(
                "unterminated string at offset {:#x} in {}",
                start,
                self.sec.kind().name()
            );
        }
        self.pos = end + 1;
        Ok(&bytes[start..end])
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.cstr()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            crate::error::Error::Format(format!(
                "invalid UTF-8 in string in {}",
                self.sec.kind().name()
            ))
        })
    }

    /// Reads an initial-length field: a 4-byte value, where `0xffffffff`
    /// announces 64-bit DWARF and an 8-byte length following it. The reserved
    /// values `0xfffffff0..=0xfffffffe` are rejected.
    pub fn initial_length(&mut self) -> Result<(u64, Format)> {
        let word = self.read_u32()?;
        if word == 0xffff_ffff {
            return Ok((self.read_u64()?, Format::Dwarf64));
        }
        if word >= 0xffff_fff0 {
            bail_format!(
                "reserved initial length {:#x} at offset {:#x} in {}",
                word,
                self.pos - 4,
                self.sec.kind().name()
            );
        }
        Ok((word as u64, Format::Dwarf32))
    }

    pub fn skip_initial_length(&mut self) -> Result<()> {
        self.initial_length()?;
        Ok(())
    }

    /// Slices out the subsection the initial length at the current position
    /// spans (prefix included) and advances past it. The returned view
    /// carries the DWARF format the prefix announced.
    pub fn subsection(&mut self) -> Result<Section> {
        let start = self.pos;
        let (length, format) = self.initial_length()?;
        let prefix = self.pos - start;
        let total = prefix
            .checked_add(length as usize)
            .ok_or_else(|| self.overrun(prefix))?;
        let mut sub = self.sec.slice(start, total)?;
        sub.format = format;
        self.pos = start + total;
        Ok(sub)
    }
}
