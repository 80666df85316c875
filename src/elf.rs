use std::collections::HashMap;
use std::fs::File;
use std::mem;
use std::path::{Path, PathBuf};

use libc::{Elf64_Ehdr, Elf64_Shdr};
use memmap2::Mmap;

use crate::error::{bail_format, Result};
use crate::section::{Endian, Format, Section, SectionKind, SectionProvider};

const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;

/// A 64-bit little-endian ELF file, memory-mapped, serving `.debug_*`
/// section bytes to the reader.
pub struct Elf {
    pub path: PathBuf,
    file_size: usize,
    mmap: Mmap,
    header: Elf64_Ehdr,
    section_headers: Vec<Elf64_Shdr>,
    // Section name -> index into section_headers.
    section_map: HashMap<String, usize>,
}

impl Elf {
    pub fn new(path: impl AsRef<Path>) -> Result<Elf> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len() as usize;

        // Map the whole file read-only.
        let mmap = unsafe { Mmap::map(&file)? };

        if file_size < mem::size_of::<Elf64_Ehdr>() {
            bail_format!("{}: file too small for an ELF header", path.display());
        }
        if &mmap[..4] != b"\x7fELF" {
            bail_format!("{}: not an ELF file", path.display());
        }
        if mmap[EI_CLASS] != ELFCLASS64 {
            bail_format!("{}: only 64-bit ELF is supported", path.display());
        }
        if mmap[EI_DATA] != ELFDATA2LSB {
            bail_format!("{}: only little-endian ELF is supported", path.display());
        }

        // SAFETY: the bounds were checked above; the header is read
        // unaligned out of the mapping.
        let header =
            unsafe { std::ptr::read_unaligned(mmap.as_ptr() as *const Elf64_Ehdr) };

        let mut elf = Elf {
            path,
            file_size,
            mmap,
            header,
            section_headers: Vec::new(),
            section_map: HashMap::new(),
        };
        elf.parse_section_headers()?;
        elf.build_section_map();
        Ok(elf)
    }

    fn parse_section_headers(&mut self) -> Result<()> {
        let shoff = self.header.e_shoff as usize;
        let entsize = self.header.e_shentsize as usize;
        let mut count = self.header.e_shnum as usize;

        if entsize != mem::size_of::<Elf64_Shdr>() {
            bail_format!("{}: invalid section header entry size", self.path.display());
        }

        if count == 0 {
            // ELF extension: the real count lives in sh_size of the first
            // header.
            if shoff.checked_add(entsize).map_or(true, |end| end > self.file_size) {
                bail_format!("{}: invalid section header offset", self.path.display());
            }
            let first = unsafe {
                std::ptr::read_unaligned(self.mmap[shoff..].as_ptr() as *const Elf64_Shdr)
            };
            count = first.sh_size as usize;
        }

        let table_end = count
            .checked_mul(entsize)
            .and_then(|total| total.checked_add(shoff));
        if count == 0 || table_end.map_or(true, |end| end > self.file_size) {
            bail_format!("{}: invalid section header table", self.path.display());
        }

        self.section_headers.reserve(count);
        for i in 0..count {
            let off = shoff + i * entsize;
            // SAFETY: off + entsize <= file_size was established above.
            let shdr = unsafe {
                std::ptr::read_unaligned(self.mmap[off..].as_ptr() as *const Elf64_Shdr)
            };
            self.section_headers.push(shdr);
        }
        Ok(())
    }

    fn build_section_map(&mut self) {
        for index in 0..self.section_headers.len() {
            if let Some(name) = self.section_name(index) {
                self.section_map.insert(name.to_string(), index);
            }
        }
    }

    fn section_name(&self, index: usize) -> Option<&str> {
        let shstrndx = self.header.e_shstrndx as usize;
        let shstr = self.section_headers.get(shstrndx)?;
        let name_off = self.section_headers.get(index)?.sh_name as usize;
        let start = shstr.sh_offset as usize + name_off;
        if start >= self.file_size {
            return None;
        }
        let bytes = &self.mmap[start..];
        let end = bytes.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&bytes[..end]).ok()
    }

    /// A copy of the named section's bytes, or `None` if absent or
    /// malformed.
    pub fn section_bytes(&self, name: &str) -> Option<Vec<u8>> {
        let &index = self.section_map.get(name)?;
        let shdr = &self.section_headers[index];
        let offset = shdr.sh_offset as usize;
        let size = shdr.sh_size as usize;
        if offset.checked_add(size)? > self.file_size {
            return None;
        }
        Some(self.mmap[offset..offset + size].to_vec())
    }
}

impl SectionProvider for Elf {
    fn section(&self, kind: SectionKind) -> Option<Section> {
        let bytes = self.section_bytes(kind.name())?;
        log::trace!("{}: loaded {} ({} bytes)", self.path.display(), kind.name(), bytes.len());
        Some(Section::new(kind, bytes, Endian::Little, Format::Dwarf32, 8))
    }
}
