use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::abbrev::{parse_abbrev_table, Abbrev};
use crate::constants::{
    DW_AT_ADDR_BASE, DW_AT_COMP_DIR, DW_AT_NAME, DW_AT_STMT_LIST, DW_AT_STR_OFFSETS_BASE,
    DW_UT_COMPILE, DW_UT_SPLIT_TYPE, DW_UT_TYPE,
};
use crate::die::{parse_die_at, Die};
use crate::error::{bail_format, Result};
use crate::line::LineTable;
use crate::section::{Cursor, Format, Section, SectionKind, SectionProvider};

/// One compilation or type unit of `.debug_info` (or `.debug_types`).
#[derive(Debug)]
pub struct CompileUnit {
    offset: usize,
    size: usize,
    version: u16,
    unit_type: u8,
    addr_size: u8,
    format: Format,
    root_offset: usize,
    type_signature: Option<u64>,
    type_offset: usize,
    data: Section,
    abbrevs: Rc<HashMap<u64, Abbrev>>,
    line_table: RefCell<Option<LineTable>>,
}

impl CompileUnit {
    /// Section offset of the unit header.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Header plus DIE bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn unit_type(&self) -> u8 {
        self.unit_type
    }

    pub fn addr_size(&self) -> u8 {
        self.addr_size
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn type_signature(&self) -> Option<u64> {
        self.type_signature
    }

    /// The unit's bytes, header included. DIE offsets are relative to this
    /// view.
    pub fn data(&self) -> &Section {
        &self.data
    }

    pub(crate) fn abbrev(&self, code: u64) -> Option<&Abbrev> {
        self.abbrevs.get(&code)
    }

    /// The unit's root DIE.
    pub fn root<'dw>(&'dw self, dwarf: &'dw Dwarf) -> Result<Die<'dw>> {
        parse_die_at(dwarf, self, self.root_offset)
    }

    /// Reads the DIE at a unit-relative offset.
    pub fn die_at<'dw>(&'dw self, dwarf: &'dw Dwarf, offset: usize) -> Result<Die<'dw>> {
        parse_die_at(dwarf, self, offset)
    }

    /// For a type unit: the DIE its signature describes.
    pub fn type_root<'dw>(&'dw self, dwarf: &'dw Dwarf) -> Result<Die<'dw>> {
        if self.type_signature.is_none() {
            bail_format!("unit at offset {:#x} is not a type unit", self.offset);
        }
        parse_die_at(dwarf, self, self.type_offset)
    }

    /// The unit's line table, if its root DIE carries `DW_AT_stmt_list`.
    /// Parsed once and cached.
    pub fn lines(&self, dwarf: &Dwarf) -> Result<Option<LineTable>> {
        if let Some(table) = self.line_table.borrow().as_ref() {
            return Ok(Some(table.clone()));
        }

        let root = self.root(dwarf)?;
        if !root.contains(DW_AT_STMT_LIST) {
            return Ok(None);
        }
        let offset = root.attr(DW_AT_STMT_LIST)?.as_sec_offset()? as usize;
        let comp_dir = if root.contains(DW_AT_COMP_DIR) {
            root.attr(DW_AT_COMP_DIR)?.as_string()?
        } else {
            String::new()
        };
        let name = if root.contains(DW_AT_NAME) {
            root.attr(DW_AT_NAME)?.as_string()?
        } else {
            String::new()
        };

        let table = LineTable::new(
            dwarf.section(SectionKind::DebugLine),
            offset,
            self.addr_size,
            &comp_dir,
            &name,
            Some(dwarf.section(SectionKind::DebugStr).clone()),
            Some(dwarf.section(SectionKind::DebugLineStr).clone()),
        )?;
        *self.line_table.borrow_mut() = Some(table.clone());
        Ok(Some(table))
    }

    /// Start of the address table for this unit in `.debug_addr`: the unit
    /// root's `DW_AT_addr_base` when present, the fixed header size otherwise.
    pub(crate) fn addr_base(&self, dwarf: &Dwarf) -> Result<usize> {
        let root = self.root(dwarf)?;
        if root.contains(DW_AT_ADDR_BASE) {
            return Ok(root.attr(DW_AT_ADDR_BASE)?.as_sec_offset()? as usize);
        }
        Ok(match dwarf.section(SectionKind::DebugAddr).format {
            Format::Dwarf32 => 8,
            Format::Dwarf64 => 16,
        })
    }

    /// Start of the offset table for this unit in `.debug_str_offsets`,
    /// resolved the same way as [`CompileUnit::addr_base`].
    pub(crate) fn str_offsets_base(&self, dwarf: &Dwarf) -> Result<usize> {
        let root = self.root(dwarf)?;
        if root.contains(DW_AT_STR_OFFSETS_BASE) {
            return Ok(root.attr(DW_AT_STR_OFFSETS_BASE)?.as_sec_offset()? as usize);
        }
        Ok(match dwarf.section(SectionKind::DebugStrOffsets).format {
            Format::Dwarf32 => 8,
            Format::Dwarf64 => 16,
        })
    }
}

/// The loaded debugging information of one object: its `.debug_*` sections
/// and the index of compilation and type units.
#[derive(Debug)]
pub struct Dwarf {
    debug_info: Section,
    debug_abbrev: Section,
    debug_line: Section,
    debug_line_str: Section,
    debug_str: Section,
    debug_str_offsets: Section,
    debug_addr: Section,
    debug_ranges: Section,
    debug_rnglists: Section,
    debug_types: Section,
    compile_units: Vec<CompileUnit>,
    type_units: Vec<CompileUnit>,
    sig_index: HashMap<u64, (bool, usize)>,
}

impl Dwarf {
    pub fn load(provider: &impl SectionProvider) -> Result<Dwarf> {
        let get = |kind: SectionKind| provider.section(kind).unwrap_or_else(|| Section::empty(kind));

        let debug_info = get(SectionKind::DebugInfo);
        let debug_abbrev = get(SectionKind::DebugAbbrev);
        let debug_types = get(SectionKind::DebugTypes);

        let mut abbrev_tables = HashMap::new();
        let compile_units = parse_units(&debug_info, &debug_abbrev, &mut abbrev_tables)?;
        let type_units = parse_units(&debug_types, &debug_abbrev, &mut abbrev_tables)?;

        let mut sig_index = HashMap::new();
        for (index, unit) in compile_units.iter().enumerate() {
            if let Some(sig) = unit.type_signature {
                sig_index.insert(sig, (false, index));
            }
        }
        for (index, unit) in type_units.iter().enumerate() {
            if let Some(sig) = unit.type_signature {
                sig_index.insert(sig, (true, index));
            }
        }

        log::trace!(
            "loaded DWARF: {} compilation unit(s), {} type unit(s)",
            compile_units.len(),
            type_units.len()
        );

        Ok(Dwarf {
            debug_info,
            debug_abbrev,
            debug_line: get(SectionKind::DebugLine),
            debug_line_str: get(SectionKind::DebugLineStr),
            debug_str: get(SectionKind::DebugStr),
            debug_str_offsets: get(SectionKind::DebugStrOffsets),
            debug_addr: get(SectionKind::DebugAddr),
            debug_ranges: get(SectionKind::DebugRanges),
            debug_rnglists: get(SectionKind::DebugRnglists),
            debug_types,
            compile_units,
            type_units,
            sig_index,
        })
    }

    pub fn section(&self, kind: SectionKind) -> &Section {
        match kind {
            SectionKind::DebugInfo => &self.debug_info,
            SectionKind::DebugAbbrev => &self.debug_abbrev,
            SectionKind::DebugLine => &self.debug_line,
            SectionKind::DebugLineStr => &self.debug_line_str,
            SectionKind::DebugStr => &self.debug_str,
            SectionKind::DebugStrOffsets => &self.debug_str_offsets,
            SectionKind::DebugAddr => &self.debug_addr,
            SectionKind::DebugRanges => &self.debug_ranges,
            SectionKind::DebugRnglists => &self.debug_rnglists,
            SectionKind::DebugTypes => &self.debug_types,
        }
    }

    /// Compilation units in `.debug_info` section-offset order.
    pub fn compile_units(&self) -> &[CompileUnit] {
        &self.compile_units
    }

    /// Type units of `.debug_types` (DWARF 4). DWARF 5 type units live in
    /// `.debug_info` and appear in [`Dwarf::compile_units`].
    pub fn type_units(&self) -> &[CompileUnit] {
        &self.type_units
    }

    /// The compilation unit whose range of `.debug_info` contains the given
    /// section offset.
    pub fn unit_containing_offset(&self, offset: usize) -> Result<&CompileUnit> {
        let idx = self
            .compile_units
            .partition_point(|unit| unit.offset <= offset);
        if idx > 0 {
            let unit = &self.compile_units[idx - 1];
            if offset < unit.offset + unit.size {
                return Ok(unit);
            }
        }
        bail_format!(
            "no compilation unit contains .debug_info offset {:#x}",
            offset
        )
    }

    /// Looks up a type unit by its 8-byte signature.
    pub fn type_unit(&self, signature: u64) -> Option<&CompileUnit> {
        self.sig_index.get(&signature).map(|&(in_types, index)| {
            if in_types {
                &self.type_units[index]
            } else {
                &self.compile_units[index]
            }
        })
    }
}

fn parse_units(
    sec: &Section,
    abbrev_sec: &Section,
    abbrev_tables: &mut HashMap<u64, Rc<HashMap<u64, Abbrev>>>,
) -> Result<Vec<CompileUnit>> {
    let mut units = Vec::new();
    let mut offset = 0usize;
    while offset < sec.len() {
        let mut cur = Cursor::at(sec, offset);
        let (length, format) = cur.initial_length()?;
        let prefix = cur.position() - offset;
        let total = match (length as usize).checked_add(prefix) {
            Some(total) if length > 0 && offset + total <= sec.len() => total,
            _ => bail_format!(
                "unit at offset {:#x} extends past the end of {}",
                offset,
                sec.kind().name()
            ),
        };

        let read_word = |cur: &mut Cursor| -> Result<u64> {
            match format {
                Format::Dwarf32 => Ok(cur.read_u32()? as u64),
                Format::Dwarf64 => cur.read_u64(),
            }
        };

        let version = cur.read_u16()?;
        if !(2..=5).contains(&version) {
            bail_format!(
                "unknown compilation unit version {} at offset {:#x}",
                version,
                offset
            );
        }

        let mut unit_type = DW_UT_COMPILE;
        let abbrev_offset;
        let addr_size;
        if version >= 5 {
            unit_type = cur.read_u8()?;
            addr_size = cur.read_u8()?;
            abbrev_offset = read_word(&mut cur)?;
        } else {
            abbrev_offset = read_word(&mut cur)?;
            addr_size = cur.read_u8()?;
        }
        if addr_size != 4 && addr_size != 8 {
            bail_format!(
                "unsupported address size {} in unit at offset {:#x}",
                addr_size,
                offset
            );
        }

        let mut type_signature = None;
        let mut type_offset = 0usize;
        let is_type_unit = sec.kind() == SectionKind::DebugTypes
            || (version >= 5 && (unit_type == DW_UT_TYPE || unit_type == DW_UT_SPLIT_TYPE));
        if is_type_unit {
            type_signature = Some(cur.read_u64()?);
            type_offset = read_word(&mut cur)? as usize;
        }

        let root_offset = cur.position() - offset;

        let abbrevs = if let Some(table) = abbrev_tables.get(&abbrev_offset) {
            table.clone()
        } else {
            let table = Rc::new(parse_abbrev_table(abbrev_sec, abbrev_offset as usize)?);
            abbrev_tables.insert(abbrev_offset, table.clone());
            table
        };

        let mut data = sec.slice(offset, total)?;
        data.format = format;
        data.addr_size = addr_size;

        log::trace!(
            "unit at {:#x} in {}: version {}, addr_size {}, {} bytes",
            offset,
            sec.kind().name(),
            version,
            addr_size,
            total
        );

        units.push(CompileUnit {
            offset,
            size: total,
            version,
            unit_type,
            addr_size,
            format,
            root_offset,
            type_signature,
            type_offset,
            data,
            abbrevs,
            line_table: RefCell::new(None),
        });
        offset += total;
    }
    Ok(units)
}
