use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

use crate::constants::{
    DW_LNCT_DIRECTORY_INDEX, DW_LNCT_PATH, DW_LNCT_SIZE, DW_LNCT_TIMESTAMP, DW_LNE_DEFINE_FILE,
    DW_LNE_END_SEQUENCE, DW_LNE_HI_USER, DW_LNE_LO_USER, DW_LNE_SET_ADDRESS,
    DW_LNE_SET_DISCRIMINATOR,
    DW_LNS_ADVANCE_LINE, DW_LNS_ADVANCE_PC, DW_LNS_CONST_ADD_PC, DW_LNS_COPY,
    DW_LNS_FIXED_ADVANCE_PC, DW_LNS_NEGATE_STMT, DW_LNS_SET_BASIC_BLOCK, DW_LNS_SET_COLUMN,
    DW_LNS_SET_EPILOGUE_BEGIN, DW_LNS_SET_FILE, DW_LNS_SET_ISA, DW_LNS_SET_PROLOGUE_END,
};
use crate::error::{bail_format, bail_mismatch, Error, Result};
use crate::forms::Form;
use crate::section::{Cursor, Section};

// The expected operand counts for the standard opcodes, used to check the
// opcode_lengths header field for compatibility. The standard never says
// what to do on a mismatch; rejecting is the safe reading.
const OPCODE_LENGTHS: [u8; 12] = [0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1];

/// One entry of a line table's file-name list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineFile {
    pub path: PathBuf,
    pub mtime: u64,
    pub length: u64,
}

/// One row of the reconstructed line table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineRow {
    pub address: u64,
    pub op_index: u64,
    pub file_index: u64,
    pub line: u64,
    pub column: u64,
    pub is_stmt: bool,
    pub basic_block: bool,
    pub end_sequence: bool,
    pub prologue_end: bool,
    pub epilogue_begin: bool,
    pub isa: u64,
    pub discriminator: u64,
    pub file: LineFile,
}

#[derive(Copy, Clone)]
struct Registers {
    address: u64,
    op_index: u64,
    file_index: u64,
    line: u64,
    column: u64,
    is_stmt: bool,
    basic_block: bool,
    end_sequence: bool,
    prologue_end: bool,
    epilogue_begin: bool,
    isa: u64,
    discriminator: u64,
}

impl Registers {
    fn new(default_is_stmt: bool, file_index_base: u64) -> Self {
        Registers {
            address: 0,
            op_index: 0,
            file_index: file_index_base,
            line: 1,
            column: 0,
            is_stmt: default_is_stmt,
            basic_block: false,
            end_sequence: false,
            prologue_end: false,
            epilogue_begin: false,
            isa: 0,
            discriminator: 0,
        }
    }
}

#[derive(Debug)]
struct EntryFormat {
    content: u64,
    form: Form,
}

#[derive(Debug)]
struct Inner {
    // This table's subsection of .debug_line; carries the table's DWARF
    // format and address size.
    sec: Section,
    str_sec: Option<Section>,
    line_str_sec: Option<Section>,
    comp_dir: String,

    version: u16,
    program_offset: usize,
    minimum_instruction_length: u8,
    maximum_operations_per_instruction: u8,
    default_is_stmt: bool,
    line_base: i8,
    line_range: u8,
    opcode_base: u8,
    file_index_base: u64,
    include_directories: Vec<String>,
    file_entry_formats: Vec<EntryFormat>,

    // File name entries can appear both in the header and in the program
    // itself (DW_LNE_define_file). The program can be iterated repeatedly,
    // so this bookmark records how far the file list has been read to keep
    // the accumulation idempotent.
    file_names: RefCell<Vec<LineFile>>,
    last_file_name_end: Cell<usize>,
    // Once an iterator has traversed the whole program, all file names are
    // known.
    file_names_complete: Cell<bool>,
}

/// A line number program: the parsed header plus the state shared by every
/// iterator over its instruction stream. Cloning is cheap and shares that
/// state.
#[derive(Clone, Debug)]
pub struct LineTable {
    inner: Rc<Inner>,
}

impl LineTable {
    /// Parses the line table header at `offset` in `.debug_line`.
    ///
    /// `cu_addr_size`, `comp_dir` and `cu_name` come from the owning
    /// compilation unit; `str_sec` and `line_str_sec` are the string
    /// sections DWARF 5 headers may reference.
    pub fn new(
        line_sec: &Section,
        offset: usize,
        cu_addr_size: u8,
        comp_dir: &str,
        cu_name: &str,
        str_sec: Option<Section>,
        line_str_sec: Option<Section>,
    ) -> Result<LineTable> {
        let comp_dir = if comp_dir.is_empty() || comp_dir.ends_with('/') {
            comp_dir.to_string()
        } else {
            format!("{comp_dir}/")
        };

        let mut sec = Cursor::at(line_sec, offset).subsection()?;

        let mut cur = Cursor::new(&sec);
        cur.skip_initial_length()?;

        let version = cur.read_u16()?;
        if !(2..=5).contains(&version) {
            bail_format!("unknown line number table version {}", version);
        }
        let mut addr_size = cu_addr_size;
        if version >= 5 {
            addr_size = cur.read_u8()?;
            let _segment_selector_size = cur.read_u8()?;
        }
        let file_index_base: u64 = if version >= 5 { 0 } else { 1 };

        let header_length = cur.offset()? as usize;
        let program_offset = cur.position() + header_length;

        let minimum_instruction_length = cur.read_u8()?;
        let mut maximum_operations_per_instruction = 1;
        if version >= 4 {
            maximum_operations_per_instruction = cur.read_u8()?;
        }
        if maximum_operations_per_instruction == 0 {
            bail_format!("maximum_operations_per_instruction cannot be 0 in line number table");
        }
        let default_is_stmt = cur.read_u8()? != 0;
        let line_base = cur.read_i8()?;
        let line_range = cur.read_u8()?;
        if line_range == 0 {
            bail_format!("line_range cannot be 0 in line number table");
        }
        let opcode_base = cur.read_u8()?;

        for opcode in 1..opcode_base as usize {
            let length = cur.read_u8()?;
            if let Some(&expected) = OPCODE_LENGTHS.get(opcode - 1) {
                if length != expected {
                    bail_format!(
                        "expected {} arguments for line number opcode {}, got {}",
                        expected,
                        opcode,
                        length
                    );
                }
            }
        }

        // Include directories. Before version 5 the compilation directory is
        // implicit at index 0; version 5 stores it explicitly.
        let mut include_directories = Vec::new();
        if version < 5 {
            include_directories.push(comp_dir.clone());
            loop {
                let mut dir = cur.read_string()?;
                if dir.is_empty() {
                    break;
                }
                if !dir.ends_with('/') {
                    dir.push('/');
                }
                if dir.starts_with('/') {
                    include_directories.push(dir);
                } else {
                    include_directories.push(format!("{comp_dir}{dir}"));
                }
            }
        } else {
            let formats = read_entry_formats(&mut cur)?;
            let count = cur.uleb128()?;
            for _ in 0..count {
                let mut path = String::new();
                for fmt in &formats {
                    if fmt.content == DW_LNCT_PATH {
                        path = read_form_string(
                            &mut cur,
                            fmt.form,
                            str_sec.as_ref(),
                            line_str_sec.as_ref(),
                        )?;
                    } else {
                        cur.skip_form(fmt.form)?;
                    }
                }
                add_include_directory(&mut include_directories, &comp_dir, path);
            }
        }

        // File names. Before version 5 the compilation unit's file name is
        // implicit at index 0.
        let mut file_names = Vec::new();
        let mut file_entry_formats = Vec::new();
        let mut last_file_name_end = 0usize;
        if version < 5 {
            file_names.push(resolve_cu_name(&comp_dir, cu_name));
            loop {
                if !read_file_entry_pre_v5(
                    &mut cur,
                    true,
                    &mut last_file_name_end,
                    &mut file_names,
                    &include_directories,
                    &comp_dir,
                    version,
                )? {
                    break;
                }
            }
        } else {
            file_entry_formats = read_entry_formats(&mut cur)?;
            let count = cur.uleb128()?;
            for _ in 0..count {
                let record = read_v5_file_record(
                    &mut cur,
                    &file_entry_formats,
                    str_sec.as_ref(),
                    line_str_sec.as_ref(),
                )?;
                if !record.name.is_empty() {
                    add_file_entry(
                        &mut file_names,
                        &include_directories,
                        &comp_dir,
                        version,
                        record,
                    )?;
                }
            }
            if file_names.is_empty() {
                file_names.push(resolve_cu_name(&comp_dir, cu_name));
            }
        }

        drop(cur);
        sec.addr_size = addr_size;

        Ok(LineTable {
            inner: Rc::new(Inner {
                sec,
                str_sec,
                line_str_sec,
                comp_dir,
                version,
                program_offset,
                minimum_instruction_length,
                maximum_operations_per_instruction,
                default_is_stmt,
                line_base,
                line_range,
                opcode_base,
                file_index_base,
                include_directories,
                file_entry_formats,
                file_names: RefCell::new(file_names),
                last_file_name_end: Cell::new(last_file_name_end),
                file_names_complete: Cell::new(false),
            }),
        })
    }

    pub fn version(&self) -> u16 {
        self.inner.version
    }

    /// Offset of the first program instruction within the table's
    /// subsection.
    pub fn program_offset(&self) -> usize {
        self.inner.program_offset
    }

    pub fn default_is_stmt(&self) -> bool {
        self.inner.default_is_stmt
    }

    pub fn include_directories(&self) -> &[String] {
        &self.inner.include_directories
    }

    /// A snapshot of the file-name list as currently discovered.
    pub fn file_names(&self) -> Vec<LineFile> {
        self.inner.file_names.borrow().clone()
    }

    pub fn iter(&self) -> LineRows<'_> {
        LineRows {
            table: self,
            pos: self.inner.program_offset,
            regs: Registers::new(self.inner.default_is_stmt, self.inner.file_index_base),
            done: false,
        }
    }

    /// The last row `prev` with `prev.address <= addr < next.address` that
    /// does not end a sequence, or `None`.
    pub fn find_address(&self, addr: u64) -> Result<Option<LineRow>> {
        let mut iter = self.iter();
        let mut prev = match iter.next_row()? {
            Some(row) => row,
            None => return Ok(None),
        };
        while let Some(row) = iter.next_row()? {
            if prev.address <= addr && row.address > addr && !prev.end_sequence {
                return Ok(Some(prev));
            }
            prev = row;
        }
        Ok(None)
    }

    /// The file at `index`. An index beyond the current list forces a full
    /// pass over the program, since `DW_LNE_define_file` may still add
    /// entries.
    pub fn get_file(&self, index: u64) -> Result<LineFile> {
        if index as usize >= self.inner.file_names.borrow().len()
            && !self.inner.file_names_complete.get()
        {
            let mut iter = self.iter();
            while iter.next_row()?.is_some() {}
        }
        let files = self.inner.file_names.borrow();
        files.get(index as usize).cloned().ok_or_else(|| {
            Error::Format(format!(
                "file name index {} exceeds file table size of {}",
                index,
                files.len()
            ))
        })
    }
}

/// An iterator over the rows a line number program emits.
pub struct LineRows<'a> {
    table: &'a LineTable,
    pos: usize,
    regs: Registers,
    done: bool,
}

impl<'a> LineRows<'a> {
    pub fn next_row(&mut self) -> Result<Option<LineRow>> {
        if self.done {
            return Ok(None);
        }
        let inner = &*self.table.inner;
        let mut cur = Cursor::at(&inner.sec, self.pos);

        // Execute instructions until one emits a row or the program ends.
        let mut stepped = false;
        let mut emitted = None;
        while !cur.at_end() && emitted.is_none() {
            match step(inner, &mut self.regs, &mut cur) {
                Ok(row) => emitted = row,
                Err(err) => {
                    self.done = true;
                    return Err(err);
                }
            }
            stepped = true;
        }

        if stepped && emitted.is_none() {
            self.done = true;
            return Err(Error::Format("unexpected end of line table".into()));
        }
        if stepped && cur.at_end() {
            // All file names must be known now.
            inner.file_names_complete.set(true);
        }
        self.pos = cur.position();

        let regs = match emitted {
            Some(regs) => regs,
            None => {
                self.done = true;
                return Ok(None);
            }
        };

        let file = inner
            .file_names
            .borrow()
            .get(regs.file_index as usize)
            .cloned();
        let file = match file {
            Some(file) => file,
            None => {
                self.done = true;
                bail_format!("bad file index {} in line table", regs.file_index);
            }
        };

        Ok(Some(LineRow {
            address: regs.address,
            op_index: regs.op_index,
            file_index: regs.file_index,
            line: regs.line,
            column: regs.column,
            is_stmt: regs.is_stmt,
            basic_block: regs.basic_block,
            end_sequence: regs.end_sequence,
            prologue_end: regs.prologue_end,
            epilogue_begin: regs.epilogue_begin,
            isa: regs.isa,
            discriminator: regs.discriminator,
            file,
        }))
    }

}

// Executes one instruction; returns a snapshot of the registers when the
// instruction emits a row.
fn step(inner: &Inner, regs: &mut Registers, cur: &mut Cursor) -> Result<Option<Registers>> {
    let opcode = cur.read_u8()?;

    if opcode >= inner.opcode_base {
        // Special opcode: advance address and line, then emit.
        let adjusted = (opcode - inner.opcode_base) as u64;
        let op_advance = adjusted / inner.line_range as u64;
        let line_inc = inner.line_base as i64 + (adjusted % inner.line_range as u64) as i64;

        regs.line = regs.line.wrapping_add_signed(line_inc);
        advance_op(inner, regs, op_advance);
        let snapshot = *regs;
        clear_transient(regs);
        return Ok(Some(snapshot));
    }

    if opcode != 0 {
        // Standard opcode.
        match opcode {
            DW_LNS_COPY => {
                let snapshot = *regs;
                clear_transient(regs);
                return Ok(Some(snapshot));
            }
            DW_LNS_ADVANCE_PC => {
                let advance = cur.uleb128()?;
                advance_op(inner, regs, advance);
            }
            DW_LNS_ADVANCE_LINE => {
                let delta = cur.sleb128()?;
                regs.line = regs.line.wrapping_add_signed(delta);
            }
            DW_LNS_SET_FILE => regs.file_index = cur.uleb128()?,
            DW_LNS_SET_COLUMN => regs.column = cur.uleb128()?,
            DW_LNS_NEGATE_STMT => regs.is_stmt = !regs.is_stmt,
            DW_LNS_SET_BASIC_BLOCK => regs.basic_block = true,
            DW_LNS_CONST_ADD_PC => {
                let advance = ((255 - inner.opcode_base) / inner.line_range) as u64;
                advance_op(inner, regs, advance);
            }
            DW_LNS_FIXED_ADVANCE_PC => {
                let advance = cur.read_u16()? as u64;
                regs.address = regs.address.wrapping_add(advance);
                regs.op_index = 0;
            }
            DW_LNS_SET_PROLOGUE_END => regs.prologue_end = true,
            DW_LNS_SET_EPILOGUE_BEGIN => regs.epilogue_begin = true,
            DW_LNS_SET_ISA => regs.isa = cur.uleb128()?,
            // Opcodes below opcode_base but past the defined set are
            // vendor-specific with unknown operand counts.
            _ => bail_format!("unknown line number opcode {:#x}", opcode),
        }
        return Ok(None);
    }

    // Extended opcode: a length-prefixed sub-instruction.
    let length = cur.uleb128()? as usize;
    let end = cur
        .position()
        .checked_add(length)
        .ok_or_else(|| Error::Format("extended line number opcode length overflow".into()))?;
    let sub = cur.read_u8()?;
    let mut emitted = None;
    match sub {
        DW_LNE_END_SEQUENCE => {
            regs.end_sequence = true;
            emitted = Some(*regs);
            *regs = Registers::new(inner.default_is_stmt, inner.file_index_base);
        }
        DW_LNE_SET_ADDRESS => {
            regs.address = cur.address()?;
            regs.op_index = 0;
        }
        DW_LNE_DEFINE_FILE => define_file(inner, cur)?,
        DW_LNE_SET_DISCRIMINATOR => regs.discriminator = cur.uleb128()?,
        DW_LNE_LO_USER..=DW_LNE_HI_USER => {
            // Operand lengths of vendor opcodes are unknown.
            bail_format!("vendor line number opcode {:#x} not implemented", sub)
        }
        _ => bail_format!("unknown extended line number opcode {:#x}", sub),
    }
    if cur.position() > end {
        bail_format!("extended line number opcode exceeded its size");
    }
    cur.advance(end - cur.position())?;
    Ok(emitted)
}

fn advance_op(inner: &Inner, regs: &mut Registers, op_advance: u64) {
    let max_ops = inner.maximum_operations_per_instruction as u64;
    let total = regs.op_index.wrapping_add(op_advance);
    regs.address = regs
        .address
        .wrapping_add(inner.minimum_instruction_length as u64 * (total / max_ops));
    regs.op_index = total % max_ops;
}

fn clear_transient(regs: &mut Registers) {
    regs.basic_block = false;
    regs.prologue_end = false;
    regs.epilogue_begin = false;
    regs.discriminator = 0;
}

fn define_file(inner: &Inner, cur: &mut Cursor) -> Result<()> {
    let mut last = inner.last_file_name_end.get();
    let mut files = inner.file_names.borrow_mut();

    if inner.version >= 5 {
        if inner.file_entry_formats.is_empty() {
            bail_format!("line table missing file name entry formats");
        }
        let record = read_v5_file_record(
            cur,
            &inner.file_entry_formats,
            inner.str_sec.as_ref(),
            inner.line_str_sec.as_ref(),
        )?;
        if cur.position() > last {
            last = cur.position();
            if !record.name.is_empty() {
                add_file_entry(
                    &mut files,
                    &inner.include_directories,
                    &inner.comp_dir,
                    inner.version,
                    record,
                )?;
            }
        }
    } else {
        read_file_entry_pre_v5(
            cur,
            false,
            &mut last,
            &mut files,
            &inner.include_directories,
            &inner.comp_dir,
            inner.version,
        )?;
    }

    inner.last_file_name_end.set(last);
    Ok(())
}

impl<'a> Iterator for LineRows<'a> {
    type Item = Result<LineRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

struct FileRecord {
    name: String,
    dir_index: u64,
    mtime: u64,
    length: u64,
}

fn resolve_cu_name(comp_dir: &str, cu_name: &str) -> LineFile {
    let path = if cu_name.starts_with('/') {
        PathBuf::from(cu_name)
    } else {
        PathBuf::from(format!("{comp_dir}{cu_name}"))
    };
    LineFile {
        path,
        mtime: 0,
        length: 0,
    }
}

fn add_include_directory(dirs: &mut Vec<String>, comp_dir: &str, dir: String) {
    let mut resolved = dir;
    if !resolved.is_empty() && !resolved.ends_with('/') {
        resolved.push('/');
    }
    if !resolved.is_empty() && !resolved.starts_with('/') && !comp_dir.is_empty() {
        resolved = format!("{comp_dir}{resolved}");
    }
    if resolved.is_empty() {
        resolved = comp_dir.to_string();
    }
    dirs.push(resolved);
}

fn add_file_entry(
    files: &mut Vec<LineFile>,
    dirs: &[String],
    comp_dir: &str,
    version: u16,
    record: FileRecord,
) -> Result<()> {
    if record.name.is_empty() {
        bail_format!("file entry missing file name");
    }
    if record.name.starts_with('/') {
        files.push(LineFile {
            path: PathBuf::from(record.name),
            mtime: record.mtime,
            length: record.length,
        });
        return Ok(());
    }

    let base = if (record.dir_index as usize) < dirs.len() {
        Some(dirs[record.dir_index as usize].as_str())
    } else if record.dir_index == 0 && version < 5 && !comp_dir.is_empty() {
        Some(comp_dir)
    } else {
        None
    };
    let base = match base {
        Some(base) => base,
        None => bail_format!(
            "file name directory index out of range: {}",
            record.dir_index
        ),
    };
    files.push(LineFile {
        path: PathBuf::from(format!("{base}{}", record.name)),
        mtime: record.mtime,
        length: record.length,
    });
    Ok(())
}

// Pre-v5 file entry, both from the header (where an empty name terminates
// the list) and from DW_LNE_define_file. Entries at or before the bookmark
// have already been recorded. Returns false at the header terminator.
fn read_file_entry_pre_v5(
    cur: &mut Cursor,
    in_header: bool,
    last_file_name_end: &mut usize,
    files: &mut Vec<LineFile>,
    dirs: &[String],
    comp_dir: &str,
    version: u16,
) -> Result<bool> {
    let name = cur.read_string()?;
    if in_header && name.is_empty() {
        return Ok(false);
    }
    let dir_index = cur.uleb128()?;
    let mtime = cur.uleb128()?;
    let length = cur.uleb128()?;

    if cur.position() <= *last_file_name_end {
        return Ok(true);
    }
    *last_file_name_end = cur.position();

    if name.is_empty() {
        return Ok(false);
    }
    add_file_entry(
        files,
        dirs,
        comp_dir,
        version,
        FileRecord {
            name,
            dir_index,
            mtime,
            length,
        },
    )?;
    Ok(true)
}

fn read_entry_formats(cur: &mut Cursor) -> Result<Vec<EntryFormat>> {
    let count = cur.read_u8()? as usize;
    let mut formats = Vec::with_capacity(count);
    for _ in 0..count {
        let content = cur.uleb128()?;
        let form = Form::from_code(cur.uleb128()?)?;
        formats.push(EntryFormat { content, form });
    }
    Ok(formats)
}

fn read_v5_file_record(
    cur: &mut Cursor,
    formats: &[EntryFormat],
    str_sec: Option<&Section>,
    line_str_sec: Option<&Section>,
) -> Result<FileRecord> {
    let mut record = FileRecord {
        name: String::new(),
        dir_index: 0,
        mtime: 0,
        length: 0,
    };
    for fmt in formats {
        match fmt.content {
            DW_LNCT_PATH => {
                record.name = read_form_string(cur, fmt.form, str_sec, line_str_sec)?;
            }
            DW_LNCT_DIRECTORY_INDEX => record.dir_index = read_form_unsigned(cur, fmt.form)?,
            DW_LNCT_TIMESTAMP => record.mtime = read_form_unsigned(cur, fmt.form)?,
            DW_LNCT_SIZE => record.length = read_form_unsigned(cur, fmt.form)?,
            // Unknown content (MD5 included) is skipped by form.
            _ => cur.skip_form(fmt.form)?,
        }
    }
    Ok(record)
}

fn read_form_string(
    cur: &mut Cursor,
    form: Form,
    str_sec: Option<&Section>,
    line_str_sec: Option<&Section>,
) -> Result<String> {
    match form {
        Form::String => cur.read_string(),
        Form::Strp => {
            let off = cur.offset()? as usize;
            read_string_from(str_sec, off)
        }
        Form::LineStrp => {
            let off = cur.offset()? as usize;
            read_string_from(line_str_sec, off)
        }
        _ => bail_mismatch!("unsupported string form in line table: {}", form),
    }
}

fn read_string_from(sec: Option<&Section>, off: usize) -> Result<String> {
    let sec = sec.ok_or_else(|| {
        Error::Format("line table requires a string section to read strings".into())
    })?;
    Cursor::at(sec, off).read_string()
}

fn read_form_unsigned(cur: &mut Cursor, form: Form) -> Result<u64> {
    Ok(match form {
        Form::Data1 => cur.read_u8()? as u64,
        Form::Data2 => cur.read_u16()? as u64,
        Form::Data4 => cur.read_u32()? as u64,
        Form::Data8 => cur.read_u64()?,
        Form::Udata => cur.uleb128()?,
        Form::Sdata => cur.sleb128()? as u64,
        _ => bail_mismatch!("unsupported numeric form in line table: {}", form),
    })
}
