use std::fmt;

use crate::abbrev::AttrSpec;
use crate::constants::{
    DW_AT_FRAME_BASE, DW_AT_LOCATION, DW_AT_LOW_PC, DW_AT_MACROS, DW_AT_MACRO_INFO,
    DW_AT_RANGES, DW_AT_RETURN_ADDR, DW_AT_SEGMENT, DW_AT_START_SCOPE, DW_AT_STATIC_LINK,
    DW_AT_STMT_LIST, DW_AT_STRING_LENGTH, DW_AT_USE_LOCATION, DW_AT_VTABLE_ELEM_LOCATION,
};
use crate::die::Die;
use crate::dwarf::{CompileUnit, Dwarf};
use crate::error::{bail_format, bail_mismatch, Error, Result};
use crate::forms::Form;
use crate::ranges::RangeList;
use crate::section::{Cursor, Format, SectionKind};

/// The semantic type an attribute value is declared with, derived from its
/// attribute and form.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Address,
    Block,
    Constant,
    UConstant,
    SConstant,
    Exprloc,
    Flag,
    Line,
    LocList,
    Mac,
    RangeList,
    Reference,
    String,
    SecOffset,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Address => "address",
            ValueKind::Block => "block",
            ValueKind::Constant => "constant",
            ValueKind::UConstant => "uconstant",
            ValueKind::SConstant => "sconstant",
            ValueKind::Exprloc => "exprloc",
            ValueKind::Flag => "flag",
            ValueKind::Line => "line",
            ValueKind::LocList => "loclist",
            ValueKind::Mac => "mac",
            ValueKind::RangeList => "rangelist",
            ValueKind::Reference => "reference",
            ValueKind::String => "string",
            ValueKind::SecOffset => "sec_offset",
        })
    }
}

// Prior to DWARF 4 the section-offset classes were encoded as data4/data8;
// which class applies is decided by the attribute.
fn offset_class(attr: u64) -> Option<ValueKind> {
    match attr {
        DW_AT_STMT_LIST => Some(ValueKind::Line),
        DW_AT_RANGES | DW_AT_START_SCOPE => Some(ValueKind::RangeList),
        DW_AT_LOCATION
        | DW_AT_STRING_LENGTH
        | DW_AT_RETURN_ADDR
        | DW_AT_FRAME_BASE
        | DW_AT_SEGMENT
        | DW_AT_STATIC_LINK
        | DW_AT_USE_LOCATION
        | DW_AT_VTABLE_ELEM_LOCATION => Some(ValueKind::LocList),
        DW_AT_MACRO_INFO | DW_AT_MACROS => Some(ValueKind::Mac),
        _ => None,
    }
}

fn kind_for(attr: u64, form: Form) -> ValueKind {
    match form {
        Form::Addr | Form::Addrx | Form::Addrx1 | Form::Addrx2 | Form::Addrx3 | Form::Addrx4 => {
            ValueKind::Address
        }
        Form::Block | Form::Block1 | Form::Block2 | Form::Block4 => ValueKind::Block,
        Form::Data1 | Form::Data2 | Form::Data16 => ValueKind::Constant,
        Form::Data4 | Form::Data8 => offset_class(attr).unwrap_or(ValueKind::Constant),
        Form::Udata => ValueKind::UConstant,
        Form::Sdata => ValueKind::SConstant,
        Form::ImplicitConst => ValueKind::Constant,
        Form::String | Form::Strp | Form::LineStrp | Form::Strx | Form::Strx1 | Form::Strx2
        | Form::Strx3 | Form::Strx4 => ValueKind::String,
        Form::Flag | Form::FlagPresent => ValueKind::Flag,
        Form::RefAddr | Form::Ref1 | Form::Ref2 | Form::Ref4 | Form::Ref8 | Form::RefUdata
        | Form::RefSig8 => ValueKind::Reference,
        Form::SecOffset => offset_class(attr).unwrap_or(ValueKind::SecOffset),
        Form::Exprloc => ValueKind::Exprloc,
        Form::Rnglistx => ValueKind::RangeList,
        Form::Loclistx => ValueKind::LocList,
        Form::Indirect => ValueKind::SecOffset,
    }
}

/// An opaque handle to a DWARF expression: the owning unit, the
/// unit-relative offset of the expression bytes, and their length.
#[derive(Clone, Copy)]
pub struct Expr<'dw> {
    unit: &'dw CompileUnit,
    offset: usize,
    len: usize,
}

impl<'dw> Expr<'dw> {
    pub fn unit(&self) -> &'dw CompileUnit {
        self.unit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn section_offset(&self) -> usize {
        self.unit.offset() + self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> Result<&'dw [u8]> {
        let mut cur = Cursor::at(self.unit.data(), self.offset);
        cur.read_bytes(self.len)
    }
}

/// A typed view over one attribute value: the owning unit, the form, the
/// declared semantic type, and the unit-relative offset of the payload.
#[derive(Clone)]
pub struct Value<'dw> {
    dwarf: &'dw Dwarf,
    unit: &'dw CompileUnit,
    attr: u64,
    form: Form,
    kind: ValueKind,
    offset: usize,
    implicit_const: Option<i64>,
}

impl<'dw> Value<'dw> {
    pub(crate) fn new(
        dwarf: &'dw Dwarf,
        unit: &'dw CompileUnit,
        spec: &AttrSpec,
        offset: usize,
    ) -> Result<Value<'dw>> {
        let mut value = Value {
            dwarf,
            unit,
            attr: spec.attr,
            form: spec.form,
            kind: kind_for(spec.attr, spec.form),
            offset,
            implicit_const: spec.implicit_const,
        };
        if value.form == Form::Indirect {
            value.resolve_indirect()?;
        }
        Ok(value)
    }

    // Chase the embedded form chain until a concrete form is found, then
    // point the payload offset past the last form code.
    fn resolve_indirect(&mut self) -> Result<()> {
        let mut cur = Cursor::at(self.unit.data(), self.offset);
        let mut form = self.form;
        while form == Form::Indirect {
            form = Form::from_code(cur.uleb128()?)?;
        }
        if form == Form::ImplicitConst {
            bail_format!(
                "indirect form resolves to implicit_const at offset {:#x}",
                self.get_section_offset()
            );
        }
        self.form = form;
        self.kind = kind_for(self.attr, form);
        self.offset = cur.position();
        Ok(())
    }

    pub fn attr(&self) -> u64 {
        self.attr
    }

    pub fn form(&self) -> Form {
        self.form
    }

    pub fn get_type(&self) -> ValueKind {
        self.kind
    }

    /// Absolute section offset of this value's payload.
    pub fn get_section_offset(&self) -> usize {
        self.unit.offset() + self.offset
    }

    fn cursor(&self) -> Cursor<'dw> {
        Cursor::at(self.unit.data(), self.offset)
    }

    pub fn as_address(&self) -> Result<u64> {
        let mut cur = self.cursor();
        if self.form == Form::Addr {
            return cur.address();
        }

        let index = match self.form {
            Form::Addrx => cur.uleb128()?,
            Form::Addrx1 => cur.read_u8()? as u64,
            Form::Addrx2 => cur.read_u16()? as u64,
            Form::Addrx3 => {
                // Three bytes, low byte first.
                cur.read_u8()? as u64 | (cur.read_u16()? as u64) << 8
            }
            Form::Addrx4 => cur.read_u32()? as u64,
            _ => bail_mismatch!("cannot read {} as address", self.kind),
        };

        // Chase the index through the unit's table in .debug_addr. The
        // address is read with the unit's address size, not the section's.
        let addr_sec = self.dwarf.section(SectionKind::DebugAddr);
        let base = self.unit.addr_base(self.dwarf)?;
        let addr_size = self.unit.addr_size() as usize;
        let pos = (index as usize)
            .checked_mul(addr_size)
            .and_then(|off| off.checked_add(base))
            .ok_or_else(|| Error::Format(format!("address index {} out of bounds", index)))?;
        let mut addr_cur = Cursor::at(addr_sec, pos);
        match addr_size {
            4 => Ok(addr_cur.read_u32()? as u64),
            8 => addr_cur.read_u64(),
            other => bail_format!("unsupported address size {}", other),
        }
    }

    pub fn as_uconstant(&self) -> Result<u64> {
        let mut cur = self.cursor();
        Ok(match self.form {
            Form::Data1 => cur.read_u8()? as u64,
            Form::Data2 => cur.read_u16()? as u64,
            Form::Data4 => cur.read_u32()? as u64,
            Form::Data8 => cur.read_u64()?,
            Form::Udata => cur.uleb128()?,
            Form::ImplicitConst => self.implicit_const.unwrap_or(0) as u64,
            _ => bail_mismatch!("cannot read {} as uconstant", self.kind),
        })
    }

    pub fn as_sconstant(&self) -> Result<i64> {
        let mut cur = self.cursor();
        Ok(match self.form {
            Form::Data1 => cur.read_i8()? as i64,
            Form::Data2 => cur.read_u16()? as i16 as i64,
            Form::Data4 => cur.read_u32()? as i32 as i64,
            Form::Data8 => cur.read_u64()? as i64,
            Form::Sdata => cur.sleb128()?,
            Form::ImplicitConst => self.implicit_const.unwrap_or(0),
            _ => bail_mismatch!("cannot read {} as sconstant", self.kind),
        })
    }

    pub fn as_flag(&self) -> Result<bool> {
        match self.form {
            Form::Flag => Ok(self.cursor().read_u8()? != 0),
            Form::FlagPresent => Ok(true),
            _ => bail_mismatch!("cannot read {} as flag", self.kind),
        }
    }

    /// The block's bytes in place, past its length prefix.
    pub fn as_block(&self) -> Result<&'dw [u8]> {
        let mut cur = self.cursor();
        let size = match self.form {
            Form::Block1 => cur.read_u8()? as usize,
            Form::Block2 => cur.read_u16()? as usize,
            Form::Block4 => cur.read_u32()? as usize,
            Form::Block | Form::Exprloc => cur.uleb128()? as usize,
            _ => bail_mismatch!("cannot read {} as block", self.kind),
        };
        cur.read_bytes(size)
    }

    pub fn as_exprloc(&self) -> Result<Expr<'dw>> {
        let mut cur = self.cursor();
        // Prior to DWARF 4 expressions were encoded as blocks.
        let size = match self.form {
            Form::Exprloc | Form::Block => cur.uleb128()? as usize,
            Form::Block1 => cur.read_u8()? as usize,
            Form::Block2 => cur.read_u16()? as usize,
            Form::Block4 => cur.read_u32()? as usize,
            _ => bail_mismatch!("cannot read {} as exprloc", self.kind),
        };
        let offset = cur.position();
        cur.advance(size)?;
        Ok(Expr {
            unit: self.unit,
            offset,
            len: size,
        })
    }

    pub fn as_string(&self) -> Result<String> {
        let bytes = self.as_cstr()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::Format("invalid UTF-8 in DWARF string".into()))
    }

    /// The string's bytes in place, without the terminator.
    pub fn as_cstr(&self) -> Result<&'dw [u8]> {
        let mut cur = self.cursor();
        match self.form {
            Form::String => cur.cstr(),
            Form::Strp => {
                let off = cur.offset()? as usize;
                let sec = self.dwarf.section(SectionKind::DebugStr);
                Cursor::at(sec, off).cstr()
            }
            Form::LineStrp => {
                let off = cur.offset()? as usize;
                let sec = self.dwarf.section(SectionKind::DebugLineStr);
                Cursor::at(sec, off).cstr()
            }
            Form::Strx | Form::Strx1 | Form::Strx2 | Form::Strx3 | Form::Strx4 => {
                let index = match self.form {
                    Form::Strx => cur.uleb128()?,
                    Form::Strx1 => cur.read_u8()? as u64,
                    Form::Strx2 => cur.read_u16()? as u64,
                    Form::Strx3 => cur.read_u8()? as u64 | (cur.read_u16()? as u64) << 8,
                    Form::Strx4 => cur.read_u32()? as u64,
                    _ => unreachable!(),
                };
                // Index into the offset table of .debug_str_offsets; the
                // entry width is that section's DWARF format.
                let offsets_sec = self.dwarf.section(SectionKind::DebugStrOffsets);
                let base = self.unit.str_offsets_base(self.dwarf)?;
                let word = offsets_sec.format.word_size();
                let pos = (index as usize)
                    .checked_mul(word)
                    .and_then(|off| off.checked_add(base))
                    .ok_or_else(|| {
                        Error::Format(format!("string index {} out of bounds", index))
                    })?;
                let mut off_cur = Cursor::at(offsets_sec, pos);
                let str_off = off_cur.offset()? as usize;
                let sec = self.dwarf.section(SectionKind::DebugStr);
                Cursor::at(sec, str_off).cstr()
            }
            _ => bail_mismatch!("cannot read {} as string", self.kind),
        }
    }

    pub fn as_reference(&self) -> Result<Die<'dw>> {
        let mut cur = self.cursor();
        let off = match self.form {
            Form::Ref1 => cur.read_u8()? as usize,
            Form::Ref2 => cur.read_u16()? as usize,
            Form::Ref4 => cur.read_u32()? as usize,
            Form::Ref8 => cur.read_u64()? as usize,
            Form::RefUdata => cur.uleb128()? as usize,

            Form::RefAddr => {
                // Section-relative: resolve the owning unit first.
                let off = cur.offset()? as usize;
                let unit = self.dwarf.unit_containing_offset(off)?;
                return unit.die_at(self.dwarf, off - unit.offset());
            }

            Form::RefSig8 => {
                let sig = cur.read_u64()?;
                let unit = self.dwarf.type_unit(sig).ok_or_else(|| {
                    Error::Format(format!("unknown type signature {:#018x}", sig))
                })?;
                return unit.type_root(self.dwarf);
            }

            _ => bail_mismatch!("cannot read {} as reference", self.kind),
        };
        self.unit.die_at(self.dwarf, off)
    }

    pub fn as_sec_offset(&self) -> Result<u64> {
        let mut cur = self.cursor();
        // Prior to DWARF 4, section offsets were encoded as data4 or data8.
        match self.form {
            Form::Data4 => Ok(cur.read_u32()? as u64),
            Form::Data8 => cur.read_u64(),
            Form::SecOffset => cur.offset(),
            _ => bail_mismatch!("cannot read {} as sec_offset", self.kind),
        }
    }

    pub fn as_rangelist(&self) -> Result<RangeList> {
        // The unit may lack a base address; the list must then open with a
        // base-address entry, and the initial base is taken as 0.
        let root = self.unit.root(self.dwarf)?;
        let base = if root.contains(DW_AT_LOW_PC) {
            root.attr(DW_AT_LOW_PC)?.as_address()?
        } else {
            0
        };

        if self.form == Form::Rnglistx {
            let mut cur = self.cursor();
            let index = cur.uleb128()?;

            // Walk the .debug_rnglists header to the offsets table.
            let rnglists = self.dwarf.section(SectionKind::DebugRnglists);
            let mut hdr = Cursor::new(rnglists);
            let (_, format) = hdr.initial_length()?;
            let _version = hdr.read_u16()?;
            let _addr_size = hdr.read_u8()?;
            let _segment_selector_size = hdr.read_u8()?;
            let offset_entry_count = hdr.read_u32()? as u64;
            if index >= offset_entry_count {
                bail_format!(
                    "rnglistx index {} out of bounds ({} offset entries)",
                    index,
                    offset_entry_count
                );
            }

            let header_size = hdr.position();
            let word = format.word_size();
            let mut off_cur = Cursor::at(rnglists, header_size + (index as usize) * word);
            let range_offset = match format {
                Format::Dwarf32 => off_cur.read_u32()? as usize,
                Format::Dwarf64 => off_cur.read_u64()? as usize,
            };

            // Offsets are relative to the end of the offsets table.
            let start = (offset_entry_count as usize)
                .checked_mul(word)
                .and_then(|table| table.checked_add(header_size))
                .and_then(|table_base| table_base.checked_add(range_offset))
                .ok_or_else(|| {
                    Error::Format(format!("rnglistx entry offset {:#x} out of bounds", range_offset))
                })?;
            let mut sec = rnglists.clone();
            sec.addr_size = self.unit.addr_size();
            return Ok(RangeList::new(sec, start, base, true));
        }

        let off = self.as_sec_offset()? as usize;
        let mut sec = self.dwarf.section(SectionKind::DebugRanges).clone();
        sec.addr_size = self.unit.addr_size();
        Ok(RangeList::new(sec, off, base, false))
    }
}
