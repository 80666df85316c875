use std::fmt;

use crate::error::{bail_format, Result};
use crate::section::Cursor;

/// The on-disk encoding of an attribute value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Form {
    Addr,
    Block2,
    Block4,
    Data2,
    Data4,
    Data8,
    String,
    Block,
    Block1,
    Data1,
    Flag,
    Sdata,
    Strp,
    Udata,
    RefAddr,
    Ref1,
    Ref2,
    Ref4,
    Ref8,
    RefUdata,
    Indirect,
    SecOffset,
    Exprloc,
    FlagPresent,
    Strx,
    Addrx,
    Data16,
    LineStrp,
    RefSig8,
    ImplicitConst,
    Loclistx,
    Rnglistx,
    Strx1,
    Strx2,
    Strx3,
    Strx4,
    Addrx1,
    Addrx2,
    Addrx3,
    Addrx4,
}

impl Form {
    pub fn from_code(code: u64) -> Result<Form> {
        Ok(match code {
            0x01 => Form::Addr,
            0x03 => Form::Block2,
            0x04 => Form::Block4,
            0x05 => Form::Data2,
            0x06 => Form::Data4,
            0x07 => Form::Data8,
            0x08 => Form::String,
            0x09 => Form::Block,
            0x0a => Form::Block1,
            0x0b => Form::Data1,
            0x0c => Form::Flag,
            0x0d => Form::Sdata,
            0x0e => Form::Strp,
            0x0f => Form::Udata,
            0x10 => Form::RefAddr,
            0x11 => Form::Ref1,
            0x12 => Form::Ref2,
            0x13 => Form::Ref4,
            0x14 => Form::Ref8,
            0x15 => Form::RefUdata,
            0x16 => Form::Indirect,
            0x17 => Form::SecOffset,
            0x18 => Form::Exprloc,
            0x19 => Form::FlagPresent,
            0x1a => Form::Strx,
            0x1b => Form::Addrx,
            0x1e => Form::Data16,
            0x1f => Form::LineStrp,
            0x20 => Form::RefSig8,
            0x21 => Form::ImplicitConst,
            0x22 => Form::Loclistx,
            0x23 => Form::Rnglistx,
            0x25 => Form::Strx1,
            0x26 => Form::Strx2,
            0x27 => Form::Strx3,
            0x28 => Form::Strx4,
            0x29 => Form::Addrx1,
            0x2a => Form::Addrx2,
            0x2b => Form::Addrx3,
            0x2c => Form::Addrx4,
            _ => bail_format!("unsupported DWARF form {:#x}", code),
        })
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Form::Addr => "addr",
            Form::Block2 => "block2",
            Form::Block4 => "block4",
            Form::Data2 => "data2",
            Form::Data4 => "data4",
            Form::Data8 => "data8",
            Form::String => "string",
            Form::Block => "block",
            Form::Block1 => "block1",
            Form::Data1 => "data1",
            Form::Flag => "flag",
            Form::Sdata => "sdata",
            Form::Strp => "strp",
            Form::Udata => "udata",
            Form::RefAddr => "ref_addr",
            Form::Ref1 => "ref1",
            Form::Ref2 => "ref2",
            Form::Ref4 => "ref4",
            Form::Ref8 => "ref8",
            Form::RefUdata => "ref_udata",
            Form::Indirect => "indirect",
            Form::SecOffset => "sec_offset",
            Form::Exprloc => "exprloc",
            Form::FlagPresent => "flag_present",
            Form::Strx => "strx",
            Form::Addrx => "addrx",
            Form::Data16 => "data16",
            Form::LineStrp => "line_strp",
            Form::RefSig8 => "ref_sig8",
            Form::ImplicitConst => "implicit_const",
            Form::Loclistx => "loclistx",
            Form::Rnglistx => "rnglistx",
            Form::Strx1 => "strx1",
            Form::Strx2 => "strx2",
            Form::Strx3 => "strx3",
            Form::Strx4 => "strx4",
            Form::Addrx1 => "addrx1",
            Form::Addrx2 => "addrx2",
            Form::Addrx3 => "addrx3",
            Form::Addrx4 => "addrx4",
        };
        write!(f, "DW_FORM_{name}")
    }
}

impl<'a> Cursor<'a> {
    /// Advances the cursor past exactly one value of the given form. For
    /// length-prefixed forms the prefix is read first. `indirect` reads the
    /// inner form code and recurses; `implicit_const` consumes nothing.
    pub fn skip_form(&mut self, form: Form) -> Result<()> {
        match form {
            Form::FlagPresent | Form::ImplicitConst => {}
            Form::Data1 | Form::Ref1 | Form::Flag | Form::Strx1 | Form::Addrx1 => {
                self.advance(1)?;
            }
            Form::Data2 | Form::Ref2 | Form::Strx2 | Form::Addrx2 => {
                self.advance(2)?;
            }
            Form::Strx3 | Form::Addrx3 => {
                self.advance(3)?;
            }
            Form::Data4 | Form::Ref4 | Form::Strx4 | Form::Addrx4 => {
                self.advance(4)?;
            }
            Form::Data8 | Form::Ref8 | Form::RefSig8 => {
                self.advance(8)?;
            }
            Form::Data16 => {
                self.advance(16)?;
            }
            Form::Addr => {
                let size = self.section().addr_size as usize;
                self.advance(size)?;
            }
            Form::Strp | Form::LineStrp | Form::SecOffset | Form::RefAddr => {
                let size = self.section().format.word_size();
                self.advance(size)?;
            }
            Form::Sdata => {
                let _ = self.sleb128()?;
            }
            Form::Udata
            | Form::RefUdata
            | Form::Strx
            | Form::Addrx
            | Form::Loclistx
            | Form::Rnglistx => {
                let _ = self.uleb128()?;
            }
            Form::Block1 => {
                let size = self.read_u8()? as usize;
                self.advance(size)?;
            }
            Form::Block2 => {
                let size = self.read_u16()? as usize;
                self.advance(size)?;
            }
            Form::Block4 => {
                let size = self.read_u32()? as usize;
                self.advance(size)?;
            }
            Form::Block | Form::Exprloc => {
                let size = self.uleb128()? as usize;
                self.advance(size)?;
            }
            Form::String => {
                let _ = self.cstr()?;
            }
            Form::Indirect => {
                let inner = Form::from_code(self.uleb128()?)?;
                self.skip_form(inner)?;
            }
        }
        Ok(())
    }
}
