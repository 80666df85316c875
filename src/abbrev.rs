use std::collections::HashMap;

use crate::error::{bail_format, Result};
use crate::forms::Form;
use crate::section::{Cursor, Section};

/// One attribute specification within an abbreviation declaration.
#[derive(Clone, Debug)]
pub struct AttrSpec {
    pub attr: u64,
    pub form: Form,
    /// Only for `DW_FORM_implicit_const`: the constant stored in the
    /// abbreviation itself rather than in the DIE payload.
    pub implicit_const: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct Abbrev {
    pub code: u64,
    pub tag: u64,
    pub has_children: bool,
    pub attr_specs: Vec<AttrSpec>,
}

pub(crate) fn parse_abbrev_table(sec: &Section, offset: usize) -> Result<HashMap<u64, Abbrev>> {
    if offset >= sec.len() {
        bail_format!(
            "abbrev table offset {:#x} outside {}",
            offset,
            sec.kind().name()
        );
    }

    let mut table = HashMap::new();
    let mut cur = Cursor::at(sec, offset);
    loop {
        let code = cur.uleb128()?;
        if code == 0 {
            break;
        }
        let tag = cur.uleb128()?;
        let has_children = cur.read_u8()? != 0;
        let mut attr_specs = Vec::new();
        loop {
            let attr = cur.uleb128()?;
            let form_code = cur.uleb128()?;
            if attr == 0 && form_code == 0 {
                break;
            }
            let form = Form::from_code(form_code)?;
            let implicit_const = if form == Form::ImplicitConst {
                Some(cur.sleb128()?)
            } else {
                None
            };
            attr_specs.push(AttrSpec {
                attr,
                form,
                implicit_const,
            });
        }
        table.insert(
            code,
            Abbrev {
                code,
                tag,
                has_children,
                attr_specs,
            },
        );
    }
    Ok(table)
}
