use crate::abbrev::Abbrev;
use crate::constants::{DW_AT_HIGH_PC, DW_AT_LOW_PC, DW_AT_RANGES};
use crate::dwarf::{CompileUnit, Dwarf};
use crate::error::{bail_format, Error, Result};
use crate::forms::Form;
use crate::section::Cursor;
use crate::value::Value;

/// A debugging information entry: one node of a unit's DIE tree, with its
/// attribute payload locations recorded for typed access.
#[derive(Clone, Debug)]
pub struct Die<'dw> {
    dwarf: &'dw Dwarf,
    unit: &'dw CompileUnit,
    position: usize,
    next_offset: usize,
    abbrev: Option<&'dw Abbrev>,
    attr_locs: Vec<usize>,
}

pub(crate) fn parse_die_at<'dw>(
    dwarf: &'dw Dwarf,
    unit: &'dw CompileUnit,
    offset: usize,
) -> Result<Die<'dw>> {
    if offset >= unit.data().len() {
        bail_format!(
            "DIE offset {:#x} outside unit at {:#x}",
            offset,
            unit.offset()
        );
    }

    let mut cur = Cursor::at(unit.data(), offset);
    let abbrev_code = cur.uleb128()?;

    if abbrev_code == 0 {
        // Null entry: marks the end of a sibling chain.
        return Ok(Die {
            dwarf,
            unit,
            position: offset,
            next_offset: cur.position(),
            abbrev: None,
            attr_locs: Vec::new(),
        });
    }

    let abbrev = unit.abbrev(abbrev_code).ok_or_else(|| {
        Error::Format(format!(
            "missing abbreviation code {} in unit at {:#x}",
            abbrev_code,
            unit.offset()
        ))
    })?;

    let mut attr_locs = Vec::with_capacity(abbrev.attr_specs.len());
    for spec in abbrev.attr_specs.iter() {
        attr_locs.push(cur.position());
        cur.skip_form(spec.form)?;
    }

    Ok(Die {
        dwarf,
        unit,
        position: offset,
        next_offset: cur.position(),
        abbrev: Some(abbrev),
        attr_locs,
    })
}

impl<'dw> Die<'dw> {
    pub fn unit(&self) -> &'dw CompileUnit {
        self.unit
    }

    /// Unit-relative offset of this entry.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Unit-relative offset of the entry following this one.
    pub fn next_offset(&self) -> usize {
        self.next_offset
    }

    /// Section-relative offset of this entry.
    pub fn section_offset(&self) -> usize {
        self.unit.offset() + self.position
    }

    pub fn is_null(&self) -> bool {
        self.abbrev.is_none()
    }

    pub fn tag(&self) -> Option<u64> {
        self.abbrev.map(|a| a.tag)
    }

    pub fn has_children(&self) -> bool {
        self.abbrev.map_or(false, |a| a.has_children)
    }

    pub fn contains(&self, attr: u64) -> bool {
        self.attr_index(attr).is_some()
    }

    /// The value of the named attribute. `indirect` forms are resolved
    /// during construction of the returned value.
    pub fn attr(&self, attr: u64) -> Result<Value<'dw>> {
        let abbrev = self
            .abbrev
            .ok_or_else(|| Error::Format("attribute lookup on null DIE".into()))?;
        let idx = self.attr_index(attr).ok_or_else(|| {
            Error::Format(format!(
                "attribute {:#x} not present in DIE at {:#x}",
                attr,
                self.section_offset()
            ))
        })?;
        Value::new(
            self.dwarf,
            self.unit,
            &abbrev.attr_specs[idx],
            self.attr_locs[idx],
        )
    }

    fn attr_index(&self, attr: u64) -> Option<usize> {
        self.abbrev
            .and_then(|a| a.attr_specs.iter().position(|spec| spec.attr == attr))
    }

    /// Iterates this entry's immediate children, skipping their descendants.
    pub fn children(&self) -> DieChildren<'dw> {
        DieChildren {
            dwarf: self.dwarf,
            unit: self.unit,
            next_offset: self.next_offset,
            finished: !self.has_children(),
        }
    }

    /// Unit-relative offset of the next sibling, past all descendants.
    pub fn next_sibling(&self) -> Result<usize> {
        if !self.has_children() {
            return Ok(self.next_offset);
        }

        // Walk forward tracking nesting depth until the null entry that
        // closes this DIE's children.
        let mut offset = self.next_offset;
        let mut depth = 1usize;
        loop {
            let die = parse_die_at(self.dwarf, self.unit, offset)?;
            offset = die.next_offset;
            if die.is_null() {
                depth -= 1;
                if depth == 0 {
                    return Ok(offset);
                }
            } else if die.has_children() {
                depth += 1;
            }
        }
    }

    pub fn low_pc(&self) -> Result<u64> {
        if self.contains(DW_AT_RANGES) {
            let ranges = self.attr(DW_AT_RANGES)?.as_rangelist()?;
            let mut iter = ranges.iter();
            match iter.next_entry()? {
                Some(range) => Ok(range.low),
                None => bail_format!("empty range list for DIE at {:#x}", self.section_offset()),
            }
        } else if self.contains(DW_AT_LOW_PC) {
            self.attr(DW_AT_LOW_PC)?.as_address()
        } else {
            bail_format!("DIE at {:#x} does not provide low_pc", self.section_offset())
        }
    }

    pub fn high_pc(&self) -> Result<u64> {
        if self.contains(DW_AT_RANGES) {
            let ranges = self.attr(DW_AT_RANGES)?.as_rangelist()?;
            let mut last = None;
            let mut iter = ranges.iter();
            while let Some(range) = iter.next_entry()? {
                last = Some(range.high);
            }
            last.ok_or_else(|| {
                Error::Format(format!(
                    "empty range list for DIE at {:#x}",
                    self.section_offset()
                ))
            })
        } else if self.contains(DW_AT_HIGH_PC) {
            let attr = self.attr(DW_AT_HIGH_PC)?;
            if attr.form() == Form::Addr {
                attr.as_address()
            } else {
                // An offset from low_pc rather than an absolute address.
                Ok(self.low_pc()?.wrapping_add(attr.as_uconstant()?))
            }
        } else {
            bail_format!(
                "DIE at {:#x} does not provide high_pc",
                self.section_offset()
            )
        }
    }

    pub fn contains_address(&self, address: u64) -> Result<bool> {
        if self.contains(DW_AT_RANGES) {
            self.attr(DW_AT_RANGES)?.as_rangelist()?.contains(address)
        } else if self.contains(DW_AT_LOW_PC) && self.contains(DW_AT_HIGH_PC) {
            Ok(self.low_pc()? <= address && address < self.high_pc()?)
        } else {
            Ok(false)
        }
    }
}

pub struct DieChildren<'dw> {
    dwarf: &'dw Dwarf,
    unit: &'dw CompileUnit,
    next_offset: usize,
    finished: bool,
}

impl<'dw> Iterator for DieChildren<'dw> {
    type Item = Result<Die<'dw>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let die = match parse_die_at(self.dwarf, self.unit, self.next_offset) {
            Ok(die) => die,
            Err(err) => {
                self.finished = true;
                return Some(Err(err));
            }
        };
        if die.is_null() {
            self.finished = true;
            return None;
        }
        match die.next_sibling() {
            Ok(next) => self.next_offset = next,
            Err(err) => {
                self.finished = true;
                return Some(Err(err));
            }
        }
        Some(Ok(die))
    }
}
