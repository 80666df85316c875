use crate::constants::{
    DW_RLE_BASE_ADDRESS, DW_RLE_BASE_ADDRESSX, DW_RLE_END_OF_LIST, DW_RLE_OFFSET_PAIR,
    DW_RLE_START_END, DW_RLE_STARTX_ENDX, DW_RLE_STARTX_LENGTH, DW_RLE_START_LENGTH,
};
use crate::error::{bail_format, Result};
use crate::section::{Cursor, Endian, Format, Section, SectionKind};

/// A half-open `[low, high)` address range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Range {
    pub low: u64,
    pub high: u64,
}

impl Range {
    pub fn contains(&self, addr: u64) -> bool {
        self.low <= addr && addr < self.high
    }
}

/// A lazy list of address ranges, decoded from either the pre-v5
/// `.debug_ranges` encoding or the DWARF 5 `.debug_rnglists` encoding.
#[derive(Debug)]
pub struct RangeList {
    sec: Section,
    offset: usize,
    base: u64,
    is_v5: bool,
}

impl RangeList {
    /// A list starting at `offset` in `sec`, with the owning unit's low PC
    /// as the initial base address. `sec` must carry the unit's address
    /// size.
    pub fn new(sec: Section, offset: usize, base_addr: u64, is_v5: bool) -> RangeList {
        RangeList {
            sec,
            offset,
            base: base_addr,
            is_v5,
        }
    }

    /// A list over the given pairs, materialised as a private buffer in the
    /// pre-v5 layout so the same iterator serves both paths.
    pub fn synthetic(pairs: &[(u64, u64)]) -> RangeList {
        let mut buf = Vec::with_capacity((pairs.len() + 1) * 16);
        for &(low, high) in pairs {
            buf.extend_from_slice(&low.to_le_bytes());
            buf.extend_from_slice(&high.to_le_bytes());
        }
        buf.extend_from_slice(&[0u8; 16]);

        let sec = Section::new(
            SectionKind::DebugRanges,
            buf,
            Endian::Little,
            Format::Dwarf32,
            8,
        );
        RangeList {
            sec,
            offset: 0,
            base: 0,
            is_v5: false,
        }
    }

    pub fn iter(&self) -> RangeIter<'_> {
        RangeIter {
            sec: &self.sec,
            pos: self.offset,
            base: self.base,
            is_v5: self.is_v5,
            done: false,
        }
    }

    /// Linear scan for an address.
    pub fn contains(&self, addr: u64) -> Result<bool> {
        let mut iter = self.iter();
        while let Some(range) = iter.next_entry()? {
            if range.contains(addr) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

pub struct RangeIter<'a> {
    sec: &'a Section,
    pos: usize,
    base: u64,
    is_v5: bool,
    done: bool,
}

impl<'a> RangeIter<'a> {
    pub fn next_entry(&mut self) -> Result<Option<Range>> {
        if self.done {
            return Ok(None);
        }
        let result = if self.is_v5 {
            self.next_v5()
        } else {
            self.next_pre_v5()
        };
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    fn next_pre_v5(&mut self) -> Result<Option<Range>> {
        let mut cur = Cursor::at(self.sec, self.pos);

        // A first value of all ones at the list's address size selects a new
        // base address instead of describing a range.
        let largest = match self.sec.addr_size {
            8 => u64::MAX,
            size => (1u64 << (8 * size as u32)) - 1,
        };

        loop {
            let low = cur.address()?;
            let high = cur.address()?;
            if low == 0 && high == 0 {
                return Ok(None);
            }
            if low == largest {
                self.base = high;
                continue;
            }
            self.pos = cur.position();
            return Ok(Some(Range {
                low: self.base.wrapping_add(low),
                high: self.base.wrapping_add(high),
            }));
        }
    }

    fn next_v5(&mut self) -> Result<Option<Range>> {
        let mut cur = Cursor::at(self.sec, self.pos);
        loop {
            if cur.at_end() {
                return Ok(None);
            }
            let entry = match cur.read_u8()? {
                DW_RLE_END_OF_LIST => return Ok(None),

                DW_RLE_BASE_ADDRESS => {
                    self.base = cur.address()?;
                    continue;
                }

                DW_RLE_OFFSET_PAIR => {
                    let low = self.base.wrapping_add(cur.uleb128()?);
                    let high = self.base.wrapping_add(cur.uleb128()?);
                    Range { low, high }
                }

                DW_RLE_START_END => {
                    let low = cur.address()?;
                    let high = cur.address()?;
                    Range { low, high }
                }

                DW_RLE_START_LENGTH => {
                    let low = cur.address()?;
                    let high = low.wrapping_add(cur.uleb128()?);
                    Range { low, high }
                }

                // Endpoints behind .debug_addr indices are recognised but
                // not resolved: the operands are consumed and the entry is
                // skipped, so the result omits these ranges.
                DW_RLE_BASE_ADDRESSX => {
                    let _ = cur.uleb128()?;
                    continue;
                }
                DW_RLE_STARTX_ENDX | DW_RLE_STARTX_LENGTH => {
                    let _ = cur.uleb128()?;
                    let _ = cur.uleb128()?;
                    continue;
                }

                other => bail_format!(
                    "unknown range list entry kind {:#x} at offset {:#x}",
                    other,
                    self.pos
                ),
            };
            self.pos = cur.position();
            return Ok(Some(entry));
        }
    }
}

impl<'a> Iterator for RangeIter<'a> {
    type Item = Result<Range>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}
