//! A reader for DWARF debugging information, versions 2 through 5: the line
//! number program, range lists, and typed attribute values, plus the DIE and
//! unit plumbing they hang off.

pub mod abbrev;
pub mod constants;
pub mod die;
pub mod dwarf;
pub mod elf;
mod error;
pub mod forms;
pub mod line;
pub mod ranges;
pub mod section;
pub mod value;

pub use die::{Die, DieChildren};
pub use dwarf::{CompileUnit, Dwarf};
pub use elf::Elf;
pub use error::{Error, Result};
pub use forms::Form;
pub use line::{LineFile, LineRow, LineRows, LineTable};
pub use ranges::{Range, RangeIter, RangeList};
pub use section::{Cursor, Endian, Format, Section, SectionKind, SectionProvider};
pub use value::{Expr, Value, ValueKind};
