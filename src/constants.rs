//! Numeric codes from the DWARF standard, as used across the reader.

pub type DwarfTag = u64;
pub type DwarfAttr = u64;

// DW_TAG_* (subset)
pub const DW_TAG_COMPILE_UNIT: DwarfTag = 0x11;
pub const DW_TAG_INLINED_SUBROUTINE: DwarfTag = 0x1d;
pub const DW_TAG_BASE_TYPE: DwarfTag = 0x24;
pub const DW_TAG_SUBPROGRAM: DwarfTag = 0x2e;
pub const DW_TAG_TYPE_UNIT: DwarfTag = 0x41;

// DW_AT_* (subset)
pub const DW_AT_LOCATION: DwarfAttr = 0x02;
pub const DW_AT_NAME: DwarfAttr = 0x03;
pub const DW_AT_STMT_LIST: DwarfAttr = 0x10;
pub const DW_AT_LOW_PC: DwarfAttr = 0x11;
pub const DW_AT_HIGH_PC: DwarfAttr = 0x12;
pub const DW_AT_LANGUAGE: DwarfAttr = 0x13;
pub const DW_AT_STRING_LENGTH: DwarfAttr = 0x19;
pub const DW_AT_COMP_DIR: DwarfAttr = 0x1b;
pub const DW_AT_PRODUCER: DwarfAttr = 0x25;
pub const DW_AT_RETURN_ADDR: DwarfAttr = 0x2a;
pub const DW_AT_START_SCOPE: DwarfAttr = 0x2c;
pub const DW_AT_ABSTRACT_ORIGIN: DwarfAttr = 0x31;
pub const DW_AT_EXTERNAL: DwarfAttr = 0x3f;
pub const DW_AT_FRAME_BASE: DwarfAttr = 0x40;
pub const DW_AT_MACRO_INFO: DwarfAttr = 0x43;
pub const DW_AT_SEGMENT: DwarfAttr = 0x46;
pub const DW_AT_SPECIFICATION: DwarfAttr = 0x47;
pub const DW_AT_STATIC_LINK: DwarfAttr = 0x48;
pub const DW_AT_TYPE: DwarfAttr = 0x49;
pub const DW_AT_USE_LOCATION: DwarfAttr = 0x4a;
pub const DW_AT_VTABLE_ELEM_LOCATION: DwarfAttr = 0x4d;
pub const DW_AT_RANGES: DwarfAttr = 0x55;
pub const DW_AT_LINKAGE_NAME: DwarfAttr = 0x6e;
pub const DW_AT_STR_OFFSETS_BASE: DwarfAttr = 0x72;
pub const DW_AT_ADDR_BASE: DwarfAttr = 0x73;
pub const DW_AT_RNGLISTS_BASE: DwarfAttr = 0x74;
pub const DW_AT_MACROS: DwarfAttr = 0x79;

// DW_UT_* unit types (DWARF 5)
pub const DW_UT_COMPILE: u8 = 0x01;
pub const DW_UT_TYPE: u8 = 0x02;
pub const DW_UT_PARTIAL: u8 = 0x03;
pub const DW_UT_SKELETON: u8 = 0x04;
pub const DW_UT_SPLIT_COMPILE: u8 = 0x05;
pub const DW_UT_SPLIT_TYPE: u8 = 0x06;

// Line number standard opcodes
pub const DW_LNS_COPY: u8 = 0x01;
pub const DW_LNS_ADVANCE_PC: u8 = 0x02;
pub const DW_LNS_ADVANCE_LINE: u8 = 0x03;
pub const DW_LNS_SET_FILE: u8 = 0x04;
pub const DW_LNS_SET_COLUMN: u8 = 0x05;
pub const DW_LNS_NEGATE_STMT: u8 = 0x06;
pub const DW_LNS_SET_BASIC_BLOCK: u8 = 0x07;
pub const DW_LNS_CONST_ADD_PC: u8 = 0x08;
pub const DW_LNS_FIXED_ADVANCE_PC: u8 = 0x09;
pub const DW_LNS_SET_PROLOGUE_END: u8 = 0x0a;
pub const DW_LNS_SET_EPILOGUE_BEGIN: u8 = 0x0b;
pub const DW_LNS_SET_ISA: u8 = 0x0c;

// Line number extended opcodes
pub const DW_LNE_END_SEQUENCE: u8 = 0x01;
pub const DW_LNE_SET_ADDRESS: u8 = 0x02;
pub const DW_LNE_DEFINE_FILE: u8 = 0x03;
pub const DW_LNE_SET_DISCRIMINATOR: u8 = 0x04;
pub const DW_LNE_LO_USER: u8 = 0x80;
pub const DW_LNE_HI_USER: u8 = 0xff;

// Line number header entry content codes (DWARF 5)
pub const DW_LNCT_PATH: u64 = 0x01;
pub const DW_LNCT_DIRECTORY_INDEX: u64 = 0x02;
pub const DW_LNCT_TIMESTAMP: u64 = 0x03;
pub const DW_LNCT_SIZE: u64 = 0x04;
pub const DW_LNCT_MD5: u64 = 0x05;

// Range list entry kinds (DWARF 5)
pub const DW_RLE_END_OF_LIST: u8 = 0x00;
pub const DW_RLE_BASE_ADDRESSX: u8 = 0x01;
pub const DW_RLE_STARTX_ENDX: u8 = 0x02;
pub const DW_RLE_STARTX_LENGTH: u8 = 0x03;
pub const DW_RLE_OFFSET_PAIR: u8 = 0x04;
pub const DW_RLE_BASE_ADDRESS: u8 = 0x05;
pub const DW_RLE_START_END: u8 = 0x06;
pub const DW_RLE_START_LENGTH: u8 = 0x07;
