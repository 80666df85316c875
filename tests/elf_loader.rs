use std::fs;
use std::path::PathBuf;

use anyhow::Result;

use rdwarf::{Elf, RangeList, SectionKind, SectionProvider};

fn u16le(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn u32le(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn u64le(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

struct Shdr {
    name: u32,
    offset: u64,
    size: u64,
}

fn push_shdr(buf: &mut Vec<u8>, shdr: &Shdr) {
    u32le(buf, shdr.name);
    u32le(buf, if shdr.size == 0 { 0 } else { 1 }); // sh_type: SHT_PROGBITS
    u64le(buf, 0); // sh_flags
    u64le(buf, 0); // sh_addr
    u64le(buf, shdr.offset);
    u64le(buf, shdr.size);
    u32le(buf, 0); // sh_link
    u32le(buf, 0); // sh_info
    u64le(buf, 1); // sh_addralign
    u64le(buf, 0); // sh_entsize
}

// A minimal 64-bit little-endian ELF: null section, .shstrtab, and one
// .debug_ranges section.
fn build_elf(ranges: &[u8]) -> Vec<u8> {
    let mut shstrtab = vec![0u8];
    let shstrtab_name = shstrtab.len() as u32;
    shstrtab.extend_from_slice(b".shstrtab\0");
    let ranges_name = shstrtab.len() as u32;
    shstrtab.extend_from_slice(b".debug_ranges\0");

    let shstrtab_off = 64u64;
    let ranges_off = shstrtab_off + shstrtab.len() as u64;
    let shoff = ranges_off + ranges.len() as u64;

    let mut out = Vec::new();
    out.extend_from_slice(b"\x7fELF");
    out.push(2); // ELFCLASS64
    out.push(1); // ELFDATA2LSB
    out.push(1); // EV_CURRENT
    out.extend_from_slice(&[0u8; 9]);
    u16le(&mut out, 1); // e_type: ET_REL
    u16le(&mut out, 0x3e); // e_machine: x86-64
    u32le(&mut out, 1); // e_version
    u64le(&mut out, 0); // e_entry
    u64le(&mut out, 0); // e_phoff
    u64le(&mut out, shoff);
    u32le(&mut out, 0); // e_flags
    u16le(&mut out, 64); // e_ehsize
    u16le(&mut out, 0); // e_phentsize
    u16le(&mut out, 0); // e_phnum
    u16le(&mut out, 64); // e_shentsize
    u16le(&mut out, 3); // e_shnum
    u16le(&mut out, 1); // e_shstrndx

    assert_eq!(out.len(), 64);
    out.extend_from_slice(&shstrtab);
    out.extend_from_slice(ranges);

    push_shdr(
        &mut out,
        &Shdr {
            name: 0,
            offset: 0,
            size: 0,
        },
    );
    push_shdr(
        &mut out,
        &Shdr {
            name: shstrtab_name,
            offset: shstrtab_off,
            size: shstrtab.len() as u64,
        },
    );
    push_shdr(
        &mut out,
        &Shdr {
            name: ranges_name,
            offset: ranges_off,
            size: ranges.len() as u64,
        },
    );
    out
}

fn scratch_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("rdwarf-test-{}-{}", std::process::id(), name));
    path
}

#[test]
fn loads_debug_sections_from_an_elf() -> Result<()> {
    let mut ranges = Vec::new();
    u64le(&mut ranges, 0x10);
    u64le(&mut ranges, 0x20);
    u64le(&mut ranges, 0);
    u64le(&mut ranges, 0);

    let path = scratch_path("ranges.o");
    fs::write(&path, build_elf(&ranges))?;
    let elf = Elf::new(&path)?;

    let sec = elf
        .section(SectionKind::DebugRanges)
        .expect(".debug_ranges should be present");
    assert_eq!(sec.len(), ranges.len());
    assert!(elf.section(SectionKind::DebugLine).is_none());

    let list = RangeList::new(sec, 0, 0x1000, false);
    let mut iter = list.iter();
    let range = iter.next_entry()?.expect("one range");
    assert_eq!((range.low, range.high), (0x1010, 0x1020));
    assert_eq!(iter.next_entry()?, None);

    fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn rejects_non_elf_input() -> Result<()> {
    let path = scratch_path("not-an-elf");
    fs::write(&path, b"plain text")?;
    assert!(Elf::new(&path).is_err());
    fs::remove_file(&path)?;
    Ok(())
}
