use anyhow::Result;

use rdwarf::{Endian, Error, Format, Range, RangeList, Section, SectionKind};

fn u32le(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn u64le(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn uleb(buf: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v != 0 {
            buf.push(byte | 0x80);
        } else {
            buf.push(byte);
            break;
        }
    }
}

fn ranges_section(bytes: Vec<u8>, addr_size: u8) -> Section {
    Section::new(
        SectionKind::DebugRanges,
        bytes,
        Endian::Little,
        Format::Dwarf32,
        addr_size,
    )
}

fn rnglists_section(bytes: Vec<u8>) -> Section {
    Section::new(
        SectionKind::DebugRnglists,
        bytes,
        Endian::Little,
        Format::Dwarf32,
        8,
    )
}

fn collect(list: &RangeList) -> Result<Vec<Range>> {
    let mut out = Vec::new();
    let mut iter = list.iter();
    while let Some(range) = iter.next_entry()? {
        out.push(range);
    }
    Ok(out)
}

#[test]
fn pre_v5_base_address_selection() -> Result<()> {
    // A base-address selection entry, one range, then the terminator.
    let mut buf = Vec::new();
    u64le(&mut buf, u64::MAX);
    u64le(&mut buf, 0x4000);
    u64le(&mut buf, 0x10);
    u64le(&mut buf, 0x30);
    u64le(&mut buf, 0);
    u64le(&mut buf, 0);

    let list = RangeList::new(ranges_section(buf, 8), 0, 0x1000, false);
    let ranges = collect(&list)?;
    assert_eq!(
        ranges,
        vec![Range {
            low: 0x4010,
            high: 0x4030
        }]
    );
    Ok(())
}

#[test]
fn pre_v5_base_resolution() -> Result<()> {
    let mut buf = Vec::new();
    u64le(&mut buf, 0x10);
    u64le(&mut buf, 0x20);
    u64le(&mut buf, 0x100);
    u64le(&mut buf, 0x180);
    u64le(&mut buf, 0);
    u64le(&mut buf, 0);

    let list = RangeList::new(ranges_section(buf, 8), 0, 0x7000, false);
    let ranges = collect(&list)?;
    assert_eq!(
        ranges,
        vec![
            Range {
                low: 0x7010,
                high: 0x7020
            },
            Range {
                low: 0x7100,
                high: 0x7180
            },
        ]
    );
    for range in &ranges {
        assert!(range.low <= range.high);
    }
    Ok(())
}

#[test]
fn pre_v5_four_byte_addresses() -> Result<()> {
    // The all-ones sentinel scales with the address size.
    let mut buf = Vec::new();
    u32le(&mut buf, u32::MAX);
    u32le(&mut buf, 0x2000);
    u32le(&mut buf, 0x1);
    u32le(&mut buf, 0x2);
    u32le(&mut buf, 0);
    u32le(&mut buf, 0);

    let list = RangeList::new(ranges_section(buf, 4), 0, 0, false);
    assert_eq!(
        collect(&list)?,
        vec![Range {
            low: 0x2001,
            high: 0x2002
        }]
    );
    Ok(())
}

#[test]
fn v5_entries() -> Result<()> {
    let mut buf = Vec::new();
    buf.push(0x05); // base_address
    u64le(&mut buf, 0x5000);
    buf.push(0x04); // offset_pair
    uleb(&mut buf, 0x10);
    uleb(&mut buf, 0x20);
    buf.push(0x07); // start_length
    u64le(&mut buf, 0x6000);
    uleb(&mut buf, 0x40);
    buf.push(0x00); // end_of_list

    let list = RangeList::new(rnglists_section(buf), 0, 0, true);
    assert_eq!(
        collect(&list)?,
        vec![
            Range {
                low: 0x5010,
                high: 0x5020
            },
            Range {
                low: 0x6000,
                high: 0x6040
            },
        ]
    );
    Ok(())
}

#[test]
fn v5_start_end() -> Result<()> {
    let mut buf = Vec::new();
    buf.push(0x06); // start_end
    u64le(&mut buf, 0x9000);
    u64le(&mut buf, 0x9100);
    buf.push(0x00);

    let list = RangeList::new(rnglists_section(buf), 0, 0, true);
    assert_eq!(
        collect(&list)?,
        vec![Range {
            low: 0x9000,
            high: 0x9100
        }]
    );
    Ok(())
}

#[test]
fn v5_indexed_entries_are_skipped() -> Result<()> {
    // base_addressx / startx_endx / startx_length are recognised but their
    // .debug_addr indirection is not resolved; they must not emit ranges or
    // disturb the base address.
    let mut buf = Vec::new();
    buf.push(0x01); // base_addressx
    uleb(&mut buf, 7);
    buf.push(0x02); // startx_endx
    uleb(&mut buf, 1);
    uleb(&mut buf, 2);
    buf.push(0x03); // startx_length
    uleb(&mut buf, 3);
    uleb(&mut buf, 0x40);
    buf.push(0x04); // offset_pair
    uleb(&mut buf, 0x1);
    uleb(&mut buf, 0x2);
    buf.push(0x00);

    let list = RangeList::new(rnglists_section(buf), 0, 0x100, true);
    assert_eq!(
        collect(&list)?,
        vec![Range {
            low: 0x101,
            high: 0x102
        }]
    );
    Ok(())
}

#[test]
fn v5_unknown_entry_kind_is_rejected() {
    let buf = vec![0x09];
    let list = RangeList::new(rnglists_section(buf), 0, 0, true);
    let err = collect(&list).unwrap_err();
    let err = err.downcast::<Error>().unwrap();
    assert!(matches!(err, Error::Format(_)));
}

#[test]
fn synthetic_round_trip() -> Result<()> {
    let pairs = [(0x1000, 0x1010), (0x2000, 0x2080), (0x3000, 0x3000)];
    let list = RangeList::synthetic(&pairs);
    let ranges = collect(&list)?;
    let expected: Vec<Range> = pairs
        .iter()
        .map(|&(low, high)| Range { low, high })
        .collect();
    assert_eq!(ranges, expected);

    // And again: iteration does not consume the list.
    assert_eq!(collect(&list)?, expected);
    Ok(())
}

#[test]
fn synthetic_empty() -> Result<()> {
    let list = RangeList::synthetic(&[]);
    assert!(collect(&list)?.is_empty());
    Ok(())
}

#[test]
fn contains_scans_every_range() -> Result<()> {
    let list = RangeList::synthetic(&[(0x1000, 0x1010), (0x2000, 0x2080)]);
    assert!(list.contains(0x1000)?);
    assert!(list.contains(0x100f)?);
    assert!(!list.contains(0x1010)?);
    assert!(list.contains(0x2040)?);
    assert!(!list.contains(0x3000)?);
    Ok(())
}

#[test]
fn truncated_pre_v5_list_is_an_error() {
    // No terminator: the read runs off the end of the section.
    let mut buf = Vec::new();
    u64le(&mut buf, 0x10);
    u64le(&mut buf, 0x20);

    let list = RangeList::new(ranges_section(buf, 8), 0, 0, false);
    let mut iter = list.iter();
    assert!(iter.next_entry().unwrap().is_some());
    assert!(iter.next_entry().is_err());
}

#[test]
fn big_endian_addresses() -> Result<()> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&0x10u64.to_be_bytes());
    buf.extend_from_slice(&0x20u64.to_be_bytes());
    buf.extend_from_slice(&[0u8; 16]);

    let sec = Section::new(
        SectionKind::DebugRanges,
        buf,
        Endian::Big,
        Format::Dwarf32,
        8,
    );
    let list = RangeList::new(sec, 0, 0x100, false);
    assert_eq!(
        collect(&list)?,
        vec![Range {
            low: 0x110,
            high: 0x120
        }]
    );
    Ok(())
}
