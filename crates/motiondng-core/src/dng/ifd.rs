//! Low-level single-IFD TIFF assembly.
//!
//! Layout: 8-byte little-endian header, the IFD at offset 8 with entries
//! in ascending tag order, out-of-line values after the IFD, then the
//! image strip. Values of four bytes or fewer are stored inline,
//! left-justified.

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian};

use crate::dng::tags::{self, type_size};

#[derive(Debug, Clone)]
struct IfdEntry {
    field_type: u16,
    count: u32,
    data: Vec<u8>,
}

/// Collects tag values and serializes the finished TIFF byte stream.
#[derive(Debug, Default)]
pub struct IfdBuilder {
    // BTreeMap keeps entries in the ascending tag order TIFF requires
    entries: BTreeMap<u16, IfdEntry>,
}

impl IfdBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&mut self, tag: u16, field_type: u16, count: u32, data: Vec<u8>) {
        debug_assert_eq!(data.len(), count as usize * type_size(field_type));
        self.entries.insert(tag, IfdEntry { field_type, count, data });
    }

    pub fn put_byte(&mut self, tag: u16, values: &[u8]) {
        self.put(tag, tags::TYPE_BYTE, values.len() as u32, values.to_vec());
    }

    pub fn put_undefined(&mut self, tag: u16, values: &[u8]) {
        self.put(tag, tags::TYPE_UNDEFINED, values.len() as u32, values.to_vec());
    }

    pub fn put_ascii(&mut self, tag: u16, value: &str) {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        self.put(tag, tags::TYPE_ASCII, data.len() as u32, data);
    }

    pub fn put_short(&mut self, tag: u16, values: &[u16]) {
        let mut data = vec![0u8; values.len() * 2];
        LittleEndian::write_u16_into(values, &mut data);
        self.put(tag, tags::TYPE_SHORT, values.len() as u32, data);
    }

    pub fn put_long(&mut self, tag: u16, values: &[u32]) {
        let mut data = vec![0u8; values.len() * 4];
        LittleEndian::write_u32_into(values, &mut data);
        self.put(tag, tags::TYPE_LONG, values.len() as u32, data);
    }

    pub fn put_rational(&mut self, tag: u16, values: &[(u32, u32)]) {
        let mut data = Vec::with_capacity(values.len() * 8);
        for &(num, den) in values {
            data.extend_from_slice(&num.to_le_bytes());
            data.extend_from_slice(&den.to_le_bytes());
        }
        self.put(tag, tags::TYPE_RATIONAL, values.len() as u32, data);
    }

    pub fn put_srational(&mut self, tag: u16, values: &[(i32, i32)]) {
        let mut data = Vec::with_capacity(values.len() * 8);
        for &(num, den) in values {
            data.extend_from_slice(&num.to_le_bytes());
            data.extend_from_slice(&den.to_le_bytes());
        }
        self.put(tag, tags::TYPE_SRATIONAL, values.len() as u32, data);
    }

    /// Serialize the TIFF with `strip` as the single image strip. The
    /// StripOffsets/StripByteCounts entries are filled in here.
    pub fn build(mut self, strip: &[u8]) -> Vec<u8> {
        self.put_long(tags::TAG_STRIP_BYTE_COUNTS, &[strip.len() as u32]);
        // Placeholder so the entry participates in layout
        self.put_long(tags::TAG_STRIP_OFFSETS, &[0]);

        let entry_count = self.entries.len();
        let ifd_offset = 8usize;
        let ifd_len = 2 + entry_count * 12 + 4;

        // Out-of-line data area sits right after the IFD, word-aligned per
        // value as TIFF requires.
        let mut data_area: Vec<u8> = Vec::new();
        let data_base = ifd_offset + ifd_len;
        let mut offsets: BTreeMap<u16, u32> = BTreeMap::new();

        for (&tag, entry) in &self.entries {
            if entry.data.len() > 4 {
                if data_area.len() % 2 != 0 {
                    data_area.push(0);
                }
                offsets.insert(tag, (data_base + data_area.len()) as u32);
                data_area.extend_from_slice(&entry.data);
            }
        }

        let mut strip_offset = data_base + data_area.len();
        if strip_offset % 2 != 0 {
            data_area.push(0);
            strip_offset += 1;
        }

        {
            let entry = self.entries.get_mut(&tags::TAG_STRIP_OFFSETS).unwrap();
            entry.data = (strip_offset as u32).to_le_bytes().to_vec();
        }

        let mut out = Vec::with_capacity(strip_offset + strip.len());
        out.extend_from_slice(b"II");
        out.extend_from_slice(&42u16.to_le_bytes());
        out.extend_from_slice(&(ifd_offset as u32).to_le_bytes());

        out.extend_from_slice(&(entry_count as u16).to_le_bytes());
        for (&tag, entry) in &self.entries {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&entry.field_type.to_le_bytes());
            out.extend_from_slice(&entry.count.to_le_bytes());

            if let Some(&offset) = offsets.get(&tag) {
                out.extend_from_slice(&offset.to_le_bytes());
            } else {
                let mut value = [0u8; 4];
                value[..entry.data.len()].copy_from_slice(&entry.data);
                out.extend_from_slice(&value);
            }
        }
        // No second IFD
        out.extend_from_slice(&0u32.to_le_bytes());

        out.extend_from_slice(&data_area);
        debug_assert_eq!(out.len(), strip_offset);
        out.extend_from_slice(strip);

        out
    }
}
