use std::io::Cursor;

use byteorder::{LE, ReadBytesExt};

use crate::dat::{CompressionType, DatEntry};
use crate::error::{DatError, Result};
use crate::path;

/// Size in bytes of the serialized record for `entry`, excluding the leading
/// `u32` size tag.
pub fn record_size(entry: &DatEntry) -> usize {
    let char_count = entry.path.encode_utf16().count();
    4 + char_count * 2   // pathCharCount + UTF-16 code units
        + 1              // compressionType
        + 4 * 3          // sizeFull, sizeStored, offsetPos
        + 2              // keyBase, keyStep
        + 4              // crc32
}

/// Append the on-disk record for one entry to `buf` (v2 layout, CRC
/// included). The caller prepends the `u32` size tag.
pub fn write_record(buf: &mut Vec<u8>, entry: &DatEntry) {
    let units: Vec<u16> = entry.path.encode_utf16().collect();
    buf.extend_from_slice(&(units.len() as u32).to_le_bytes());
    for unit in &units {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
    buf.push(entry.compression_type as u8);
    buf.extend_from_slice(&entry.size_full.to_le_bytes());
    buf.extend_from_slice(&entry.size_stored.to_le_bytes());
    buf.extend_from_slice(&entry.offset_pos.to_le_bytes());
    buf.push(entry.key_base);
    buf.push(entry.key_step);
    buf.extend_from_slice(&entry.crc32.to_le_bytes());
}

/// Parse one record, advancing `cursor` past it. `has_crc` selects whether
/// the trailing CRC field is consumed (true for v2, false for v1). Path
/// separators are normalized to `/` after parsing.
pub fn read_record(cursor: &mut Cursor<&[u8]>, has_crc: bool) -> Result<DatEntry> {
    let char_count = cursor.read_u32::<LE>()? as usize;
    let remaining = cursor.get_ref().len().saturating_sub(cursor.position() as usize);
    if char_count.saturating_mul(2) > remaining {
        return Err(DatError::DirectoryCorrupt("entry path overruns the directory"));
    }

    let mut units = vec![0u16; char_count];
    cursor.read_u16_into::<LE>(&mut units)?;
    let raw_path = String::from_utf16(&units).map_err(|_| DatError::InvalidUtf16)?;

    let mut entry = DatEntry {
        path: path::normalize_slashes(&raw_path),
        compression_type: CompressionType::try_from(cursor.read_u8()?)?,
        size_full: cursor.read_u32::<LE>()?,
        size_stored: cursor.read_u32::<LE>()?,
        offset_pos: cursor.read_u32::<LE>()?,
        key_base: cursor.read_u8()?,
        key_step: cursor.read_u8()?,
        crc32: 0,
    };
    if has_crc {
        entry.crc32 = cursor.read_u32::<LE>()?;
    }
    Ok(entry)
}
