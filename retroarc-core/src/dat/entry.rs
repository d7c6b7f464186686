use serde::Serialize;

use crate::error::DatError;

/// Compression applied to an entry's stored bytes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum CompressionType {
    #[default]
    None = 0,
    Zlib = 1,
}

impl TryFrom<u8> for CompressionType {
    type Error = DatError;

    fn try_from(value: u8) -> Result<Self, DatError> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Zlib),
            _ => Err(DatError::DirectoryCorrupt("unknown compression type")),
        }
    }
}

/// One file stored in the archive, as described by its directory record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatEntry {
    /// UTF-8 relative path, forward-slash normalized. Unique within the
    /// archive.
    pub path: String,
    pub compression_type: CompressionType,
    /// Uncompressed size in bytes.
    pub size_full: u32,
    /// On-disk size. Equal to `size_full` for uncompressed entries; the
    /// cipher preserves length.
    pub size_stored: u32,
    /// Byte offset of the entry body, relative to the archive's read offset.
    pub offset_pos: u32,
    /// Per-file cipher seed.
    pub key_base: u8,
    pub key_step: u8,
    /// CRC-32 of the uncompressed content; 0 means unknown.
    pub crc32: u32,
}
