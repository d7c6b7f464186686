use std::io::Cursor;

use byteorder::{LE, ReadBytesExt, WriteBytesExt};

/// Archive header: 24 bytes, packed, little-endian. Stored encrypted with the
/// header keystream.
#[derive(Debug, Clone, Default)]
pub struct RawHeader {
    /// First 8 bytes of the format identifier.
    pub magic: [u8; 8],
    /// 1 (legacy) or 2 (current).
    pub version: u32,
    pub entry_count: u32,
    /// Byte offset of the compressed, encrypted directory.
    pub header_offset: u32,
    /// Byte length of same.
    pub header_size: u32,
}

impl RawHeader {
    pub const SIZE: usize = 24;

    /// Byte offset of the `header_offset` field; the writer patches
    /// `header_offset` and `header_size` in place here.
    pub const OFFSET_FIELD_POS: u64 = 16;

    pub fn parse(buf: &[u8; Self::SIZE]) -> Self {
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&buf[..8]);

        let mut cursor = Cursor::new(&buf[8..]);
        // Reads from a fixed-size buffer cannot fail.
        RawHeader {
            magic,
            version: cursor.read_u32::<LE>().unwrap(),
            entry_count: cursor.read_u32::<LE>().unwrap(),
            header_offset: cursor.read_u32::<LE>().unwrap(),
            header_size: cursor.read_u32::<LE>().unwrap(),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.magic);
        buf.write_u32::<LE>(self.version).unwrap();
        buf.write_u32::<LE>(self.entry_count).unwrap();
        buf.write_u32::<LE>(self.header_offset).unwrap();
        buf.write_u32::<LE>(self.header_size).unwrap();
        buf.try_into().unwrap()
    }
}
