//! Header trial decryption and directory loading.

use std::collections::BTreeSet;
use std::io::Cursor;

use byteorder::{LE, ReadBytesExt};
use indexmap::IndexMap;
use tracing::warn;

use crate::cipher::{self, CipherVariant, Keystream};
use crate::dat::DatEntry;
use crate::error::{DatError, Result};
use crate::spec::{self, RawHeader};
use crate::{compress, path};

/// Outcome of trial-decrypting the raw header bytes: the decoded header plus
/// the keystream advanced past it. The directory continues the same stream.
pub(crate) struct DecodedHeader {
    pub header: RawHeader,
    pub keystream: Keystream,
    pub variant: CipherVariant,
}

/// Version detection by trial decryption: decrypt the 24 raw header bytes
/// with the v2 keys and check the magic; on mismatch retry with the legacy
/// cipher and keys.
pub(crate) fn decode_header(raw: &[u8; RawHeader::SIZE]) -> Result<DecodedHeader> {
    let mut keystream = Keystream::new(CipherVariant::Current, cipher::header_key(cipher::MASTER_KEY));
    let mut buf = *raw;
    keystream.apply(&mut buf);
    let header = RawHeader::parse(&buf);
    if header.magic == cipher::MAGIC {
        return Ok(DecodedHeader {
            header,
            keystream,
            variant: CipherVariant::Current,
        });
    }

    let mut keystream = Keystream::new(CipherVariant::Legacy, cipher::LEGACY_HEADER_KEY);
    let mut buf = *raw;
    keystream.apply(&mut buf);
    let header = RawHeader::parse(&buf);
    if header.magic == cipher::MAGIC {
        return Ok(DecodedHeader {
            header,
            keystream,
            variant: CipherVariant::Legacy,
        });
    }

    Err(DatError::NotAnArchive)
}

/// Decrypt, inflate, and parse the directory block into the entry index and
/// the synthetic directory set.
///
/// A record that fails to parse truncates the directory there: the entries
/// parsed so far are kept and a warning is logged. The archive stays usable
/// with partial contents.
pub(crate) fn read_directory(
    mut encrypted: Vec<u8>,
    keystream: &mut Keystream,
    entry_count: u32,
    has_crc: bool,
) -> Result<(IndexMap<String, DatEntry>, BTreeSet<String>)> {
    keystream.apply(&mut encrypted);
    let meta = compress::zlib_inflate(&encrypted, 0)
        .map_err(|_| DatError::DirectoryCorrupt("directory does not inflate"))?;

    let mut entries = IndexMap::new();
    let mut directories = BTreeSet::new();
    let mut cursor = Cursor::new(meta.as_slice());

    for i in 0..entry_count {
        // Each record is preceded by a u32 size tag; it is consumed but not
        // used for skipping. Records are parsed sequentially.
        if cursor.read_u32::<LE>().is_err() {
            warn!(record = i, "truncated directory, keeping {} of {} entries", entries.len(), entry_count);
            break;
        }
        match spec::read_record(&mut cursor, has_crc) {
            Ok(entry) => {
                for dir in path::parent_directories(&entry.path) {
                    if !directories.contains(dir) {
                        directories.insert(dir.to_string());
                    }
                }
                entries.insert(entry.path.clone(), entry);
            }
            Err(err) => {
                warn!(record = i, %err, "failed to parse directory record, keeping {} of {} entries", entries.len(), entry_count);
                break;
            }
        }
    }

    if entry_count > 0 && entries.is_empty() {
        return Err(DatError::DirectoryCorrupt("no directory records could be parsed"));
    }
    Ok((entries, directories))
}
