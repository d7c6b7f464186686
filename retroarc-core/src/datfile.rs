//! Read side of the archive: open, path queries, whole-entry reads, and
//! directory enumeration.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::cipher::{self, CipherVariant, Keystream};
use crate::dat::{CompressionType, DatEntry};
use crate::error::{DatError, Result};
use crate::read;
use crate::spec::RawHeader;
use crate::{compress, path};

/// Kind of node a path resolves to inside an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    File,
    Directory,
    Unknown,
}

/// An opened LSTGRETROARC archive.
///
/// `open` either fully populates the directory index or fails; the index is
/// never mutated afterwards, so queries borrow it freely. Only the file
/// handle sits behind a lock, taken for the duration of each entry read.
/// Enumerators borrow the reader, which keeps it alive for their lifetime.
pub struct DatFile {
    path: PathBuf,
    read_offset: u64,
    version: u32,
    variant: CipherVariant,
    file: Mutex<File>,
    entries: IndexMap<String, DatEntry>,
    directories: BTreeSet<String>,
}

impl DatFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_at(path, 0)
    }

    /// Open an archive embedded `read_offset` bytes into the file. All
    /// archive offsets are interpreted relative to this base, which lets the
    /// archive live inside a larger container (e.g. an executable stub).
    pub fn open_at(path: impl AsRef<Path>, read_offset: u64) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;

        file.seek(SeekFrom::Start(read_offset))?;
        let mut raw = [0u8; RawHeader::SIZE];
        file.read_exact(&mut raw)?;

        let read::DecodedHeader {
            header,
            mut keystream,
            variant,
        } = read::decode_header(&raw)?;

        if header.version != cipher::VERSION_CURRENT && header.version != cipher::VERSION_LEGACY {
            return Err(DatError::UnsupportedVersion(header.version));
        }

        file.seek(SeekFrom::Start(read_offset + header.header_offset as u64))?;
        let mut encrypted = vec![0u8; header.header_size as usize];
        file.read_exact(&mut encrypted)?;

        let has_crc = header.version != cipher::VERSION_LEGACY;
        let (entries, directories) =
            read::read_directory(encrypted, &mut keystream, header.entry_count, has_crc)?;

        debug!(
            path = %path.display(),
            version = header.version,
            entries = entries.len(),
            "opened archive"
        );

        Ok(Self {
            path: path.to_path_buf(),
            read_offset,
            version: header.version,
            variant,
            file: Mutex::new(file),
            entries,
            directories,
        })
    }

    /// Path the archive was opened from.
    pub fn archive_path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Entries in directory order.
    pub fn entries(&self) -> impl Iterator<Item = &DatEntry> {
        self.entries.values()
    }

    pub fn entry(&self, name: &str) -> Option<&DatEntry> {
        self.entries.get(path::normalize_slashes(name).as_str())
    }

    pub fn has_node(&self, name: &str) -> bool {
        let name = path::normalize_slashes(name);
        self.entries.contains_key(name.as_str()) || self.directories.contains(path::as_directory(&name).as_str())
    }

    pub fn node_type(&self, name: &str) -> NodeType {
        let name = path::normalize_slashes(name);
        if self.entries.contains_key(name.as_str()) {
            NodeType::File
        } else if self.directories.contains(path::as_directory(&name).as_str()) {
            NodeType::Directory
        } else {
            NodeType::Unknown
        }
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn file_size(&self, name: &str) -> Option<u32> {
        self.entry(name).map(|e| e.size_full)
    }

    /// Directory membership is checked with a trailing `/`; the root (empty
    /// path) always exists.
    pub fn has_directory(&self, name: &str) -> bool {
        let name = path::normalize_slashes(name);
        if name.is_empty() {
            return true;
        }
        self.directories.contains(path::as_directory(&name).as_str())
    }

    /// Read one entry whole: seek, decrypt with the per-file key, inflate if
    /// compressed, verify CRC.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .entry(name)
            .ok_or_else(|| DatError::EntryNotFound(name.to_string()))?;
        self.read_entry_data(entry)
    }

    /// Archives use only the embedded key; always reports failure.
    pub fn set_password(&self, _password: &str) -> bool {
        false
    }

    /// Snapshot enumerator over the files and synthetic directories beneath
    /// `directory` (empty string means root).
    pub fn enumerate(&self, directory: &str, recursive: bool) -> Enumerate<'_> {
        let dir = path::as_directory(directory);

        let mut items = Vec::new();
        for (p, entry) in &self.entries {
            if path::is_path_matched(p, &dir, recursive) {
                items.push(Item {
                    name: p.clone(),
                    node_type: NodeType::File,
                    size_full: entry.size_full,
                });
            }
        }
        for d in &self.directories {
            if path::is_path_matched(d, &dir, recursive) {
                items.push(Item {
                    name: d.clone(),
                    node_type: NodeType::Directory,
                    size_full: 0,
                });
            }
        }

        Enumerate {
            archive: self,
            items: items.into_iter(),
        }
    }

    fn read_entry_data(&self, entry: &DatEntry) -> Result<Vec<u8>> {
        let mut raw = vec![0u8; entry.size_stored as usize];
        {
            let mut file = self.file.lock().unwrap();
            file.seek(SeekFrom::Start(self.read_offset + entry.offset_pos as u64))?;
            if !raw.is_empty() {
                file.read_exact(&mut raw)?;
            }
        }

        let mut keystream = Keystream::new(self.variant, (entry.key_base, entry.key_step));
        keystream.apply(&mut raw);

        let data = match entry.compression_type {
            CompressionType::None => raw,
            CompressionType::Zlib => {
                if raw.is_empty() {
                    raw
                } else {
                    let inflated = compress::zlib_inflate(&raw, entry.size_full as usize)
                        .map_err(|source| DatError::Inflate {
                            path: entry.path.clone(),
                            source,
                        })?;
                    if inflated.len() != entry.size_full as usize {
                        warn!(
                            path = %entry.path,
                            expected = entry.size_full,
                            actual = inflated.len(),
                            "inflated size mismatch"
                        );
                    }
                    inflated
                }
            }
        };

        // Integrity is advisory: mismatches are logged, the bytes are
        // returned regardless.
        if entry.crc32 != 0 && !data.is_empty() {
            let actual = crc32fast::hash(&data);
            if actual != entry.crc32 {
                warn!(
                    path = %entry.path,
                    expected = format_args!("{:08X}", entry.crc32),
                    actual = format_args!("{actual:08X}"),
                    "CRC-32 mismatch"
                );
            }
        }

        Ok(data)
    }
}

struct Item {
    name: String,
    node_type: NodeType,
    size_full: u32,
}

/// Iterator over one directory's contents, snapshotted at creation.
pub struct Enumerate<'a> {
    archive: &'a DatFile,
    items: std::vec::IntoIter<Item>,
}

impl<'a> Iterator for Enumerate<'a> {
    type Item = DirEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.next()?;
        Some(DirEntry {
            archive: self.archive,
            name: item.name,
            node_type: item.node_type,
            size_full: item.size_full,
        })
    }
}

/// One enumerated node: a file entry or a synthetic directory.
pub struct DirEntry<'a> {
    archive: &'a DatFile,
    name: String,
    node_type: NodeType,
    size_full: u32,
}

impl DirEntry<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn is_directory(&self) -> bool {
        self.node_type == NodeType::Directory
    }

    pub fn file_size(&self) -> u32 {
        self.size_full
    }

    /// Read the file content through the owning reader. Fails for
    /// directories.
    pub fn read(&self) -> Result<Vec<u8>> {
        self.archive.read_file(&self.name)
    }
}
