//! Write side: builds a v2 archive from a base directory and a list of
//! relative paths. Legacy archives are read-only.
//!
//! The build runs in three phases over a temp file: stage the plaintext
//! bodies, append the serialized directory, then copy everything into the
//! final output through the cipher. The temp file is removed on every exit
//! path.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LE, WriteBytesExt};
use tracing::debug;

use crate::cipher::{self, CipherVariant, Keystream};
use crate::dat::{CompressionType, DatEntry};
use crate::error::{DatError, Result};
use crate::spec::{self, RawHeader};
use crate::{compress, path};

/// Scratch buffer size for the encryption copy pass.
const ENCRYPT_CHUNK: usize = 16 * 1024;

/// Bodies below this size are stored raw; zlib overhead dominates on tiny
/// files.
const COMPRESS_THRESHOLD: u32 = 0x100;

type StatusCallback = Box<dyn Fn(&str)>;
type ProgressCallback = Box<dyn Fn(f32)>;

/// Builds an archive from files on disk.
///
/// Queue relative paths with [`add_file`](Self::add_file), then call
/// [`create`](Self::create). Status and progress callbacks are invoked
/// synchronously from the calling thread.
#[derive(Default)]
pub struct DatArchiveCreator {
    files: Vec<String>,
    on_status: Option<StatusCallback>,
    on_progress: Option<ProgressCallback>,
}

impl DatArchiveCreator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one file, relative to the base directory passed to `create`.
    pub fn add_file(&mut self, relative_path: &str) {
        self.files.push(path::normalize_slashes(relative_path));
    }

    pub fn on_status<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + 'static,
    {
        self.on_status = Some(Box::new(f));
        self
    }

    /// Progress is a monotone float in `[0, 1]`.
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(f32) + 'static,
    {
        self.on_progress = Some(Box::new(f));
        self
    }

    /// Produce the archive at `output_path` from the queued files under
    /// `base_dir`.
    pub fn create(&self, base_dir: impl AsRef<Path>, output_path: impl AsRef<Path>) -> Result<()> {
        let output_path = output_path.as_ref();
        let tmp_path = tmp_path(output_path);
        let result = self.build(base_dir.as_ref(), output_path, &tmp_path);
        let _ = fs::remove_file(&tmp_path);
        result
    }

    fn build(&self, base_dir: &Path, output_path: &Path, tmp_path: &Path) -> Result<()> {
        self.progress(0.0);

        let (header_base, header_step) = cipher::header_key(cipher::MASTER_KEY);

        let mut tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(tmp_path)?;

        self.status("Writing header");
        let mut header = RawHeader {
            magic: cipher::MAGIC,
            version: cipher::VERSION_CURRENT,
            entry_count: self.files.len() as u32,
            // header_offset / header_size patched after phase 2
            header_offset: 0,
            header_size: 0,
        };
        tmp.write_all(&header.to_bytes())?;
        self.progress(0.10);

        // Phase 1: stage the plaintext bodies, accumulating entry metadata.
        let mut entries = Vec::with_capacity(self.files.len());
        let progress_step = if self.files.is_empty() {
            0.0
        } else {
            0.65 / self.files.len() as f32
        };

        for (i, relative) in self.files.iter().enumerate() {
            self.status(&format!("Processing [{relative}]"));

            let content = fs::read(base_dir.join(relative))?;
            let size_full = cast_u32(content.len() as u64)?;
            let offset_pos = cast_u32(tmp.stream_position()?)?;
            let (key_base, key_step) = cipher::file_key(relative, header_base, header_step);

            let mut entry = DatEntry {
                path: relative.clone(),
                compression_type: CompressionType::None,
                size_full,
                size_stored: size_full,
                offset_pos,
                key_base,
                key_step,
                crc32: crc32fast::hash(&content),
            };

            let body = if size_full >= COMPRESS_THRESHOLD {
                match compress::zlib_deflate(&content) {
                    Ok(compressed) => {
                        entry.compression_type = CompressionType::Zlib;
                        entry.size_stored = cast_u32(compressed.len() as u64)?;
                        compressed
                    }
                    Err(err) => {
                        debug!(path = %relative, %err, "deflate failed, storing raw");
                        content
                    }
                }
            } else {
                content
            };

            if !body.is_empty() {
                tmp.write_all(&body)?;
            }
            entries.push(entry);
            self.progress(0.10 + progress_step * i as f32);
        }

        // Phase 2: stage the directory and patch the header offsets.
        self.status("Writing entries info");
        let meta_begin = tmp.stream_position()?;

        let mut meta = Vec::new();
        for entry in &entries {
            meta.extend_from_slice(&(spec::record_size(entry) as u32).to_le_bytes());
            spec::write_record(&mut meta, entry);
        }

        // A directory that does not deflate is fatal, unlike entry bodies.
        let compressed_meta = compress::zlib_deflate(&meta)?;
        tmp.write_all(&compressed_meta)?;

        header.header_offset = cast_u32(meta_begin)?;
        header.header_size = cast_u32(compressed_meta.len() as u64)?;
        tmp.seek(SeekFrom::Start(RawHeader::OFFSET_FIELD_POS))?;
        tmp.write_u32::<LE>(header.header_offset)?;
        tmp.write_u32::<LE>(header.header_size)?;
        tmp.flush()?;

        // Phase 3: copy temp to output through the cipher.
        self.status("Encrypting archive");
        self.progress(0.95);
        encrypt_archive(&mut tmp, output_path, &header, (header_base, header_step), &entries)?;

        self.status("Done");
        self.progress(1.0);
        Ok(())
    }

    fn status(&self, message: &str) {
        if let Some(f) = &self.on_status {
            f(message);
        }
    }

    fn progress(&self, value: f32) {
        if let Some(f) = &self.on_progress {
            f(value);
        }
    }
}

/// The header and the directory share one continuous keystream; every entry
/// body starts a fresh one with its own per-file seed.
fn encrypt_archive(
    src: &mut File,
    output_path: &Path,
    header: &RawHeader,
    header_key: (u8, u8),
    entries: &[DatEntry],
) -> Result<()> {
    src.seek(SeekFrom::Start(0))?;
    let mut dest = File::create(output_path)?;
    let mut scratch = vec![0u8; ENCRYPT_CHUNK];

    let mut header_keystream = Keystream::new(CipherVariant::Current, header_key);
    let mut head = [0u8; RawHeader::SIZE];
    src.read_exact(&mut head)?;
    header_keystream.apply(&mut head);
    dest.write_all(&head)?;

    for entry in entries {
        let mut keystream = Keystream::new(CipherVariant::Current, (entry.key_base, entry.key_step));
        src.seek(SeekFrom::Start(entry.offset_pos as u64))?;
        dest.seek(SeekFrom::Start(entry.offset_pos as u64))?;
        copy_encrypted(src, &mut dest, entry.size_stored as u64, &mut keystream, &mut scratch)?;
    }

    src.seek(SeekFrom::Start(header.header_offset as u64))?;
    dest.seek(SeekFrom::Start(header.header_offset as u64))?;
    copy_encrypted(
        src,
        &mut dest,
        header.header_size as u64,
        &mut header_keystream,
        &mut scratch,
    )?;

    Ok(())
}

fn copy_encrypted(
    src: &mut File,
    dest: &mut File,
    len: u64,
    keystream: &mut Keystream,
    scratch: &mut [u8],
) -> Result<()> {
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(scratch.len() as u64) as usize;
        src.read_exact(&mut scratch[..want])?;
        keystream.apply(&mut scratch[..want]);
        dest.write_all(&scratch[..want])?;
        remaining -= want as u64;
    }
    Ok(())
}

fn cast_u32(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| DatError::TooLarge(value))
}

fn tmp_path(output: &Path) -> PathBuf {
    let mut os = output.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::datfile::DatFile;

    #[test]
    fn write_then_read_two_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("input");
        fs::create_dir_all(base.join("a")).unwrap();
        fs::write(base.join("test.txt"), b"hello world").unwrap();
        fs::write(base.join("a/test2.txt"), "你好，中国！".as_bytes()).unwrap();

        let output = dir.path().join("out.dat");
        let mut creator = DatArchiveCreator::new();
        creator.add_file("test.txt");
        creator.add_file("a\\test2.txt");
        creator.create(&base, &output).unwrap();

        assert!(!tmp_path(&output).exists());

        let archive = DatFile::open(&output).unwrap();
        assert_eq!(archive.version(), cipher::VERSION_CURRENT);
        assert_eq!(archive.entry_count(), 2);
        assert_eq!(archive.read_file("test.txt").unwrap(), b"hello world");
        assert_eq!(archive.read_file("a/test2.txt").unwrap(), "你好，中国！".as_bytes());
        assert!(archive.has_directory("a"));
    }

    #[test]
    fn callbacks_report_phases_and_monotone_progress() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("input");
        fs::create_dir_all(&base).unwrap();
        fs::write(base.join("file.bin"), vec![7u8; 600]).unwrap();

        let statuses = Rc::new(RefCell::new(Vec::new()));
        let progresses = Rc::new(RefCell::new(Vec::new()));

        let mut creator = DatArchiveCreator::new()
            .on_status({
                let statuses = Rc::clone(&statuses);
                move |msg| statuses.borrow_mut().push(msg.to_string())
            })
            .on_progress({
                let progresses = Rc::clone(&progresses);
                move |v| progresses.borrow_mut().push(v)
            });
        creator.add_file("file.bin");
        creator.create(&base, dir.path().join("out.dat")).unwrap();

        let statuses = statuses.borrow();
        assert_eq!(
            statuses.as_slice(),
            [
                "Writing header",
                "Processing [file.bin]",
                "Writing entries info",
                "Encrypting archive",
                "Done"
            ]
        );

        let progresses = progresses.borrow();
        assert_eq!(*progresses.first().unwrap(), 0.0);
        assert_eq!(*progresses.last().unwrap(), 1.0);
        assert!(progresses.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn missing_input_file_fails_and_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("input");
        fs::create_dir_all(&base).unwrap();

        let output = dir.path().join("out.dat");
        let mut creator = DatArchiveCreator::new();
        creator.add_file("does-not-exist.bin");

        assert!(creator.create(&base, &output).is_err());
        assert!(!tmp_path(&output).exists());
    }
}
