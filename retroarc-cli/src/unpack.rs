use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use retroarc_core::DatFile;
use retroarc_core::dat::DatEntry;
use serde::Serialize;

use crate::{InfoCommand, ListCommand, UnpackCommand};

pub fn unpack(cmd: &UnpackCommand) -> anyhow::Result<()> {
    let archive = DatFile::open_at(&cmd.input, cmd.offset)
        .context(format!("Failed to open `{}`", &cmd.input))?;
    let output_dir = output_dir(&cmd.output, &cmd.input);

    let bar = ProgressBar::new(archive.entry_count() as u64);
    bar.set_style(ProgressStyle::default_bar().template("{pos}/{len} files {wide_bar} eta: {eta}")?);
    bar.println(format!("Output directory: `{}`", output_dir.display()));

    let mut failed = 0usize;
    let paths: Vec<String> = archive.entries().map(|e| e.path.clone()).collect();
    for path in &paths {
        match extract_one(&archive, path, &output_dir) {
            Ok(()) => {}
            Err(err) => {
                failed += 1;
                bar.println(format!("Error extracting `{path}`: {err:#}"));
            }
        }
        bar.inc(1);
    }
    bar.finish();

    if failed > 0 {
        println!("Done with {failed} errors");
    } else {
        println!("Done.");
    }
    Ok(())
}

fn extract_one(archive: &DatFile, path: &str, output_dir: &Path) -> anyhow::Result<()> {
    let data = archive.read_file(path)?;
    let out_path = output_dir.join(path);
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&out_path, data)?;
    Ok(())
}

pub fn list(cmd: &ListCommand) -> anyhow::Result<()> {
    let archive = DatFile::open_at(&cmd.input, cmd.offset)
        .context(format!("Failed to open `{}`", &cmd.input))?;

    println!("{} v{}, {} entries", cmd.input, archive.version(), archive.entry_count());
    for entry in archive.entries() {
        println!(
            "{:>10}  {:>10}  {:<5}  {:08X}  {}",
            entry.size_full,
            entry.size_stored,
            match entry.compression_type {
                retroarc_core::dat::CompressionType::None => "store",
                retroarc_core::dat::CompressionType::Zlib => "zlib",
            },
            entry.crc32,
            entry.path
        );
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ArchiveInfo<'a> {
    path: &'a str,
    version: u32,
    entry_count: usize,
    entries: Vec<&'a DatEntry>,
}

pub fn dump_info(cmd: &InfoCommand) -> anyhow::Result<()> {
    let archive = DatFile::open_at(&cmd.input, cmd.offset)
        .context(format!("Failed to open `{}`", &cmd.input))?;

    let info = ArchiveInfo {
        path: &cmd.input,
        version: archive.version(),
        entry_count: archive.entry_count(),
        entries: archive.entries().collect(),
    };
    let json = serde_json::to_string_pretty(&info)?;

    match &cmd.output {
        Some(output) => fs::write(output, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn output_dir<P: AsRef<Path>>(output: &Option<String>, input: P) -> PathBuf {
    if let Some(output) = output {
        output.into()
    } else if let Some(parent) = input.as_ref().parent() {
        let dir_name = input
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or("output".to_string());
        parent.join(dir_name)
    } else {
        ".".into()
    }
}
