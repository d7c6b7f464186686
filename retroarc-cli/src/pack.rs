use std::path::{Path, PathBuf};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use retroarc_core::DatArchiveCreator;

use crate::PackCommand;

const PROGRESS_TICKS: u64 = 1000;

pub fn pack(cmd: &PackCommand) -> anyhow::Result<()> {
    let input_dir = Path::new(&cmd.input);
    let files = collect_inputs(input_dir)?;
    if files.is_empty() {
        anyhow::bail!("No input files found in `{}`", input_dir.display());
    }

    let output_path = cmd.output.as_ref().map(PathBuf::from).unwrap_or_else(|| {
        let mut path = input_dir.to_path_buf();
        path.set_extension("dat");
        path
    });
    if !cmd.r#override && output_path.exists() {
        anyhow::bail!(
            "Output file `{}` already exists, pass --override to replace it",
            output_path.display()
        );
    }

    let bar = ProgressBar::new(PROGRESS_TICKS);
    bar.set_style(ProgressStyle::default_bar().template("{msg:40!} {wide_bar} {percent}%")?);

    let mut creator = DatArchiveCreator::new()
        .on_status({
            let bar = bar.clone();
            move |msg| bar.set_message(msg.to_string())
        })
        .on_progress({
            let bar = bar.clone();
            move |value| bar.set_position((value * PROGRESS_TICKS as f32) as u64)
        });
    for file in &files {
        creator.add_file(file);
    }

    creator
        .create(input_dir, &output_path)
        .context("Failed to create archive")?;
    bar.finish();

    println!("Packed {} files into `{}`", files.len(), output_path.display());
    Ok(())
}

/// Collect every file under `input_dir` as a forward-slash relative path.
fn collect_inputs(input_dir: &Path) -> anyhow::Result<Vec<String>> {
    if !input_dir.is_dir() {
        anyhow::bail!("Input directory does not exist: {}", input_dir.display());
    }

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(input_dir).sort_by_file_name() {
        let entry = entry?;
        if entry.path().is_file() {
            let relative = entry
                .path()
                .strip_prefix(input_dir)
                .expect("walkdir yields paths under its root");
            files.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(files)
}
