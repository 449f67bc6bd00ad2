//! Finalize Module for BOX Compiler
//!
//! Persists the four build artifacts. Output is first staged in a temporary
//! directory beside the output directory and only then moved into place. The
//! files they replace are parked in the staging directory until every swap has
//! succeeded, and restored if one fails, so `dist/` never mixes two builds.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::codegen::{ArtifactKind, BuildArtifacts};
use crate::config::MinifyLevel;
use crate::error::{BoxError, BoxResult};

// ═══════════════════════════════════════════════════════════════════════════════
// MINIFICATION SEAM
// ═══════════════════════════════════════════════════════════════════════════════

/// Compresses artifact text. Implemented by the host; the compiler only decides
/// when it runs.
pub trait Minifier {
    fn minify(&self, kind: ArtifactKind, source: &str, level: MinifyLevel) -> String;
}

/// Leaves every artifact unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl Minifier for PassThrough {
    fn minify(&self, _kind: ArtifactKind, source: &str, _level: MinifyLevel) -> String {
        source.to_string()
    }
}

impl<F> Minifier for F
where
    F: Fn(ArtifactKind, &str, MinifyLevel) -> String,
{
    fn minify(&self, kind: ArtifactKind, source: &str, level: MinifyLevel) -> String {
        self(kind, source, level)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WRITER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrittenArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub bytes: usize,
}

fn staging_parent(out_dir: &Path) -> BoxResult<PathBuf> {
    match out_dir.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Ok(PathBuf::from(".")),
        Some(parent) => Ok(parent.to_path_buf()),
        None => Err(BoxError::InvalidOutputDir {
            path: out_dir.to_path_buf(),
        }),
    }
}

fn write_error(path: &Path) -> impl FnOnce(std::io::Error) -> BoxError + '_ {
    move |source| BoxError::Write {
        path: path.to_path_buf(),
        source,
    }
}

/// A target replaced during the swap, with where its previous file was parked.
struct Swapped {
    target: PathBuf,
    previous: Option<PathBuf>,
}

/// Move `staged` onto `target`, parking an existing file at `backup` first.
/// The swap is recorded before the final rename so a failure can be undone.
fn swap_file(
    staged: &Path,
    target: &Path,
    backup: &Path,
    swapped: &mut Vec<Swapped>,
) -> BoxResult<()> {
    let previous = if target.is_file() {
        fs::rename(target, backup).map_err(write_error(target))?;
        Some(backup.to_path_buf())
    } else {
        None
    };
    swapped.push(Swapped {
        target: target.to_path_buf(),
        previous,
    });
    fs::rename(staged, target).map_err(write_error(target))
}

/// Put back every file replaced so far, newest first.
fn roll_back(swapped: &[Swapped]) {
    for swap in swapped.iter().rev() {
        let restored = match &swap.previous {
            Some(backup) => fs::rename(backup, &swap.target),
            None => match fs::remove_file(&swap.target) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        if let Err(e) = restored {
            tracing::warn!(file = %swap.target.display(), "could not restore previous artifact: {}", e);
        }
    }
}

/// Minify and write all four artifacts into `out_dir`.
///
/// With `MinifyLevel::None` the minifier is not called.
pub fn write_artifacts(
    artifacts: &BuildArtifacts,
    out_dir: &Path,
    level: MinifyLevel,
    minifier: &dyn Minifier,
) -> BoxResult<Vec<WrittenArtifact>> {
    let parent = staging_parent(out_dir)?;
    fs::create_dir_all(&parent).map_err(write_error(&parent))?;

    let staging = tempfile::Builder::new()
        .prefix(".box-staging-")
        .tempdir_in(&parent)
        .map_err(write_error(&parent))?;

    let mut staged = Vec::with_capacity(ArtifactKind::ALL.len());
    for (kind, source) in artifacts.iter() {
        let text = match level {
            MinifyLevel::None => source.to_string(),
            _ => minifier.minify(kind, source, level),
        };
        let path = staging.path().join(kind.file_name());
        fs::write(&path, &text).map_err(write_error(&path))?;
        staged.push((kind, path, text.len()));
    }

    fs::create_dir_all(out_dir).map_err(write_error(out_dir))?;

    let parked = staging.path().join("previous");
    fs::create_dir(&parked).map_err(write_error(&parked))?;

    let mut swapped = Vec::with_capacity(staged.len());
    let mut written = Vec::with_capacity(staged.len());
    for (kind, staged_path, bytes) in staged {
        let target = out_dir.join(kind.file_name());
        let backup = parked.join(kind.file_name());
        if let Err(e) = swap_file(&staged_path, &target, &backup, &mut swapped) {
            roll_back(&swapped);
            return Err(e);
        }
        tracing::debug!(file = %target.display(), bytes, "wrote artifact");
        written.push(WrittenArtifact {
            kind,
            path: target,
            bytes,
        });
    }

    Ok(written)
}
