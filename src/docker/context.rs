use crate::constants::{CONTEXT_DIR, RENDERED_FILE};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Prepare a clean build context for one image.
///
/// Any previous `<build_dir>/<repo>` is removed so stale files never leak into
/// a build. The contents of `<source>/context/` (if present) are copied in and
/// the rendered instructions are written as `Dockerfile`.
pub fn stage_context(build_dir: &Path, repo: &str, source: &Path, instructions: &str) -> Result<PathBuf> {
    let staged = build_dir.join(repo);
    if staged.exists() {
        fs::remove_dir_all(&staged)
            .with_context(|| format!("failed to clear stale context {}", staged.display()))?;
    }
    fs::create_dir_all(&staged)
        .with_context(|| format!("failed to create context {}", staged.display()))?;

    let context_src = source.join(CONTEXT_DIR);
    if context_src.is_dir() {
        copy_tree(&context_src, &staged)?;
    }

    fs::write(staged.join(RENDERED_FILE), instructions)
        .with_context(|| format!("failed to write {} for {}", RENDERED_FILE, repo))?;

    tracing::debug!(repo, context = %staged.display(), "Staged build context");
    Ok(staged)
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)
                .with_context(|| format!("failed to copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}
