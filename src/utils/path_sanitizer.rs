// SPDX-License-Identifier: GPL-3.0-only
use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

/// Validate a path that must stay below some base directory.
///
/// Rejects empty, absolute and parent-referencing paths; `.` components are
/// dropped from the result.
pub fn validate_relative_path(raw: &str) -> Result<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("Path cannot be empty"));
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(anyhow::anyhow!("Path contains parent directory reference (..): {}", raw));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(anyhow::anyhow!("Path must be relative: {}", raw));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(anyhow::anyhow!("Path cannot be empty"));
    }

    Ok(normalized)
}

/// Validate that an existing path is within a base directory.
///
/// Uses canonicalization so symlinks pointing outside the base are caught.
pub fn validate_path_within_base(path: &Path, base: &Path) -> Result<()> {
    let canonical_path = path.canonicalize().context("Failed to canonicalize path")?;
    let canonical_base = base.canonicalize().context("Failed to canonicalize base path")?;

    if !canonical_path.starts_with(&canonical_base) {
        return Err(anyhow::anyhow!(
            "Path {} is outside base directory {}",
            canonical_path.display(),
            canonical_base.display()
        ));
    }

    Ok(())
}
