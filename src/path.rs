// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Rule books name paths as they will appear on the booted system, e.g.,
//! `/etc/os-release`. During a chroot-style build those paths must land inside
//! a staging root instead of the host's own `/etc`. The helpers here perform
//! that translation without ever consulting the process working directory.

use std::{
    ffi::OsString,
    fs,
    path::{Component, Path, PathBuf},
};

/// Maximum number of symlinks followed while resolving a single path.
///
/// Matches Linux's own `MAXSYMLINKS`.
pub const MAX_SYMLINK_HOPS: usize = 40;

/// Resolve path as it would appear on the target system to a host path under
/// `root`.
///
/// Leading `/` is stripped, `.` components are dropped, and the remainder is
/// joined onto `root`. Does not touch the file system, so the returned path
/// need not exist.
///
/// # Errors
///
/// - Return [`PathError::EmptyRoot`] if root is empty.
/// - Return [`PathError::EscapesRoot`] if path contains a `..` component.
pub fn resolve(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<PathBuf> {
    if root.as_ref().as_os_str().is_empty() {
        return Err(PathError::EmptyRoot);
    }

    let mut resolved = root.as_ref().to_path_buf();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::RootDir | Component::CurDir => continue,
            Component::ParentDir | Component::Prefix(_) => {
                return Err(PathError::EscapesRoot {
                    path: path.as_ref().to_path_buf(),
                })
            }
        }
    }

    Ok(resolved)
}

/// Resolve path under `root` the way the booted system would see it.
///
/// Like [`resolve`], but symlinks already present under the root are followed
/// as if `root` were `/`. An absolute link target restarts from `root`, and
/// `..` in a link target never climbs above `root`. The final component is
/// only followed when `follow_last` is set, so rules that operate on the link
/// itself, e.g., remove and symlink, still see it.
///
/// Missing components are joined lexically, so the returned path need not
/// exist.
///
/// # Errors
///
/// - Return [`PathError::EmptyRoot`] if root is empty.
/// - Return [`PathError::EscapesRoot`] if path contains a `..` component.
/// - Return [`PathError::SymlinkLoop`] after [`MAX_SYMLINK_HOPS`] links.
pub fn resolve_confined(
    root: impl AsRef<Path>,
    path: impl AsRef<Path>,
    follow_last: bool,
) -> Result<PathBuf> {
    let (root, path) = (root.as_ref(), path.as_ref());
    resolve(root, path)?;

    let mut pending = Vec::new();
    push_steps(&mut pending, path);

    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;
    let mut hops = 0usize;
    while let Some(step) = pending.pop() {
        let part = match step {
            Step::Enter(part) => part,
            Step::Leave => {
                // INVARIANT: Never climb above root.
                if depth > 0 {
                    resolved.pop();
                    depth -= 1;
                }
                continue;
            }
        };

        resolved.push(&part);
        depth += 1;
        if pending.is_empty() && !follow_last {
            break;
        }

        let is_link = fs::symlink_metadata(&resolved)
            .map(|metadata| metadata.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            continue;
        }

        hops += 1;
        if hops > MAX_SYMLINK_HOPS {
            return Err(PathError::SymlinkLoop { path: path.into() });
        }

        let Ok(target) = fs::read_link(&resolved) else {
            continue;
        };

        resolved.pop();
        depth -= 1;
        if target.has_root() {
            resolved = root.to_path_buf();
            depth = 0;
        }
        push_steps(&mut pending, &target);
    }

    Ok(resolved)
}

enum Step {
    Enter(OsString),
    Leave,
}

// Stack is popped from the back, so steps are pushed in reverse.
fn push_steps(pending: &mut Vec<Step>, path: &Path) {
    for component in path.components().rev() {
        match component {
            Component::Normal(part) => pending.push(Step::Enter(part.to_os_string())),
            Component::ParentDir => pending.push(Step::Leave),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
}

/// Resolve source path relative to a source directory.
///
/// Absolute source paths are taken as-is, because copy sources live on the
/// build host rather than inside the target root.
pub fn resolve_source(source_dir: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    if path.as_ref().is_absolute() {
        path.as_ref().to_path_buf()
    } else {
        source_dir.as_ref().join(path.as_ref())
    }
}

/// Check that path can be resolved under a root.
pub(crate) fn is_confined(path: impl AsRef<Path>) -> bool {
    !path
        .as_ref()
        .components()
        .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
}

/// Path resolution error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum PathError {
    /// Path would resolve outside of target root.
    #[error("path {:?} escapes target root", .path.display())]
    EscapesRoot { path: PathBuf },

    /// Root was given as an empty path.
    #[error("target root is empty")]
    EmptyRoot,

    /// Too many symlinks followed while resolving path.
    #[error("too many levels of symlinks resolving {:?}", .path.display())]
    SymlinkLoop { path: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;
