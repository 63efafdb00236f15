// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Rule targets.
//!
//! A __rule target__ is whatever actually carries out a rule's filesystem
//! mutation once the applier has resolved its paths. [`HostTarget`] performs
//! real `std::fs` calls. [`DryRunTarget`] only reports what would happen.
//!
//! All paths handed to a rule target are already resolved host paths, so a
//! target never needs to know about the configured root. Symlinks under the
//! root are resolved before that point, so [`HostTarget`] opens files it
//! writes with `O_NOFOLLOW` and refuses any link that shows up in between.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, ErrorKind as IoErrorKind, Read, Write},
    os::unix::fs::{symlink, OpenOptionsExt, PermissionsExt},
    path::{Path, PathBuf},
};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Whether applying a rule modified the file system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// File system was modified.
    Changed,

    /// Rule was already satisfied, or tolerated a missing path.
    Unchanged,
}

/// Carry out resolved branding rules.
pub trait RuleTarget {
    /// Delete file or symlink at path without following symlinks.
    fn remove(&self, path: &Path, ignore_missing: bool) -> Result<Outcome>;

    /// Create symlink at `link` whose content is `target`.
    fn symlink(&self, target: &Path, link: &Path, overwrite: bool) -> Result<Outcome>;

    /// Create or truncate file with literal content.
    fn write_file(&self, path: &Path, content: &str, mode: Option<u32>) -> Result<Outcome>;

    /// Append line to file, skipping if `dedupe` is set and line is present.
    fn append_line(&self, path: &Path, line: &str, dedupe: bool) -> Result<Outcome>;

    /// Create directory along with missing parents.
    fn make_dir(&self, path: &Path, mode: Option<u32>) -> Result<Outcome>;

    /// Copy single file, creating parents of destination.
    fn copy_file(&self, source: &Path, dest: &Path) -> Result<Outcome>;

    /// Copy directory tree verbatim, preserving symlinks.
    fn copy_tree(&self, source: &Path, dest: &Path) -> Result<Outcome>;
}

/// Rule target that mutates the host file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostTarget;

impl HostTarget {
    /// Construct new host target.
    pub fn new() -> Self {
        Self
    }
}

impl RuleTarget for HostTarget {
    fn remove(&self, path: &Path, ignore_missing: bool) -> Result<Outcome> {
        if !exists_no_follow(path) {
            if ignore_missing {
                debug!("{} already absent", path.display());
                return Ok(Outcome::Unchanged);
            }

            return Err(TargetError::NotFound { path: path.into() });
        }

        fs::remove_file(path).map_err(|err| TargetError::from_io(err, path))?;
        Ok(Outcome::Changed)
    }

    fn symlink(&self, target: &Path, link: &Path, overwrite: bool) -> Result<Outcome> {
        if exists_no_follow(link) {
            if !overwrite {
                return Err(TargetError::AlreadyExists { path: link.into() });
            }

            debug!("replace existing entry at {}", link.display());
            fs::remove_file(link).map_err(|err| TargetError::from_io(err, link))?;
        }

        symlink(target, link).map_err(|err| TargetError::from_io(err, link))?;
        Ok(Outcome::Changed)
    }

    fn write_file(&self, path: &Path, content: &str, mode: Option<u32>) -> Result<Outcome> {
        let mut file = open_no_follow(
            OpenOptions::new().write(true).create(true).truncate(true),
            path,
        )?;
        file.write_all(content.as_bytes())
            .map_err(|err| TargetError::from_io(err, path))?;
        if let Some(mode) = mode {
            file.set_permissions(fs::Permissions::from_mode(mode))
                .map_err(|err| TargetError::from_io(err, path))?;
        }

        Ok(Outcome::Changed)
    }

    fn append_line(&self, path: &Path, line: &str, dedupe: bool) -> Result<Outcome> {
        let mut file = open_no_follow(
            OpenOptions::new().read(true).append(true).create(true),
            path,
        )?;
        let mut existing = Vec::new();
        file.read_to_end(&mut existing)
            .map_err(|err| TargetError::from_io(err, path))?;

        if dedupe && has_line(&existing, line.as_bytes()) {
            debug!("{line:?} already present in {}", path.display());
            return Ok(Outcome::Unchanged);
        }

        // INVARIANT: Appended line always starts on a fresh line.
        let mut entry = Vec::with_capacity(line.len() + 2);
        if existing.last().is_some_and(|byte| *byte != b'\n') {
            entry.push(b'\n');
        }
        entry.extend_from_slice(line.as_bytes());
        entry.push(b'\n');

        file.write_all(&entry)
            .map_err(|err| TargetError::from_io(err, path))?;

        Ok(Outcome::Changed)
    }

    fn make_dir(&self, path: &Path, mode: Option<u32>) -> Result<Outcome> {
        let outcome = if path.is_dir() {
            Outcome::Unchanged
        } else {
            fs::create_dir_all(path).map_err(|err| TargetError::from_io(err, path))?;
            Outcome::Changed
        };

        if let Some(mode) = mode {
            set_mode(path, mode)?;
        }

        Ok(outcome)
    }

    fn copy_file(&self, source: &Path, dest: &Path) -> Result<Outcome> {
        if !source.is_file() {
            return Err(TargetError::NotFound {
                path: source.into(),
            });
        }

        create_parent(dest)?;
        copy_contents(
            source,
            OpenOptions::new().write(true).create(true).truncate(true),
            dest,
        )?;
        Ok(Outcome::Changed)
    }

    fn copy_tree(&self, source: &Path, dest: &Path) -> Result<Outcome> {
        if !source.is_dir() {
            return Err(TargetError::NotFound {
                path: source.into(),
            });
        }

        for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(source).to_path_buf();
                TargetError::from_io(err.into(), &path)
            })?;
            let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
            let dest_path = dest.join(relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                // INVARIANT: Never descend through a link already in the destination.
                let is_link = fs::symlink_metadata(&dest_path)
                    .is_ok_and(|metadata| metadata.file_type().is_symlink());
                if is_link {
                    return Err(TargetError::AlreadyExists { path: dest_path });
                }

                fs::create_dir_all(&dest_path)
                    .map_err(|err| TargetError::from_io(err, &dest_path))?;
                continue;
            }

            // INVARIANT: Later copies replace earlier ones, like `cp -a`.
            if exists_no_follow(&dest_path) {
                fs::remove_file(&dest_path)
                    .map_err(|err| TargetError::from_io(err, &dest_path))?;
            }

            if file_type.is_symlink() {
                let link_target = fs::read_link(entry.path())
                    .map_err(|err| TargetError::from_io(err, entry.path()))?;
                symlink(&link_target, &dest_path)
                    .map_err(|err| TargetError::from_io(err, &dest_path))?;
            } else {
                copy_contents(
                    entry.path(),
                    OpenOptions::new().write(true).create_new(true),
                    &dest_path,
                )?;
            }
        }

        Ok(Outcome::Changed)
    }
}

/// Rule target that only reports what would be done.
///
/// Preconditions are not checked, because later rules routinely depend on
/// the effects of earlier ones, e.g., a symlink placed where a stock file was
/// just removed.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunTarget;

impl DryRunTarget {
    /// Construct new dry run target.
    pub fn new() -> Self {
        Self
    }
}

impl RuleTarget for DryRunTarget {
    fn remove(&self, path: &Path, _ignore_missing: bool) -> Result<Outcome> {
        info!("would remove {}", path.display());
        Ok(Outcome::Changed)
    }

    fn symlink(&self, target: &Path, link: &Path, _overwrite: bool) -> Result<Outcome> {
        info!("would link {} -> {}", link.display(), target.display());
        Ok(Outcome::Changed)
    }

    fn write_file(&self, path: &Path, content: &str, _mode: Option<u32>) -> Result<Outcome> {
        info!("would write {} bytes to {}", content.len(), path.display());
        Ok(Outcome::Changed)
    }

    fn append_line(&self, path: &Path, line: &str, _dedupe: bool) -> Result<Outcome> {
        info!("would append {line:?} to {}", path.display());
        Ok(Outcome::Changed)
    }

    fn make_dir(&self, path: &Path, _mode: Option<u32>) -> Result<Outcome> {
        info!("would create directory {}", path.display());
        Ok(Outcome::Changed)
    }

    fn copy_file(&self, source: &Path, dest: &Path) -> Result<Outcome> {
        info!("would copy {} to {}", source.display(), dest.display());
        Ok(Outcome::Changed)
    }

    fn copy_tree(&self, source: &Path, dest: &Path) -> Result<Outcome> {
        info!("would copy tree {} to {}", source.display(), dest.display());
        Ok(Outcome::Changed)
    }
}

fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn open_no_follow(options: &mut OpenOptions, path: &Path) -> Result<File> {
    options
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)
        .map_err(|err| TargetError::from_io(err, path))
}

// Byte-wise so files that are not UTF-8 still compare, and `\r` is kept.
fn has_line(content: &[u8], line: &[u8]) -> bool {
    if content.is_empty() {
        return false;
    }

    content
        .strip_suffix(b"\n")
        .unwrap_or(content)
        .split(|byte| *byte == b'\n')
        .any(|current| current == line)
}

fn copy_contents(source: &Path, options: &mut OpenOptions, dest: &Path) -> Result<()> {
    let mut reader = File::open(source).map_err(|err| TargetError::from_io(err, source))?;
    let permissions = reader
        .metadata()
        .map_err(|err| TargetError::from_io(err, source))?
        .permissions();

    let mut writer = open_no_follow(options, dest)?;
    io::copy(&mut reader, &mut writer).map_err(|err| TargetError::from_io(err, dest))?;
    writer
        .set_permissions(permissions)
        .map_err(|err| TargetError::from_io(err, dest))?;

    Ok(())
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|err| TargetError::from_io(err, path))
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| TargetError::from_io(err, parent))?;
    }

    Ok(())
}

/// Coarse classification of rule target failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Io,
}

/// Rule target error types.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// Path that must exist is missing.
    #[error("{:?} does not exist", .path.display())]
    NotFound { path: PathBuf },

    /// Path that must not exist is already present.
    #[error("{:?} already exists", .path.display())]
    AlreadyExists { path: PathBuf },

    /// Insufficient permissions to touch path.
    #[error("permission denied for {:?}", .path.display())]
    PermissionDenied {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Any other I/O failure.
    #[error("failed to modify {:?}", .path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl TargetError {
    /// Classify I/O error raised while working on path.
    pub fn from_io(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match err.kind() {
            IoErrorKind::NotFound => Self::NotFound { path },
            IoErrorKind::AlreadyExists => Self::AlreadyExists { path },
            IoErrorKind::PermissionDenied => Self::PermissionDenied { source: err, path },
            _ => Self::Io { source: err, path },
        }
    }

    /// Coarse kind of failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = TargetError> = std::result::Result<T, E>;
