// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Declarative branding rules.
//!
//! A __rule__ is one filesystem mutation described as data: remove a stock
//! file, symlink a branded replacement into place, write literal content, or
//! append a line to a configuration file. Rules carry no behavior of their
//! own. The [`Branding`](crate::branding::Branding) applier interprets them in
//! declaration order against a target root.
//!
//! # Path Semantics
//!
//! Every path a rule names is a path on the _target_ system, e.g.,
//! `/etc/os-release`, and is resolved under the configured root at apply time.
//! The two exceptions are symlink targets, which are stored verbatim because
//! they are interpreted at boot time, and copy sources, which live in the
//! source directory of the build host.

use crate::path::is_confined;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// A single declarative filesystem mutation.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Rule {
    /// Delete file or symlink at path.
    Remove {
        path: PathBuf,

        /// Treat a missing path as success.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        ignore_missing: bool,
    },

    /// Create symbolic link at `link` whose content is `target`.
    Symlink {
        target: PathBuf,
        link: PathBuf,

        /// Replace whatever already sits at `link`.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        overwrite: bool,
    },

    /// Create or truncate file at path with literal content.
    WriteFile {
        path: PathBuf,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<u32>,
    },

    /// Append line to file unless an identical line already exists.
    AppendLineIfAbsent { path: PathBuf, line: String },

    /// Append line to file unconditionally.
    AppendLine { path: PathBuf, line: String },

    /// Create directory along with any missing parents.
    MakeDir {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<u32>,
    },

    /// Copy a single file from source directory into target root.
    CopyFile { source: PathBuf, dest: PathBuf },

    /// Copy directory tree verbatim from source directory into target root.
    CopyTree { source: PathBuf, dest: PathBuf },
}

impl Rule {
    /// Check that rule is well formed.
    ///
    /// # Errors
    ///
    /// - Return [`InvalidRule`] describing the first problem found.
    pub fn validate(&self) -> Result<(), InvalidRule> {
        for path in self.target_paths() {
            if path.as_os_str().is_empty() {
                return Err(InvalidRule::EmptyPath);
            }

            if !is_confined(path) {
                return Err(InvalidRule::EscapesRoot(path.to_path_buf()));
            }
        }

        match self {
            Self::Symlink { target, .. } if target.as_os_str().is_empty() => {
                Err(InvalidRule::EmptyPath)
            }
            Self::CopyFile { source, .. } | Self::CopyTree { source, .. }
                if source.as_os_str().is_empty() =>
            {
                Err(InvalidRule::EmptyPath)
            }
            Self::AppendLineIfAbsent { line, .. } | Self::AppendLine { line, .. }
                if line.contains(['\n', '\r']) =>
            {
                Err(InvalidRule::MultiLine(line.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Paths this rule resolves under the target root.
    pub fn target_paths(&self) -> Vec<&Path> {
        match self {
            Self::Remove { path, .. }
            | Self::WriteFile { path, .. }
            | Self::AppendLineIfAbsent { path, .. }
            | Self::AppendLine { path, .. }
            | Self::MakeDir { path, .. } => vec![path.as_path()],
            Self::Symlink { link, .. } => vec![link.as_path()],
            Self::CopyFile { dest, .. } | Self::CopyTree { dest, .. } => vec![dest.as_path()],
        }
    }
}

impl Display for Rule {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Remove {
                path,
                ignore_missing,
            } => {
                write!(fmt, "remove {}", path.display())?;
                if *ignore_missing {
                    fmt.write_str(" (ignore missing)")?;
                }
                Ok(())
            }
            Self::Symlink {
                target,
                link,
                overwrite,
            } => {
                write!(fmt, "symlink {} -> {}", link.display(), target.display())?;
                if *overwrite {
                    fmt.write_str(" (overwrite)")?;
                }
                Ok(())
            }
            Self::WriteFile {
                path,
                content,
                mode,
            } => {
                write!(fmt, "write {} ({} bytes", path.display(), content.len())?;
                if let Some(mode) = mode {
                    write!(fmt, ", mode {mode:o}")?;
                }
                fmt.write_str(")")
            }
            Self::AppendLineIfAbsent { path, line } => {
                write!(fmt, "append {line:?} to {} if absent", path.display())
            }
            Self::AppendLine { path, line } => {
                write!(fmt, "append {line:?} to {}", path.display())
            }
            Self::MakeDir { path, mode } => {
                write!(fmt, "mkdir {}", path.display())?;
                if let Some(mode) = mode {
                    write!(fmt, " (mode {mode:o})")?;
                }
                Ok(())
            }
            Self::CopyFile { source, dest } => {
                write!(fmt, "copy {} to {}", source.display(), dest.display())
            }
            Self::CopyTree { source, dest } => {
                write!(fmt, "copy tree {} to {}", source.display(), dest.display())
            }
        }
    }
}

/// Reasons a rule is rejected before anything is applied.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRule {
    /// A required path field is empty.
    #[error("path must not be empty")]
    EmptyPath,

    /// A root-side path climbs out of the target root.
    #[error("path {:?} escapes target root", .0.display())]
    EscapesRoot(PathBuf),

    /// Append line spans more than one line.
    #[error("line {0:?} must not contain line breaks")]
    MultiLine(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn validate_accepts_branding_rules() {
        let rules = [
            Rule::Remove {
                path: "/etc/os-release".into(),
                ignore_missing: false,
            },
            Rule::Symlink {
                target: "/etc/catos-os-release".into(),
                link: "/etc/os-release".into(),
                overwrite: false,
            },
            Rule::AppendLine {
                path: "/etc/environment".into(),
                line: "GTK_IM_MODULE=fcitx".into(),
            },
            Rule::CopyTree {
                source: "etc".into(),
                dest: "/etc".into(),
            },
        ];

        for rule in rules {
            assert_eq!(rule.validate(), Ok(()));
        }
    }

    #[test]
    fn validate_rejects_malformed_rules() {
        let rule = Rule::WriteFile {
            path: "".into(),
            content: "NAME=\"CatOS\"\n".into(),
            mode: None,
        };
        assert_eq!(rule.validate(), Err(InvalidRule::EmptyPath));

        let rule = Rule::Remove {
            path: "/etc/../../boot/vmlinuz".into(),
            ignore_missing: false,
        };
        assert_eq!(
            rule.validate(),
            Err(InvalidRule::EscapesRoot("/etc/../../boot/vmlinuz".into()))
        );

        let rule = Rule::AppendLineIfAbsent {
            path: "/etc/environment".into(),
            line: "GTK_IM_MODULE=fcitx\nQT_IM_MODULE=fcitx".into(),
        };
        assert!(matches!(rule.validate(), Err(InvalidRule::MultiLine(_))));

        // Symlink targets are never resolved, but they still cannot be empty.
        let rule = Rule::Symlink {
            target: "".into(),
            link: "/etc/issue".into(),
            overwrite: false,
        };
        assert_eq!(rule.validate(), Err(InvalidRule::EmptyPath));
    }

    #[test]
    fn display_rules_for_humans() {
        let rule = Rule::Symlink {
            target: "/etc/catos-os-release".into(),
            link: "/etc/os-release".into(),
            overwrite: true,
        };
        assert_eq!(
            rule.to_string(),
            "symlink /etc/os-release -> /etc/catos-os-release (overwrite)"
        );

        let rule = Rule::WriteFile {
            path: "/etc/motd".into(),
            content: "meow\n".into(),
            mode: Some(0o644),
        };
        assert_eq!(rule.to_string(), "write /etc/motd (5 bytes, mode 644)");

        let rule = Rule::AppendLineIfAbsent {
            path: "/etc/environment".into(),
            line: "SDL_IM_MODULE=fcitx".into(),
        };
        assert_eq!(
            rule.to_string(),
            "append \"SDL_IM_MODULE=fcitx\" to /etc/environment if absent"
        );
    }
}
