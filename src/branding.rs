// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Branding applier.
//!
//! __Branding__ is the act of replacing stock distribution identity files with
//! custom ones, e.g., swapping Arch Linux's `/etc/os-release` for one that
//! names CatOS. Historically this was a shell script full of `rm`, `ln -s`,
//! heredocs, and `echo >>` lines run from a package build hook. Here those
//! steps are data ([`Rule`]s collected into a [`RuleBook`]), and the applier is
//! a generic interpreter over them.
//!
//! # Application Order
//!
//! Rules are applied strictly in declaration order, one at a time. Later rules
//! may depend on earlier ones, e.g., a symlink placed where a stock file was
//! removed, or a file written into a directory made by a prior `make-dir`
//! rule. The first failing rule aborts the whole run, leaving every rule after
//! it unapplied. There are no retries.
//!
//! # Roots
//!
//! Every rule path is resolved under a target root before being handed to a
//! [`RuleTarget`]. The root defaults to `/`, but can point at any staging
//! directory for chroot-style builds. Symlink targets are not resolved, because
//! they are interpreted by the booted system rather than the build host.
//!
//! Symlinks already present under the root are followed as the booted system
//! would follow them, i.e., an absolute link target lands back under the root
//! instead of on the build host. See [`resolve_confined`].

pub mod target;

use crate::{
    branding::target::{HostTarget, Outcome, RuleTarget, TargetError},
    config::{RuleBook, TargetRoot},
    path::{resolve_confined, resolve_source, PathError},
    rule::Rule,
};

use std::path::Path;
use tracing::{debug, info, instrument};

/// Apply rules in order against root on the host file system.
///
/// Copy rules take their sources relative to the current directory. Use
/// [`Branding`] with a full [`RuleBook`] to control that explicitly.
///
/// # Errors
///
/// - Return [`ApplyError::Rule`] for the first rule that fails.
/// - Return [`ApplyError::Path`] if a rule path escapes the root, or if root
///   is empty.
pub fn apply(rules: &[Rule], root: impl AsRef<Path>) -> Result<ApplyReport> {
    let mut book = RuleBook::default();
    book.settings.root = TargetRoot::new(root.as_ref());
    book.rules = rules.to_vec();

    Branding::new(book, HostTarget::new()).apply()
}

/// Rule book bound to a rule target.
#[derive(Debug)]
pub struct Branding<T = HostTarget>
where
    T: RuleTarget,
{
    pub(crate) book: RuleBook,
    pub(crate) target: T,
}

impl<T> Branding<T>
where
    T: RuleTarget,
{
    /// Construct new branding applier.
    pub fn new(book: RuleBook, target: T) -> Self {
        Self { book, target }
    }

    /// Rule book being applied.
    pub fn book(&self) -> &RuleBook {
        &self.book
    }

    /// Apply every rule of rule book in order.
    ///
    /// Stops at the first failure.
    ///
    /// # Errors
    ///
    /// - Return [`ApplyError::Rule`] for the first rule that fails.
    /// - Return [`ApplyError::Path`] if a rule path escapes the root.
    #[instrument(skip(self), level = "debug")]
    pub fn apply(&self) -> Result<ApplyReport> {
        let settings = &self.book.settings;
        info!(
            "apply {} rules to {}",
            self.book.rules.len(),
            settings.root
        );

        let mut report = ApplyReport::default();
        for (index, rule) in self.book.rules.iter().enumerate() {
            debug!("rule #{}: {rule}", index + 1);
            let outcome = self
                .apply_rule(rule)?
                .map_err(|source| ApplyError::Rule {
                    index,
                    rule: rule.to_string(),
                    source,
                })?;
            report.record(outcome);
        }

        info!(
            "done: {} changed, {} unchanged",
            report.changed, report.unchanged
        );

        Ok(report)
    }

    // Outer error is path resolution, inner error is the target's failure.
    fn apply_rule(&self, rule: &Rule) -> Result<Result<Outcome, TargetError>> {
        let settings = &self.book.settings;
        let root = settings.root.as_path();
        let outcome = match rule {
            Rule::Remove {
                path,
                ignore_missing,
            } => self.target.remove(
                &resolve_confined(root, path, false)?,
                *ignore_missing || settings.ignore_missing,
            ),
            Rule::Symlink {
                target,
                link,
                overwrite,
            } => self.target.symlink(
                target,
                &resolve_confined(root, link, false)?,
                *overwrite,
            ),
            Rule::WriteFile {
                path,
                content,
                mode,
            } => self
                .target
                .write_file(&resolve_confined(root, path, true)?, content, *mode),
            Rule::AppendLineIfAbsent { path, line } => {
                self.target
                    .append_line(&resolve_confined(root, path, true)?, line, true)
            }
            Rule::AppendLine { path, line } => {
                self.target
                    .append_line(&resolve_confined(root, path, true)?, line, false)
            }
            Rule::MakeDir { path, mode } => self
                .target
                .make_dir(&resolve_confined(root, path, true)?, *mode),
            Rule::CopyFile { source, dest } => self.target.copy_file(
                &resolve_source(&settings.source_dir, source),
                &resolve_confined(root, dest, true)?,
            ),
            Rule::CopyTree { source, dest } => self.target.copy_tree(
                &resolve_source(&settings.source_dir, source),
                &resolve_confined(root, dest, true)?,
            ),
        };

        Ok(outcome)
    }
}

/// Tally of applied rules.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    /// Rules that modified the file system.
    pub changed: usize,

    /// Rules that were already satisfied.
    pub unchanged: usize,
}

impl ApplyReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Changed => self.changed += 1,
            Outcome::Unchanged => self.unchanged += 1,
        }
    }

    /// Total number of rules applied.
    pub fn total(&self) -> usize {
        self.changed + self.unchanged
    }
}

/// Branding application error types.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// A rule failed, aborting the rest of the run.
    #[error("rule #{} failed: {rule}", .index + 1)]
    Rule {
        index: usize,
        rule: String,
        #[source]
        source: TargetError,
    },

    /// A rule path cannot be resolved under the root, or the root is empty.
    #[error(transparent)]
    Path(#[from] PathError),
}

impl ApplyError {
    /// Index of failing rule, if failure came from a rule target.
    pub fn rule_index(&self) -> Option<usize> {
        match self {
            Self::Rule { index, .. } => Some(*index),
            Self::Path(_) => None,
        }
    }

    /// Underlying rule target failure, if any.
    pub fn target_error(&self) -> Option<&TargetError> {
        match self {
            Self::Rule { source, .. } => Some(source),
            Self::Path(_) => None,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = ApplyError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branding::target::{DryRunTarget, ErrorKind};
    use pretty_assertions::assert_eq;
    use std::{fs, path::PathBuf};
    use tempfile::TempDir;

    fn os_release_rules() -> Vec<Rule> {
        vec![
            Rule::Remove {
                path: "/etc/os-release".into(),
                ignore_missing: false,
            },
            Rule::Symlink {
                target: "/etc/catos-os-release".into(),
                link: "/etc/os-release".into(),
                overwrite: false,
            },
            Rule::WriteFile {
                path: "/etc/catos-os-release".into(),
                content: "NAME=\"CatOS\"\n".into(),
                mode: None,
            },
        ]
    }

    #[test]
    fn apply_swaps_os_release() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        fs::create_dir_all(root.path().join("etc"))?;
        fs::write(root.path().join("etc/os-release"), "NAME=\"Arch Linux\"\n")?;

        let report = apply(&os_release_rules(), root.path())?;
        assert_eq!(
            report,
            ApplyReport {
                changed: 3,
                unchanged: 0
            }
        );

        let link = root.path().join("etc/os-release");
        assert!(link.is_symlink());
        assert_eq!(fs::read_link(&link)?, PathBuf::from("/etc/catos-os-release"));
        assert_eq!(
            fs::read_to_string(root.path().join("etc/catos-os-release"))?,
            "NAME=\"CatOS\"\n"
        );

        Ok(())
    }

    #[test]
    fn apply_stops_at_first_failure() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        fs::create_dir_all(root.path().join("etc"))?;

        let result = apply(&os_release_rules(), root.path());
        let error = result.expect_err("stock os-release is missing");
        assert_eq!(error.rule_index(), Some(0));
        assert_eq!(
            error.target_error().map(TargetError::kind),
            Some(ErrorKind::NotFound)
        );
        assert!(!root.path().join("etc/os-release").is_symlink());
        assert!(!root.path().join("etc/catos-os-release").exists());

        Ok(())
    }

    #[test]
    fn apply_honors_global_ignore_missing() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        fs::create_dir_all(root.path().join("etc"))?;

        let mut book = RuleBook::default();
        book.settings.root = TargetRoot::new(root.path());
        book.settings.ignore_missing = true;
        book.rules = os_release_rules();

        let report = Branding::new(book, HostTarget::new()).apply()?;
        assert_eq!(
            report,
            ApplyReport {
                changed: 2,
                unchanged: 1
            }
        );
        assert_eq!(report.total(), 3);

        Ok(())
    }

    #[test]
    fn apply_dedupe_append_twice() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        fs::create_dir_all(root.path().join("etc"))?;
        let rules = [Rule::AppendLineIfAbsent {
            path: "/etc/environment".into(),
            line: "GTK_IM_MODULE=fcitx".into(),
        }];

        apply(&rules, root.path())?;
        let report = apply(&rules, root.path())?;

        assert_eq!(report.unchanged, 1);
        assert_eq!(
            fs::read_to_string(root.path().join("etc/environment"))?,
            "GTK_IM_MODULE=fcitx\n"
        );

        Ok(())
    }

    #[test]
    fn apply_copies_from_source_dir() -> anyhow::Result<()> {
        let source = TempDir::new()?;
        let root = TempDir::new()?;
        fs::create_dir_all(source.path().join("etc/calamares"))?;
        fs::write(
            source.path().join("etc/calamares/settings.conf"),
            "branding: catos\n",
        )?;

        let mut book = RuleBook::default();
        book.settings.root = TargetRoot::new(root.path());
        book.settings.source_dir = source.path().to_path_buf();
        book.rules = vec![Rule::CopyTree {
            source: "etc".into(),
            dest: "/etc".into(),
        }];

        Branding::new(book, HostTarget::new()).apply()?;
        assert_eq!(
            fs::read_to_string(root.path().join("etc/calamares/settings.conf"))?,
            "branding: catos\n"
        );

        Ok(())
    }

    #[test]
    fn apply_rejects_escaping_path() {
        let rules = [Rule::WriteFile {
            path: "/etc/../../escape".into(),
            content: String::new(),
            mode: None,
        }];

        let result = apply(&rules, "/nonexistent/root");
        assert!(matches!(result, Err(ApplyError::Path(_))));
    }

    #[test]
    fn dry_run_counts_every_rule_as_changed() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let mut book = RuleBook::default();
        book.settings.root = TargetRoot::new(root.path());
        book.rules = os_release_rules();

        let report = Branding::new(book, DryRunTarget::new()).apply()?;
        assert_eq!(report.changed, 3);
        assert!(!root.path().join("etc").exists());

        Ok(())
    }

    #[test]
    fn apply_rejects_empty_root() {
        let result = apply(&os_release_rules(), "");
        assert!(matches!(result, Err(ApplyError::Path(PathError::EmptyRoot))));
    }

    #[test]
    fn apply_keeps_host_file_behind_absolute_link() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let host = TempDir::new()?;
        let host_file = host.path().join("os-release");
        fs::write(&host_file, "NAME=\"Host\"\n")?;
        fs::create_dir_all(root.path().join("etc"))?;

        let rules = [
            Rule::Symlink {
                target: host_file.clone(),
                link: "/etc/os-release".into(),
                overwrite: false,
            },
            Rule::WriteFile {
                path: "/etc/os-release".into(),
                content: "NAME=\"CatOS\"\n".into(),
                mode: None,
            },
            Rule::AppendLine {
                path: "/etc/os-release".into(),
                line: "ID=catos".into(),
            },
        ];

        let error = apply(&rules, root.path()).expect_err("link target is not staged");
        assert_eq!(error.rule_index(), Some(1));
        assert_eq!(
            error.target_error().map(TargetError::kind),
            Some(ErrorKind::NotFound)
        );
        assert_eq!(fs::read_to_string(&host_file)?, "NAME=\"Host\"\n");

        // Once the link target exists under the root, writes land there.
        let staged = crate::path::resolve(root.path(), &host_file)?;
        fs::create_dir_all(staged.parent().unwrap_or(root.path()))?;
        apply(&rules[1..], root.path())?;

        assert_eq!(fs::read_to_string(&staged)?, "NAME=\"CatOS\"\nID=catos\n");
        assert_eq!(fs::read_to_string(&host_file)?, "NAME=\"Host\"\n");
        assert_eq!(fs::read_link(root.path().join("etc/os-release"))?, host_file);

        Ok(())
    }

    #[test]
    fn apply_writes_through_link_under_root() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        fs::create_dir_all(root.path().join("etc"))?;
        std::os::unix::fs::symlink(
            "/etc/catos-os-release",
            root.path().join("etc/os-release"),
        )?;

        let rules = [Rule::WriteFile {
            path: "/etc/os-release".into(),
            content: "NAME=\"CatOS\"\n".into(),
            mode: None,
        }];
        apply(&rules, root.path())?;

        assert!(root.path().join("etc/os-release").is_symlink());
        assert_eq!(
            fs::read_to_string(root.path().join("etc/catos-os-release"))?,
            "NAME=\"CatOS\"\n"
        );

        Ok(())
    }
}
