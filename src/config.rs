// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of rule book files to simplify the process of
//! serialization and deserialization. Reading a rule book from disk is offered
//! as a convenience, but the applier itself only ever sees parsed data.

use crate::rule::{InvalidRule, Rule};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Rule book layout.
///
/// A __rule book__ is an ordered listing of branding rules along with the
/// settings needed to apply them, e.g., which root to apply them against.
///
/// # General Layout
///
/// A rule book is composed of two basic parts: settings and rules. The
/// settings section describes where the rules should be applied. The rule
/// section is an array of tables, each tagged with a `kind` field, applied
/// strictly in the order they are written.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct RuleBook {
    /// Settings for the rule book.
    #[serde(default)]
    pub settings: RuleBookSettings,

    /// Ordered listing of rules.
    #[serde(rename = "rule", default)]
    pub rules: Vec<Rule>,
}

impl RuleBook {
    /// Read and parse rule book from file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return any parse error from [`RuleBook::from_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_to_string(path.as_ref())
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.as_ref().to_path_buf(),
            })?
            .parse()
    }
}

impl FromStr for RuleBook {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut book: RuleBook = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on root and source directory only.
        //   - Rule content is literal, "$repo" in a mirror list must survive.
        book.settings.root = TargetRoot::try_new(expand(book.settings.root.as_path())?)?;
        book.settings.source_dir = expand(&book.settings.source_dir)?;

        for (index, rule) in book.rules.iter().enumerate() {
            rule.validate()
                .map_err(|reason| ConfigError::InvalidRule { index, reason })?;
        }

        Ok(book)
    }
}

impl Display for RuleBook {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Rule book settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuleBookSettings {
    /// Brief description of what the rule book brands.
    pub description: String,

    /// Root file system to apply rules against.
    pub root: TargetRoot,

    /// Directory that copy rules take their sources from.
    pub source_dir: PathBuf,

    /// Treat missing paths of every remove rule as success.
    pub ignore_missing: bool,
}

impl Default for RuleBookSettings {
    fn default() -> Self {
        Self {
            description: String::new(),
            root: TargetRoot::default(),
            source_dir: PathBuf::from("."),
            ignore_missing: false,
        }
    }
}

/// Root directory that rule paths resolve under.
///
/// Defaults to `/`, i.e., branding the running system. Point it at a staging
/// directory for chroot-style builds.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct TargetRoot(PathBuf);

impl TargetRoot {
    /// Construct new target root.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Construct new target root, rejecting an empty path.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::EmptyRoot`] if path is empty.
    pub fn try_new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRoot);
        }

        Ok(Self(path))
    }

    /// Treat target root as [`Path`] slice.
    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }
}

impl Default for TargetRoot {
    fn default() -> Self {
        Self(PathBuf::from("/"))
    }
}

impl Display for TargetRoot {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_path().to_string_lossy().as_ref())
    }
}

fn expand(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Target root is empty after shell expansion.
    #[error("target root cannot be empty")]
    EmptyRoot,

    /// Rule failed validation.
    #[error("rule #{} is invalid", .index + 1)]
    InvalidRule {
        index: usize,
        #[source]
        reason: InvalidRule,
    },

    /// Rule book file cannot be read.
    #[error("failed to read rule book at {:?}", .path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
