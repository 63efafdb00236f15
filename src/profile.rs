// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Built-in rule books.
//!
//! CatOS ships two rule books with the binary itself, so a package build hook
//! can brand or stage a root without carrying any extra files around:
//!
//! - `catos` swaps stock identity files, logo pixmaps, input method
//!   environment, and mirror list for CatOS ones.
//! - `calamares-config` copies the installer's `etc/` and `usr/` trees from
//!   `$srcdir` into `$pkgdir`.

use crate::config::{ConfigError, RuleBook};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

const CATOS: &str = include_str!("../profiles/catos.toml");
const CALAMARES_CONFIG: &str = include_str!("../profiles/calamares-config.toml");

/// Rule book embedded into the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Distribution branding.
    CatOs,

    /// Calamares configuration staging.
    CalamaresConfig,
}

impl Profile {
    /// Every built-in profile.
    pub const ALL: [Profile; 2] = [Profile::CatOs, Profile::CalamaresConfig];

    /// Name used to select profile.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CatOs => "catos",
            Self::CalamaresConfig => "calamares-config",
        }
    }

    /// Raw TOML source of profile.
    pub fn source(&self) -> &'static str {
        match self {
            Self::CatOs => CATOS,
            Self::CalamaresConfig => CALAMARES_CONFIG,
        }
    }

    /// Parse profile into rule book.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError`] if profile fails to parse, or if its settings
    ///   reference environment variables that cannot be expanded.
    pub fn book(&self) -> Result<RuleBook, ConfigError> {
        self.source().parse()
    }
}

impl Display for Profile {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.name())
    }
}

impl FromStr for Profile {
    type Err = UnknownProfile;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|profile| profile.name() == name)
            .ok_or_else(|| UnknownProfile(name.into()))
    }
}

/// No built-in profile goes by given name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown profile {0:?}, expected one of: catos, calamares-config")]
pub struct UnknownProfile(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::path::Path;

    #[test]
    fn select_profile_by_name() {
        assert_eq!("catos".parse::<Profile>(), Ok(Profile::CatOs));
        assert_eq!(
            "calamares-config".parse::<Profile>(),
            Ok(Profile::CalamaresConfig)
        );
        assert_eq!(
            "arch".parse::<Profile>(),
            Err(UnknownProfile("arch".into()))
        );
    }

    #[test]
    fn catos_profile_brands_identity_files() -> anyhow::Result<()> {
        let book = Profile::CatOs.book()?;
        assert_eq!(book.settings.root.as_path(), Path::new("/"));

        let os_release = book
            .rules
            .iter()
            .find_map(|rule| match rule {
                Rule::WriteFile { path, content, .. }
                    if path == Path::new("/etc/catos-os-release") =>
                {
                    Some(content.as_str())
                }
                _ => None,
            })
            .expect("os-release content");
        assert!(os_release.starts_with("NAME=\"CatOS\"\n"));
        assert!(os_release.ends_with("\n\n"));

        let issue = book.rules.iter().find_map(|rule| match rule {
            Rule::WriteFile { path, content, .. } if path == Path::new("/etc/catos-issue") => {
                Some(content.as_str())
            }
            _ => None,
        });
        assert_eq!(issue, Some("CatOS \\r (\\l)\n\n"));

        let symlinks = book
            .rules
            .iter()
            .filter(|rule| matches!(rule, Rule::Symlink { .. }))
            .count();
        assert_eq!(symlinks, 8);

        Ok(())
    }

    #[test]
    fn catos_profile_keeps_mirror_variables_literal() -> anyhow::Result<()> {
        let book = Profile::CatOs.book()?;
        let mirror = book.rules.iter().find_map(|rule| match rule {
            Rule::AppendLine { path, line } if path == Path::new("/etc/pacman.d/mirrorlist") => {
                Some(line.as_str())
            }
            _ => None,
        });

        assert_eq!(
            mirror,
            Some("Server = https://mirrors.tuna.tsinghua.edu.cn/archlinux/$repo/os/$arch")
        );

        Ok(())
    }

    #[sealed_test(env = [("pkgdir", "/build/pkg"), ("srcdir", "/build/src")])]
    fn calamares_profile_targets_package_dir() -> anyhow::Result<()> {
        let book = Profile::CalamaresConfig.book()?;
        assert_eq!(book.settings.root.as_path(), Path::new("/build/pkg"));
        assert_eq!(book.settings.source_dir.as_path(), Path::new("/build/src"));
        assert_eq!(
            book.rules,
            vec![
                Rule::CopyTree {
                    source: "etc".into(),
                    dest: "/etc".into(),
                },
                Rule::CopyTree {
                    source: "usr".into(),
                    dest: "/usr".into(),
                },
            ]
        );

        Ok(())
    }
}
