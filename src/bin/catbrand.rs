// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use catbrand::{
    branding::{
        target::{DryRunTarget, HostTarget},
        Branding,
    },
    config::{RuleBook, TargetRoot},
    profile::Profile,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  catbrand [options] <catbrand-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Apply(opts) => run_apply(opts),
            Command::Check(opts) => run_check(opts),
            Command::Show(opts) => run_show(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Apply rule book against target root.
    #[command(override_usage = "catbrand apply [options] (<rule_book> | --profile <name>)")]
    Apply(ApplyOptions),

    /// Parse and validate rule book without applying it.
    #[command(override_usage = "catbrand check <rule_book>")]
    Check(CheckOptions),

    /// Show rules of rule book in order.
    #[command(override_usage = "catbrand show [options] (<rule_book> | --profile <name>)")]
    Show(ShowOptions),
}

#[derive(Args, Clone, Debug)]
#[group(required = true, multiple = false)]
struct BookSelection {
    /// Path to rule book file.
    #[arg(value_name = "rule_book")]
    pub rule_book: Option<PathBuf>,

    /// Use built-in rule book instead: catos, calamares-config.
    #[arg(short, long, value_name = "name")]
    pub profile: Option<Profile>,
}

impl BookSelection {
    fn load(&self) -> Result<RuleBook> {
        if let Some(profile) = self.profile {
            return profile
                .book()
                .with_context(|| format!("failed to load built-in profile {profile}"));
        }

        // INVARIANT: clap group guarantees exactly one selection.
        let path = self.rule_book.as_ref().context("no rule book selected")?;
        RuleBook::load(path).with_context(|| format!("failed to load {}", path.display()))
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ApplyOptions {
    #[command(flatten)]
    pub selection: BookSelection,

    /// Root to apply rules against, overriding rule book setting.
    #[arg(short, long, value_name = "path")]
    pub root: Option<PathBuf>,

    /// Directory copy rules take sources from, overriding rule book setting.
    #[arg(short, long, value_name = "path")]
    pub source_dir: Option<PathBuf>,

    /// Treat missing paths of remove rules as success.
    #[arg(short, long)]
    pub ignore_missing: bool,

    /// Report what would be done without touching anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CheckOptions {
    /// Path to rule book file.
    #[arg(required = true, value_name = "rule_book")]
    pub rule_book: PathBuf,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ShowOptions {
    #[command(flatten)]
    pub selection: BookSelection,

    /// Print rule book as TOML instead of a numbered listing.
    #[arg(short, long)]
    pub toml: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_apply(opts: ApplyOptions) -> Result<()> {
    let mut book = opts.selection.load()?;
    if let Some(root) = opts.root {
        book.settings.root = TargetRoot::try_new(root)?;
    }
    if let Some(source_dir) = opts.source_dir {
        book.settings.source_dir = source_dir;
    }
    if opts.ignore_missing {
        book.settings.ignore_missing = true;
    }

    let report = if opts.dry_run {
        Branding::new(book, DryRunTarget::new()).apply()?
    } else {
        Branding::new(book, HostTarget::new()).apply()?
    };
    info!("applied {} rules", report.total());

    Ok(())
}

fn run_check(opts: CheckOptions) -> Result<()> {
    let book = RuleBook::load(&opts.rule_book)
        .with_context(|| format!("failed to load {}", opts.rule_book.display()))?;
    info!(
        "{} is valid: {} rules against {}",
        opts.rule_book.display(),
        book.rules.len(),
        book.settings.root
    );

    Ok(())
}

fn run_show(opts: ShowOptions) -> Result<()> {
    let book = opts.selection.load()?;
    if opts.toml {
        print!("{book}");
        return Ok(());
    }

    if !book.settings.description.is_empty() {
        println!("# {}", book.settings.description);
    }
    for (index, rule) in book.rules.iter().enumerate() {
        println!("{:>3}. {rule}", index + 1);
    }

    Ok(())
}
