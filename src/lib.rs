// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Declarative branding for CatOS root file systems.
//!
//! Branding a distribution means swapping stock identity files, e.g.,
//! `/etc/os-release`, for custom ones. Catbrand describes each swap as a
//! [`Rule`](rule::Rule), collects rules into a [`RuleBook`](config::RuleBook),
//! and applies them in order against a configurable root through
//! [`Branding`](branding::Branding).

pub mod branding;
pub mod config;
pub mod path;
pub mod profile;
pub mod rule;
