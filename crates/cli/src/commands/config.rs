// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use crate::config::Config;
use crate::error::Result;

pub fn run(config: &Config, source: Option<&Path>) -> Result<()> {
    print!("{}", render(config, source)?);
    Ok(())
}

/// The effective configuration, headed by where it came from.
pub(crate) fn render(config: &Config, source: Option<&Path>) -> Result<String> {
    let origin = match source {
        Some(path) => format!("# loaded from {}\n", path.display()),
        None => "# built-in defaults\n".to_string(),
    };
    Ok(format!("{}{}", origin, config.to_toml()?))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
