//! `ako ci`: scaffold a CI configuration.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use dialoguer::Select;

/// Workflow name the templates are written under.
const WORKFLOW_NAME: &str = "merge";

const GITHUB_ACTIONS_WORKFLOW: &str = r#"name: "Code Analysis"

on:
  pull_request:
  push:
    paths:
      - '**.rs'
      - '**/Cargo.toml'
      - 'Cargo.lock'

permissions:
  contents: read

jobs:
  test:
    name: "Run Tests"
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - uses: dtolnay/rust-toolchain@stable
      - run: cargo test --workspace
  clippy:
    name: "Run Clippy"
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - uses: dtolnay/rust-toolchain@stable
        with:
          components: clippy
      - run: cargo clippy --workspace -- -D warnings
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiTemplate {
    GithubActions,
    None,
}

impl CiTemplate {
    /// All templates, sorted by name.
    pub const ALL: [CiTemplate; 2] = [CiTemplate::GithubActions, CiTemplate::None];

    pub fn name(&self) -> &'static str {
        match self {
            CiTemplate::GithubActions => "github actions",
            CiTemplate::None => "none",
        }
    }
}

impl fmt::Display for CiTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid ci template: {0} (expected one of: github actions, none)")]
pub struct UnknownTemplate(String);

impl FromStr for CiTemplate {
    type Err = UnknownTemplate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        CiTemplate::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownTemplate(name.to_string()))
    }
}

/// Ask which template to use.
pub fn select_template() -> anyhow::Result<CiTemplate> {
    let names: Vec<&str> = CiTemplate::ALL.iter().map(CiTemplate::name).collect();
    let index = Select::new()
        .with_prompt("Select the preferred CI tool")
        .items(&names)
        .default(0)
        .interact()
        .context("template selection aborted")?;
    Ok(CiTemplate::ALL[index])
}

/// Write `template` under `root`. Returns the file written, if any.
pub fn create(template: CiTemplate, root: &Path) -> anyhow::Result<Option<PathBuf>> {
    let path = match template {
        CiTemplate::None => {
            tracing::debug!("no CI template selected");
            return Ok(None);
        }
        CiTemplate::GithubActions => root
            .join(".github")
            .join("workflows")
            .join(format!("{WORKFLOW_NAME}.yml")),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, GITHUB_ACTIONS_WORKFLOW)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(Some(path))
}
