//! File helpers for the CLI: requirements input, YAML state files, generated units

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use archgen_sdk::{log_file_saved, log_state_file, log_warning};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::pipeline::types::{GeneratedUnit, RequirementSet};

/// Read requirements from a YAML list, or one requirement per line.
///
/// Blank lines, `#` comments and leading list bullets are ignored in the
/// line format.
pub fn load_requirements(path: &Path) -> Result<RequirementSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read requirements file: {}", path.display()))?;
    Ok(parse_requirements(&content))
}

pub fn parse_requirements(content: &str) -> RequirementSet {
    if let Ok(items) = serde_yaml::from_str::<Vec<String>>(content) {
        return RequirementSet::new(items);
    }

    RequirementSet::new(
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#'))
            .map(|line| line.trim_start_matches(['-', '*']).trim()),
    )
}

/// Serialize `value` to a YAML state file and announce it
pub fn save_yaml<T: Serialize>(path: &Path, value: &T, phase: usize, description: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let yaml = serde_yaml::to_string(value).context("Failed to serialize state file")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write state file: {}", path.display()))?;

    log_file_saved!(path.display());
    log_state_file!(phase, path.display(), description);
    Ok(())
}

pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse state file: {}", path.display()))
}

/// `root` joined with a unit path, refusing paths that escape `root`
pub fn unit_output_path(root: &Path, unit_path: &str) -> Result<PathBuf> {
    let relative = Path::new(unit_path);
    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => bail!("Refusing to write unit outside the output directory: {}", unit_path),
        }
    }
    if clean.as_os_str().is_empty() {
        bail!("Unit has an empty path");
    }
    Ok(root.join(clean))
}

/// Write every unit under `root`; returns the written paths.
///
/// Chapters without an extension get `.md`.
pub fn write_units(root: &Path, units: &[GeneratedUnit]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(units.len());
    for unit in units {
        let mut path = unit_output_path(root, &unit.path)?;
        if unit.language == "markdown" && path.extension().is_none() {
            path.set_extension("md");
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(&path, &unit.content)
            .with_context(|| format!("Failed to write unit: {}", path.display()))?;

        if unit.possibly_incomplete {
            log_warning!("{} may be incomplete (continuation limit reached)", unit.path);
        }
        written.push(path);
    }
    Ok(written)
}
