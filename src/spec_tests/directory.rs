//! Loading hand-authored test suites from a directory
//!
//! A suite directory holds `*.wdl` files and, optionally, a sidecar JSON
//! array (`test_config.json` by default) with one config object per test
//! case. Each object names its file with `path`; several objects may share
//! one file with different targets. Files no object names get their
//! defaults from the file name alone.

use super::config::{merge, ExtractConfig, UnitSource};
use super::naming::resolve_name;
use super::suite::{SuiteBuilder, TestSuite};
use super::test_case::JsonMap;
use crate::error::{IoContext, Location, SpecTestError, SpecTestResult};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `*.wdl` files directly inside `dir`, sorted by name
pub fn list_wdl_files(dir: &Path) -> SpecTestResult<Vec<PathBuf>> {
    let root = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = Path::new(&root).join("*.wdl");
    let pattern = pattern.to_string_lossy();
    let paths = glob::glob(&pattern).map_err(|e| SpecTestError::Io {
        location: Location::document(dir.display().to_string()),
        message: format!("Invalid directory pattern {}: {}", pattern, e),
        source: io::Error::new(io::ErrorKind::InvalidInput, e.to_string()),
    })?;

    let mut files = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| {
            let path = e.path().display().to_string();
            SpecTestError::Io {
                location: Location::document(path.clone()),
                message: format!("Failed to read {}", path),
                source: e.into(),
            }
        })?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_sidecar(path: &Path) -> SpecTestResult<Vec<JsonMap>> {
    let contents = fs::read_to_string(path).io_context("Failed to read", path)?;
    serde_json::from_str::<Vec<JsonMap>>(&contents).map_err(|e| {
        SpecTestError::invalid_config(
            Location::document(path.display().to_string()),
            file_name(path),
            format!("expected an array of config objects: {}", e),
        )
    })
}

/// Load and validate the suite in `dir`. Propagation is left to the caller.
pub fn load_suite_dir(dir: &Path, config: &ExtractConfig) -> SpecTestResult<TestSuite> {
    let document = dir.display().to_string();
    let data_dir = config.data_dir.clone().or_else(|| {
        let default = dir.join("data");
        default.is_dir().then_some(default)
    });
    let mut builder = SuiteBuilder::new(document.clone())
        .with_expected_version(config.expected_version.clone())
        .with_data_dir(data_dir);

    let sidecar = dir.join(&config.sidecar_name);
    let entries = if sidecar.is_file() {
        read_sidecar(&sidecar)?
    } else {
        Vec::new()
    };

    let mut configured: HashSet<String> = HashSet::new();
    for (index, entry) in entries.iter().enumerate() {
        let location = Location::document(format!("{}[{}]", sidecar.display(), index));
        let relative = match entry.get("path") {
            Some(serde_json::Value::String(path)) => path.clone(),
            _ => {
                return Err(SpecTestError::invalid_config(
                    location,
                    format!("entry {}", index),
                    "sidecar entry has no string 'path'",
                ))
            }
        };
        let full = dir.join(&relative);
        let code = fs::read_to_string(&full).io_context("Failed to read", &full)?;
        let name = file_name(&full);
        configured.insert(name.clone());

        let unit = UnitSource {
            name: name.clone(),
            path: relative,
            code,
            input: None,
            output: None,
            location,
        };
        builder.push(merge(unit, resolve_name(&name), Some(entry), &config.defaults)?);
    }

    for path in list_wdl_files(dir)? {
        let name = file_name(&path);
        if configured.contains(&name) {
            continue;
        }
        debug!(file = %path.display(), "no sidecar entry, using naming defaults");
        let code = fs::read_to_string(&path).io_context("Failed to read", &path)?;
        let unit = UnitSource {
            name: name.clone(),
            path: name.clone(),
            code,
            input: None,
            output: None,
            location: Location::document(path.display().to_string()),
        };
        builder.push(merge(unit, resolve_name(&name), None, &config.defaults)?);
    }

    builder.build()
}
