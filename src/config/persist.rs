//! Configuration persistence using toml_edit to preserve formatting and comments.

use super::{Config, RootConfig, ScanConfig};
use anyhow::{Context, Result};
use std::path::Path;
use toml_edit::DocumentMut;

/// Save the entire config to a TOML file
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    let new_content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config")?;
    let new_doc: DocumentMut = new_content
        .parse()
        .with_context(|| "Failed to parse serialized config")?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
    }

    std::fs::write(path, new_doc.to_string())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}

/// Replace one top-level item of an existing config file, keeping the rest of
/// the document (comments included) untouched.
fn update_section<T: serde::Serialize>(path: &Path, key: &str, wrapper: &T) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut doc: DocumentMut = content
        .parse()
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    let section_toml =
        toml::to_string(wrapper).with_context(|| format!("Failed to serialize {}", key))?;
    let section_doc: DocumentMut = section_toml
        .parse()
        .with_context(|| format!("Failed to parse serialized {}", key))?;

    if let Some(item) = section_doc.get(key) {
        doc[key] = item.clone();
    } else {
        doc.remove(key);
    }

    std::fs::write(path, doc.to_string())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}

/// Update just the roots section of the config file
pub fn update_roots(path: &Path, roots: &[RootConfig]) -> Result<()> {
    update_section(
        path,
        "roots",
        &RootsWrapper {
            roots: roots.to_vec(),
        },
    )
}

/// Update just the scan tunables of the config file
pub fn update_scan(path: &Path, scan: &ScanConfig) -> Result<()> {
    update_section(path, "scan", &ScanWrapper { scan: scan.clone() })
}

#[derive(serde::Serialize)]
struct RootsWrapper {
    roots: Vec<RootConfig>,
}

#[derive(serde::Serialize)]
struct ScanWrapper {
    scan: ScanConfig,
}
