use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// On-disk declaration of how to construct a component.
///
/// ```toml
/// entry = "basic"              # factory name in the catalog
/// provides = "memory_network"  # optional guard against misplaced files
/// display_name = "Memory Network"
///
/// [settings]
/// label = "memory"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComponentManifest {
    /// Factory entry point. When absent, the definition's aliases are tried.
    #[serde(default)]
    pub entry: Option<String>,
    /// Component id this manifest is meant for.
    #[serde(default)]
    pub provides: Option<String>,
    /// Optional human-readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Factory-specific settings.
    #[serde(default)]
    pub settings: toml::Table,
    /// File the manifest was read from.
    #[serde(skip)]
    pub source: PathBuf,
}

impl ComponentManifest {
    /// Reads and parses a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        let mut manifest: Self =
            toml::from_str(&raw).with_context(|| format!("parsing manifest {}", path.display()))?;
        manifest.source = path.to_path_buf();
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_manifest_with_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory_network.toml");
        fs::write(
            &path,
            "entry = \"basic\"\nprovides = \"memory_network\"\n[settings]\nlabel = \"mem\"\n",
        )
        .unwrap();
        let manifest = ComponentManifest::load(&path).unwrap();
        assert_eq!(manifest.entry.as_deref(), Some("basic"));
        assert_eq!(manifest.provides.as_deref(), Some("memory_network"));
        assert_eq!(manifest.settings["label"].as_str(), Some("mem"));
        assert_eq!(manifest.source, path);
    }

    #[test]
    fn empty_manifest_is_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        fs::write(&path, "").unwrap();
        let manifest = ComponentManifest::load(&path).unwrap();
        assert!(manifest.entry.is_none());
        assert!(manifest.settings.is_empty());
    }

    #[test]
    fn malformed_manifest_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "entry = [unterminated").unwrap();
        let err = ComponentManifest::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.toml"));
    }
}
