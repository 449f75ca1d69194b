use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunker::{DEFAULT_OVERLAP, DEFAULT_WINDOW};
use crate::models::OcrMode;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Permanent content-addressed document storage.
    pub documents_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OcrConfig {
    /// Default OCR mode carried in split jobs when the caller does not
    /// override it.
    #[serde(default)]
    pub mode: OcrMode,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.window == 0 {
        anyhow::bail!("chunking.window must be > 0");
    }
    if config.chunking.overlap >= config.chunking.window {
        anyhow::bail!(
            "chunking.overlap ({}) must be smaller than chunking.window ({})",
            config.chunking.overlap,
            config.chunking.window
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("silo.toml");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn minimal_config_uses_chunking_defaults() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "/tmp/silo.sqlite"

[storage]
documents_dir = "/tmp/silo/documents"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.chunking.window, 512);
        assert_eq!(cfg.chunking.overlap, 50);
        assert_eq!(cfg.ocr.mode, OcrMode::Fast);
    }

    #[test]
    fn overlap_must_be_smaller_than_window() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "/tmp/silo.sqlite"

[storage]
documents_dir = "/tmp/silo/documents"

[chunking]
window = 100
overlap = 100
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn ocr_mode_parses() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "/tmp/silo.sqlite"

[storage]
documents_dir = "/tmp/silo/documents"

[ocr]
mode = "accurate"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.ocr.mode, OcrMode::Accurate);
    }
}
