use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where document bytes live. The namespace prefix is opaque to the core;
/// by convention it is the proctor's tenant identifier.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub fs: Option<FsStorageConfig>,
    pub s3: Option<S3StorageConfig>,
}

fn default_backend() -> String {
    "fs".to_string()
}
fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FsStorageConfig {
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3StorageConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_max_tokens() -> u32 {
    500
}
fn default_temperature() -> f64 {
    0.7
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    /// Single recognition language passed to tesseract (`-l`).
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    /// Bound on concurrent page recognitions.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm_path: PathBuf,
    #[serde(default = "default_tesseract")]
    pub tesseract_path: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            dpi: default_dpi(),
            max_concurrent: default_max_concurrent(),
            pdftoppm_path: default_pdftoppm(),
            tesseract_path: default_tesseract(),
        }
    }
}

fn default_language() -> String {
    "eng".to_string()
}
fn default_dpi() -> u32 {
    300
}
fn default_max_concurrent() -> usize {
    2
}
fn default_pdftoppm() -> PathBuf {
    PathBuf::from("pdftoppm")
}
fn default_tesseract() -> PathBuf {
    PathBuf::from("tesseract")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    match config.storage.backend.as_str() {
        "fs" => {
            if config.storage.fs.is_none() {
                anyhow::bail!("[storage.fs] section required when backend is 'fs'");
            }
        }
        "s3" => {
            if config.storage.s3.is_none() {
                anyhow::bail!("[storage.s3] section required when backend is 's3'");
            }
        }
        other => anyhow::bail!("Unknown storage backend: '{}'. Must be fs or s3.", other),
    }

    match config.model.provider.as_str() {
        "openai" => {}
        other => anyhow::bail!("Unknown model provider: '{}'. Must be openai.", other),
    }

    if config.model.max_tokens == 0 {
        anyhow::bail!("model.max_tokens must be > 0");
    }
    if !(0.0..=2.0).contains(&config.model.temperature) {
        anyhow::bail!("model.temperature must be in [0.0, 2.0]");
    }
    if config.ocr.dpi == 0 {
        anyhow::bail!("ocr.dpi must be > 0");
    }
    if config.ocr.max_concurrent == 0 {
        anyhow::bail!("ocr.max_concurrent must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tutor.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn minimal_fs_config_loads_with_defaults() {
        let (_dir, path) = write_config(
            r#"
[db]
path = "data/tutor.sqlite"

[storage]
backend = "fs"

[storage.fs]
root = "data/docs"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.model.model, "gpt-4o");
        assert_eq!(config.model.max_tokens, 500);
        assert_eq!(config.ocr.language, "eng");
        assert_eq!(config.storage.namespace, "default");
    }

    #[test]
    fn s3_backend_requires_s3_section() {
        let (_dir, path) = write_config(
            r#"
[db]
path = "data/tutor.sqlite"

[storage]
backend = "s3"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let (_dir, path) = write_config(
            r#"
[db]
path = "data/tutor.sqlite"

[storage]
backend = "gcs"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn zero_max_tokens_is_rejected() {
        let (_dir, path) = write_config(
            r#"
[db]
path = "data/tutor.sqlite"

[storage]
backend = "fs"

[storage.fs]
root = "data/docs"

[model]
max_tokens = 0
"#,
        );
        assert!(load_config(&path).is_err());
    }
}
