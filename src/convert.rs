use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;

#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, raw_path: &Path, json_path: &Path) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct Grib2JsonConverter {
    bin: PathBuf,
}

impl Grib2JsonConverter {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.converter_bin.clone())
    }

    fn command_args(raw_path: &Path, json_path: &Path) -> Vec<OsString> {
        vec![
            "--data".into(),
            "--output".into(),
            json_path.as_os_str().to_owned(),
            "--names".into(),
            "--compact".into(),
            raw_path.as_os_str().to_owned(),
        ]
    }
}

#[async_trait]
impl Converter for Grib2JsonConverter {
    async fn convert(&self, raw_path: &Path, json_path: &Path) -> Result<()> {
        debug!(
            "Converting {} -> {}",
            raw_path.display(),
            json_path.display()
        );
        let output = Command::new(&self.bin)
            .args(Self::command_args(raw_path, json_path))
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.bin.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} exited with {}: {}",
                self.bin.display(),
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}
