use std::{fs, path::PathBuf};

use anyhow::{Context, Result};

use crate::config::DirectoryConfig;

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub logs_dir: PathBuf,
}

pub fn ensure_directories(config: &DirectoryConfig) -> Result<ResolvedPaths> {
    let logs_dir = PathBuf::from(&config.logs_dir);
    fs::create_dir_all(&logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;
    Ok(ResolvedPaths { logs_dir })
}
