//! Current working configuration, persisted as plain text in a file

use std::path::{Path, PathBuf};

use tracing::debug;

use cfgship_common::{Result, WORKING_CFG_FILE};

/// File holding the name of the configuration commands default to
#[derive(Clone, Debug)]
pub struct WorkingConfigFile {
    path: PathBuf,
}

impl Default for WorkingConfigFile {
    fn default() -> Self {
        Self::new(WORKING_CFG_FILE)
    }
}

impl WorkingConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The default working file inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(WORKING_CFG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recorded configuration name, if any
    pub async fn read(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let name = contents.trim();
                Ok((!name.is_empty()).then(|| name.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write(&self, cfg_name: &str) -> Result<()> {
        tokio::fs::write(&self.path, cfg_name.as_bytes()).await?;
        debug!(path = %self.path.display(), cfg = %cfg_name, "Working configuration recorded");
        Ok(())
    }
}
