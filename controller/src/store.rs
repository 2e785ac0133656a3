use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use anyhow::Context;
use tokio::sync::Mutex;

use boiler_common::BoilerConfig;

/// Persists the configured boiler entry as `config.json` under the data dir.
#[derive(Clone)]
pub struct ConfigStore {
    config_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        let data_dir = std::env::var("BOILER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.boiler"));
        Self::at(data_dir)
    }

    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_path: Arc::new(data_dir.into().join("config.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load(&self) -> anyhow::Result<BoilerConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.config_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<BoilerConfig>(&raw).with_context(|| {
                format!("invalid boiler config at {}", self.config_path.display())
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BoilerConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save(&self, config: &BoilerConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.config_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(config)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

/// Environment variables win over the stored file.
pub fn apply_env_overrides(config: &mut BoilerConfig) {
    if let Ok(host) = std::env::var("BOILER_HOST") {
        config.host = host;
    }
    if let Ok(entry_id) = std::env::var("BOILER_ENTRY_ID") {
        config.entry_id = entry_id;
    }
    if let Some(port) = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        config.http_port = port;
    }
}
