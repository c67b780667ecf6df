use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::sync::Mutex;

use hvac_group_common::{PersistedSettings, RuntimeConfig};

const DEFAULT_DATA_DIR: &str = "./.hvac-group";
const RUNTIME_FILE: &str = "runtime.json";

/// JSON file store for the group definition and the user's settings.
#[derive(Clone)]
pub struct SettingsStore {
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl SettingsStore {
    /// Uses `HVAC_GROUP_DATA_DIR` when set.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("HVAC_GROUP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));
        Self::new(data_dir)
    }

    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.as_ref().join(RUNTIME_FILE)),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn runtime_path(&self) -> &Path {
        &self.runtime_path
    }

    pub async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        self.read_runtime().await
    }

    pub async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        self.write_runtime(runtime).await
    }

    /// Replaces only the settings section, leaving the rest of the file intact.
    pub async fn save_settings(&self, settings: &PersistedSettings) -> anyhow::Result<()> {
        self.update_runtime(|runtime| runtime.settings = settings.clone())
            .await
    }

    /// Read-modify-write of the stored file under the store lock.
    pub async fn update_runtime(
        &self,
        apply: impl FnOnce(&mut RuntimeConfig),
    ) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut runtime = self.read_runtime().await?;
        apply(&mut runtime);
        self.write_runtime(&runtime).await
    }

    async fn read_runtime(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_runtime(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let path = self.runtime_path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}
