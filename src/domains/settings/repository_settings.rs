use super::service::{run_blocking, SettingsError, SettingsStore};
use super::types::RepositorySettings;
use crate::infrastructure::config::AppPaths;
use std::path::Path;
use std::sync::Arc;

/// Raw byte storage for repository-scoped settings files.
pub trait RepositoryLocalStorage: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<u8>, SettingsError>;
    fn save(&self, path: &Path, data: &[u8]) -> Result<(), SettingsError>;
}

/// Key used for a repository in the global document.
pub fn repository_key(root: &Path) -> String {
    root.to_string_lossy().trim_end_matches('/').to_string()
}

/// Per-repository settings. The repository-local file wins; a legacy entry in
/// the global document is moved into the local file the first time it is read.
pub struct RepositorySettingsStore {
    paths: AppPaths,
    storage: Arc<dyn RepositoryLocalStorage>,
    global: Arc<SettingsStore>,
    lock: tokio::sync::Mutex<()>,
}

impl RepositorySettingsStore {
    pub fn new(
        paths: AppPaths,
        storage: Arc<dyn RepositoryLocalStorage>,
        global: Arc<SettingsStore>,
    ) -> Self {
        Self {
            paths,
            storage,
            global,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn load(&self, root: &Path) -> Result<RepositorySettings, SettingsError> {
        let _guard = self.lock.lock().await;
        self.load_locked(root).await
    }

    pub async fn save(
        &self,
        root: &Path,
        settings: &RepositorySettings,
    ) -> Result<(), SettingsError> {
        let _guard = self.lock.lock().await;
        self.write_local(root, settings).await
    }

    pub async fn update(
        &self,
        root: &Path,
        mutate: impl FnOnce(&mut RepositorySettings),
    ) -> Result<RepositorySettings, SettingsError> {
        let _guard = self.lock.lock().await;
        let mut settings = self.load_locked(root).await?;
        mutate(&mut settings);
        self.write_local(root, &settings).await?;
        Ok(settings)
    }

    async fn load_locked(&self, root: &Path) -> Result<RepositorySettings, SettingsError> {
        let local_path = self.paths.repository_settings_file(root);
        let storage = Arc::clone(&self.storage);
        let read_path = local_path.clone();
        match run_blocking(move || storage.load(&read_path)).await {
            Ok(data) => match serde_json::from_slice::<RepositorySettings>(&data) {
                Ok(settings) => return Ok(settings),
                Err(err) => log::warn!(
                    "Unable to decode repository settings at {}: {err}; falling back to global settings",
                    local_path.display()
                ),
            },
            Err(SettingsError::Missing(_)) => {}
            Err(err) => log::warn!("{err}; falling back to global settings"),
        }

        let key = repository_key(root);
        let legacy = self.global.snapshot().await.repositories.get(&key).cloned();
        let settings = legacy.clone().unwrap_or_default();
        self.write_local(root, &settings).await?;

        if legacy.is_some() {
            log::info!("Migrated settings for {key} into {}", local_path.display());
            self.global
                .update(|file| {
                    file.repositories.remove(&key);
                })
                .await?;
        }
        Ok(settings)
    }

    async fn write_local(
        &self,
        root: &Path,
        settings: &RepositorySettings,
    ) -> Result<(), SettingsError> {
        let data = serde_json::to_vec_pretty(settings)?;
        let path = self.paths.repository_settings_file(root);
        let storage = Arc::clone(&self.storage);
        run_blocking(move || storage.save(&path, &data)).await
    }
}
