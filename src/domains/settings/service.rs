use super::types::{GlobalSettings, SettingsFile};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("No settings stored at {}", .0.display())]
    Missing(PathBuf),
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Settings I/O task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Runs storage I/O on the blocking pool so held async locks never stall a
/// runtime worker.
pub(crate) async fn run_blocking<T: Send + 'static>(
    work: impl FnOnce() -> Result<T, SettingsError> + Send + 'static,
) -> Result<T, SettingsError> {
    tokio::task::spawn_blocking(work).await?
}

pub trait SettingsRepository: Send + Sync {
    fn load(&self) -> Result<SettingsFile, SettingsError>;
    fn save(&self, settings: &SettingsFile) -> Result<(), SettingsError>;
}

/// Global settings document guarded by an async lock. Every mutation goes
/// through [`SettingsStore::update`], which persists before releasing the lock.
pub struct SettingsStore {
    repository: Arc<dyn SettingsRepository>,
    settings: tokio::sync::Mutex<SettingsFile>,
}

impl SettingsStore {
    /// Loads the document; a missing or unreadable one is replaced by defaults on disk.
    pub fn load(repository: Arc<dyn SettingsRepository>) -> Self {
        let settings = match repository.load() {
            Ok(settings) => settings,
            Err(err) => {
                if !matches!(err, SettingsError::Missing(_)) {
                    log::warn!("Unable to load settings, using defaults: {err}");
                }
                let defaults = SettingsFile::default();
                if let Err(save_err) = repository.save(&defaults) {
                    log::error!("Failed to write default settings: {save_err}");
                }
                defaults
            }
        };

        Self {
            repository,
            settings: tokio::sync::Mutex::new(settings),
        }
    }

    pub async fn snapshot(&self) -> SettingsFile {
        self.settings.lock().await.clone()
    }

    pub async fn global(&self) -> GlobalSettings {
        self.settings.lock().await.global.clone()
    }

    /// Read-modify-write under the lock. The in-memory copy only changes when the
    /// write succeeds.
    pub async fn update<T>(
        &self,
        mutate: impl FnOnce(&mut SettingsFile) -> T,
    ) -> Result<T, SettingsError> {
        let mut guard = self.settings.lock().await;
        let mut next = guard.clone();
        let result = mutate(&mut next);
        if next != *guard {
            let repository = Arc::clone(&self.repository);
            *guard = run_blocking(move || repository.save(&next).map(|()| next)).await?;
        }
        Ok(result)
    }

    pub async fn set_global(&self, global: GlobalSettings) -> Result<(), SettingsError> {
        self.update(|file| file.global = global).await
    }

    pub async fn set_repository_roots(&self, roots: Vec<String>) -> Result<(), SettingsError> {
        self.update(|file| file.repository_roots = roots).await
    }

    pub async fn pin_worktree(&self, id: &str) -> Result<(), SettingsError> {
        self.update(|file| {
            if !file.pinned_worktree_ids.iter().any(|existing| existing == id) {
                file.pinned_worktree_ids.push(id.to_string());
            }
        })
        .await
    }

    pub async fn unpin_worktree(&self, id: &str) -> Result<(), SettingsError> {
        self.update(|file| file.pinned_worktree_ids.retain(|existing| existing != id))
            .await
    }

    pub async fn set_last_focused_worktree(&self, id: Option<String>) -> Result<(), SettingsError> {
        self.update(|file| file.last_focused_worktree_id = id).await
    }
}
