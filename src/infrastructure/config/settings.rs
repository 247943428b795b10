use crate::domains::settings::{
    RepositoryLocalStorage, SettingsError, SettingsFile, SettingsRepository,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

fn io_error(path: &Path, source: io::Error) -> SettingsError {
    if source.kind() == io::ErrorKind::NotFound {
        SettingsError::Missing(path.to_path_buf())
    } else {
        SettingsError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Writes through a sibling temp file so a crash never leaves half a document.
fn write_atomically(path: &Path, data: &[u8]) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data).map_err(|e| io_error(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| io_error(path, e))
}

pub struct FileSettingsRepository {
    settings_path: PathBuf,
}

impl FileSettingsRepository {
    pub fn new(settings_path: PathBuf) -> Self {
        Self { settings_path }
    }
}

impl SettingsRepository for FileSettingsRepository {
    fn load(&self) -> Result<SettingsFile, SettingsError> {
        let contents =
            fs::read_to_string(&self.settings_path).map_err(|e| io_error(&self.settings_path, e))?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, settings: &SettingsFile) -> Result<(), SettingsError> {
        let contents = serde_json::to_vec_pretty(settings)?;
        log::debug!(
            "Saving settings to {} ({} bytes)",
            self.settings_path.display(),
            contents.len()
        );
        write_atomically(&self.settings_path, &contents).inspect_err(|e| {
            log::error!("Failed to write settings: {e}");
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct FileRepositoryLocalStorage;

impl RepositoryLocalStorage for FileRepositoryLocalStorage {
    fn load(&self, path: &Path) -> Result<Vec<u8>, SettingsError> {
        fs::read(path).map_err(|e| io_error(path, e))
    }

    fn save(&self, path: &Path, data: &[u8]) -> Result<(), SettingsError> {
        write_atomically(path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::settings::{GlobalSettings, SettingsStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn missing_file_reports_missing() {
        let tmp = TempDir::new().unwrap();
        let repository = FileSettingsRepository::new(tmp.path().join("settings.json"));
        assert!(matches!(repository.load(), Err(SettingsError::Missing(_))));
    }

    #[test]
    fn save_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/settings.json");
        let repository = FileSettingsRepository::new(path.clone());

        let mut settings = SettingsFile::default();
        settings.repository_roots.push("/tmp/repo".to_string());
        repository.save(&settings).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(repository.load().unwrap(), settings);
    }

    #[tokio::test]
    async fn corrupt_file_is_replaced_with_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, "{ not valid").unwrap();

        let store = SettingsStore::load(Arc::new(FileSettingsRepository::new(path.clone())));
        assert_eq!(store.global().await, GlobalSettings::default());

        let rewritten: SettingsFile =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(rewritten, SettingsFile::default());
    }

    #[test]
    fn local_storage_round_trips_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("repo/app/treedeck.json");
        let storage = FileRepositoryLocalStorage;

        assert!(matches!(storage.load(&path), Err(SettingsError::Missing(_))));
        storage.save(&path, b"{}").unwrap();
        assert_eq!(storage.load(&path).unwrap(), b"{}".to_vec());
    }
}
