pub mod repository_settings;
pub mod service;
pub mod types;

pub use repository_settings::{repository_key, RepositoryLocalStorage, RepositorySettingsStore};
pub use service::{SettingsError, SettingsRepository, SettingsStore};
pub use types::*;
