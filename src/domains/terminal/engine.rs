use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TabId(Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// Identifies one pane and the engine surface it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaneId(Uuid);

impl PaneId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PaneId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pane-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceConfig {
    pub working_directory: PathBuf,
    /// Typed into the shell once it is ready.
    pub initial_input: Option<String>,
}

/// The embedded terminal engine. Rendering and PTY handling live behind this
/// boundary; the session manager only creates, drives and releases surfaces.
#[cfg_attr(test, mockall::automock)]
pub trait TerminalEngine: Send + Sync {
    fn create_surface(&self, pane: PaneId, config: &SurfaceConfig) -> Result<(), String>;
    fn destroy_surface(&self, pane: PaneId);
    fn send_text(&self, pane: PaneId, text: &str) -> Result<(), String>;
    /// Returns whether the engine recognised the action.
    fn perform_action(&self, pane: PaneId, action: &str) -> Result<bool, String>;
    /// `visible == false` pauses rendering and wake-ups; the child process keeps running.
    fn set_occlusion(&self, pane: PaneId, visible: bool);
    fn set_focus(&self, pane: PaneId, focused: bool);
}

/// Callbacks raised by the engine for a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    SurfaceExited {
        pane: PaneId,
    },
    TitleChanged {
        pane: PaneId,
        title: String,
    },
    /// `None` clears the indicator.
    Progress {
        pane: PaneId,
        percent: Option<u8>,
    },
    Notification {
        pane: PaneId,
        title: String,
        body: String,
    },
}

impl TerminalEvent {
    pub fn pane(&self) -> PaneId {
        match self {
            TerminalEvent::SurfaceExited { pane }
            | TerminalEvent::TitleChanged { pane, .. }
            | TerminalEvent::Progress { pane, .. }
            | TerminalEvent::Notification { pane, .. } => *pane,
        }
    }
}
