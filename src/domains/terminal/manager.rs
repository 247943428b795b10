use super::engine::{PaneId, TabId, TerminalEngine, TerminalEvent};
use super::split_tree::SplitDirection;
use super::state::WorktreeTerminalState;
use super::TerminalError;
use crate::domains::git::Worktree;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything that mutates terminal sessions goes through one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalCommand {
    EnsureInitialTab { worktree_id: String, focus: bool },
    CreateTab { worktree_id: String, focus: bool },
    SelectTab { worktree_id: String, tab: TabId },
    CloseTab { worktree_id: String, tab: TabId },
    CloseOtherTabs { worktree_id: String, keeping: TabId },
    CloseTabsToRight { worktree_id: String, of: TabId },
    CloseAllTabs { worktree_id: String },
    Split {
        worktree_id: String,
        tab: TabId,
        pane: PaneId,
        direction: SplitDirection,
    },
    ClosePane { worktree_id: String, tab: TabId, pane: PaneId },
    FocusPane { worktree_id: String, tab: TabId, pane: PaneId },
    EqualizeSplits { worktree_id: String, tab: TabId },
    ResizeSplit {
        worktree_id: String,
        tab: TabId,
        pane: PaneId,
        ratio: f32,
    },
    BindingAction { worktree_id: String, action: String },
    SendText { worktree_id: String, text: String },
    Event { worktree_id: String, event: TerminalEvent },
    SetWindowOcclusion { visible: bool, window_is_key: bool },
    RemoveWorktree { worktree_id: String },
    CloseAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome {
    Done,
    TabCreated(TabId),
    PaneCreated(PaneId),
    TabsClosed(Vec<TabId>),
    /// Whether a binding action was handled.
    Handled(bool),
}

/// Owns one session tree per worktree id.
///
/// Lives on the control thread; nothing here blocks or awaits.
pub struct WorktreeTerminalManager {
    engine: Arc<dyn TerminalEngine>,
    states: HashMap<String, WorktreeTerminalState>,
    window_visible: bool,
    window_is_key: bool,
}

impl WorktreeTerminalManager {
    pub fn new(engine: Arc<dyn TerminalEngine>) -> Self {
        Self {
            engine,
            states: HashMap::new(),
            window_visible: true,
            window_is_key: false,
        }
    }

    fn window_active(&self) -> bool {
        self.window_visible || self.window_is_key
    }

    /// Returns the worktree's session state, building it on first use.
    /// `make_initial_input` only runs when the state is built.
    pub fn state<F>(&mut self, worktree: &Worktree, make_initial_input: F) -> &WorktreeTerminalState
    where
        F: FnOnce() -> Option<String>,
    {
        let active = self.window_active();
        let engine = Arc::clone(&self.engine);
        self.states.entry(worktree.id.clone()).or_insert_with(|| {
            log::debug!(
                "[WorktreeTerminalManager] Creating session state for {}",
                worktree.id
            );
            WorktreeTerminalState::new(
                worktree.id.clone(),
                worktree.working_directory.clone(),
                engine,
                make_initial_input(),
                active,
            )
        })
    }

    pub fn state_if_exists(&self, worktree_id: &str) -> Option<&WorktreeTerminalState> {
        self.states.get(worktree_id)
    }

    /// Zero or one; never more.
    pub fn session_count(&self, worktree_id: &str) -> usize {
        usize::from(self.states.contains_key(worktree_id))
    }

    pub fn is_alive(&self, worktree_id: &str) -> bool {
        self.states
            .get(worktree_id)
            .is_some_and(WorktreeTerminalState::is_alive)
    }

    pub fn worktree_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.states.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn state_mut(&mut self, worktree_id: &str) -> Result<&mut WorktreeTerminalState, TerminalError> {
        self.states
            .get_mut(worktree_id)
            .ok_or_else(|| TerminalError::UnknownWorktree(worktree_id.to_string()))
    }

    pub fn apply(&mut self, command: TerminalCommand) -> Result<TerminalOutcome, TerminalError> {
        use TerminalCommand as C;
        use TerminalOutcome as O;

        match command {
            C::EnsureInitialTab { worktree_id, focus } => Ok(self
                .state_mut(&worktree_id)?
                .ensure_initial_tab(focus)?
                .map_or(O::Done, O::TabCreated)),
            C::CreateTab { worktree_id, focus } => self
                .state_mut(&worktree_id)?
                .create_tab(focus)
                .map(O::TabCreated),
            C::SelectTab { worktree_id, tab } => {
                self.state_mut(&worktree_id)?.select_tab(tab)?;
                Ok(O::Done)
            }
            C::CloseTab { worktree_id, tab } => {
                self.state_mut(&worktree_id)?.close_tab(tab)?;
                Ok(O::TabsClosed(vec![tab]))
            }
            C::CloseOtherTabs {
                worktree_id,
                keeping,
            } => self
                .state_mut(&worktree_id)?
                .close_other_tabs(keeping)
                .map(O::TabsClosed),
            C::CloseTabsToRight { worktree_id, of } => self
                .state_mut(&worktree_id)?
                .close_tabs_to_right(of)
                .map(O::TabsClosed),
            C::CloseAllTabs { worktree_id } => Ok(O::TabsClosed(
                self.state_mut(&worktree_id)?.close_all_tabs(),
            )),
            C::Split {
                worktree_id,
                tab,
                pane,
                direction,
            } => self
                .state_mut(&worktree_id)?
                .split(tab, pane, direction)
                .map(O::PaneCreated),
            C::ClosePane {
                worktree_id,
                tab,
                pane,
            } => {
                self.state_mut(&worktree_id)?.close_pane(tab, pane)?;
                Ok(O::Done)
            }
            C::FocusPane {
                worktree_id,
                tab,
                pane,
            } => {
                self.state_mut(&worktree_id)?.focus_pane(tab, pane)?;
                Ok(O::Done)
            }
            C::EqualizeSplits { worktree_id, tab } => {
                self.state_mut(&worktree_id)?.equalize(tab)?;
                Ok(O::Done)
            }
            C::ResizeSplit {
                worktree_id,
                tab,
                pane,
                ratio,
            } => {
                self.state_mut(&worktree_id)?.resize(tab, pane, ratio)?;
                Ok(O::Done)
            }
            C::BindingAction {
                worktree_id,
                action,
            } => self
                .state_mut(&worktree_id)?
                .perform_binding_action(&action)
                .map(O::Handled),
            C::SendText { worktree_id, text } => {
                self.state_mut(&worktree_id)?.send_text(&text)?;
                Ok(O::Done)
            }
            C::Event { worktree_id, event } => {
                self.state_mut(&worktree_id)?.handle_event(event)?;
                Ok(O::Done)
            }
            C::SetWindowOcclusion {
                visible,
                window_is_key,
            } => {
                self.set_window_occlusion(visible, window_is_key);
                Ok(O::Done)
            }
            C::RemoveWorktree { worktree_id } => {
                self.remove(&worktree_id);
                Ok(O::Done)
            }
            C::CloseAll => {
                self.close_all();
                Ok(O::Done)
            }
        }
    }

    /// Engine activity runs while the window is visible or key, for every
    /// worktree, selected or not.
    fn set_window_occlusion(&mut self, visible: bool, window_is_key: bool) {
        let was_active = self.window_active();
        self.window_visible = visible;
        self.window_is_key = window_is_key;
        let active = self.window_active();
        if was_active == active {
            return;
        }
        log::debug!(
            "[WorktreeTerminalManager] {} {} session trees",
            if active { "Resuming" } else { "Suspending" },
            self.states.len()
        );
        for state in self.states.values_mut() {
            state.set_window_active(active);
        }
    }

    /// Surfaces are released before the entry is dropped.
    fn remove(&mut self, worktree_id: &str) {
        let Some(state) = self.states.get_mut(worktree_id) else {
            return;
        };
        state.teardown();
        self.states.remove(worktree_id);
        log::info!("[WorktreeTerminalManager] Removed sessions for {worktree_id}");
    }

    fn close_all(&mut self) {
        for (worktree_id, mut state) in self.states.drain() {
            state.teardown();
            log::debug!("[WorktreeTerminalManager] Closed sessions for {worktree_id}");
        }
    }
}
