use super::engine::{PaneId, SurfaceConfig, TabId, TerminalEngine, TerminalEvent};
use super::split_tree::{SplitDirection, SplitTree};
use super::tabs::{TerminalTab, TerminalTabManager};
use super::TerminalError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Session tree of one worktree: tabs, their split layouts and the focused
/// pane of each tab. Every pane owns exactly one engine surface.
pub struct WorktreeTerminalState {
    worktree_id: String,
    working_directory: PathBuf,
    engine: Arc<dyn TerminalEngine>,
    tabs: TerminalTabManager,
    trees: HashMap<TabId, SplitTree>,
    focused: HashMap<TabId, PaneId>,
    pending_initial_input: Option<String>,
    window_active: bool,
    created_tabs: usize,
    has_unseen_notification: bool,
}

impl WorktreeTerminalState {
    pub(super) fn new(
        worktree_id: impl Into<String>,
        working_directory: impl Into<PathBuf>,
        engine: Arc<dyn TerminalEngine>,
        initial_input: Option<String>,
        window_active: bool,
    ) -> Self {
        Self {
            worktree_id: worktree_id.into(),
            working_directory: working_directory.into(),
            engine,
            tabs: TerminalTabManager::new(),
            trees: HashMap::new(),
            focused: HashMap::new(),
            pending_initial_input: initial_input.filter(|input| !input.trim().is_empty()),
            window_active,
            created_tabs: 0,
            has_unseen_notification: false,
        }
    }

    pub fn worktree_id(&self) -> &str {
        &self.worktree_id
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn tabs(&self) -> &TerminalTabManager {
        &self.tabs
    }

    pub fn split_tree(&self, tab: TabId) -> Option<&SplitTree> {
        self.trees.get(&tab)
    }

    pub fn focused_pane(&self, tab: TabId) -> Option<PaneId> {
        self.focused.get(&tab).copied()
    }

    pub fn pending_initial_input(&self) -> Option<&str> {
        self.pending_initial_input.as_deref()
    }

    pub fn has_unseen_notification(&self) -> bool {
        self.has_unseen_notification
    }

    pub fn panes(&self) -> Vec<PaneId> {
        self.tabs
            .tabs()
            .iter()
            .filter_map(|tab| self.trees.get(&tab.id))
            .flat_map(SplitTree::panes)
            .collect()
    }

    pub fn pane_count(&self) -> usize {
        self.trees.values().map(SplitTree::pane_count).sum()
    }

    /// True while at least one surface is alive.
    pub fn is_alive(&self) -> bool {
        self.pane_count() > 0
    }

    fn tab_containing(&self, pane: PaneId) -> Option<TabId> {
        self.trees
            .iter()
            .find(|(_, tree)| tree.contains(pane))
            .map(|(tab, _)| *tab)
    }

    fn create_surface(&mut self, initial_input: Option<String>) -> Result<PaneId, TerminalError> {
        let pane = PaneId::new();
        let config = SurfaceConfig {
            working_directory: self.working_directory.clone(),
            initial_input,
        };
        self.engine
            .create_surface(pane, &config)
            .map_err(TerminalError::Engine)?;
        self.engine.set_occlusion(pane, self.window_active);
        Ok(pane)
    }

    pub(super) fn ensure_initial_tab(&mut self, focus: bool) -> Result<Option<TabId>, TerminalError> {
        if !self.tabs.is_empty() {
            return Ok(None);
        }
        self.create_tab(focus).map(Some)
    }

    /// The first tab created after construction receives the pending setup
    /// input. A failed surface keeps it for the next attempt.
    pub(super) fn create_tab(&mut self, focus: bool) -> Result<TabId, TerminalError> {
        let initial_input = self.pending_initial_input.take();
        let pane = match self.create_surface(initial_input.clone()) {
            Ok(pane) => pane,
            Err(err) => {
                self.pending_initial_input = initial_input;
                return Err(err);
            }
        };

        self.created_tabs += 1;
        let previous = self.selected_focus();
        let tab = self
            .tabs
            .push(TerminalTab::new(format!("Terminal {}", self.created_tabs)));
        self.trees.insert(tab, SplitTree::leaf(pane));
        self.focused.insert(tab, pane);
        log::debug!(
            "[WorktreeTerminalState] Created {tab} with {pane} for {}",
            self.worktree_id
        );

        if focus {
            self.move_focus(previous, Some(pane));
        }
        Ok(tab)
    }

    pub(super) fn select_tab(&mut self, tab: TabId) -> Result<(), TerminalError> {
        let previous = self.selected_focus();
        if !self.tabs.select(tab) {
            return Err(TerminalError::UnknownTab(tab));
        }
        self.move_focus(previous, self.focused_pane(tab));
        Ok(())
    }

    pub(super) fn close_tab(&mut self, tab: TabId) -> Result<(), TerminalError> {
        let previous = self.selected_focus();
        self.tabs
            .close_tab(tab)
            .ok_or(TerminalError::UnknownTab(tab))?;
        self.release_tab(tab);
        self.refocus_after_close(previous);
        Ok(())
    }

    pub(super) fn close_other_tabs(&mut self, keeping: TabId) -> Result<Vec<TabId>, TerminalError> {
        if self.tabs.index_of(keeping).is_none() {
            return Err(TerminalError::UnknownTab(keeping));
        }
        let previous = self.selected_focus();
        let closed = self.tabs.close_other_tabs(keeping);
        Ok(self.release_closed(closed, previous))
    }

    pub(super) fn close_tabs_to_right(&mut self, of: TabId) -> Result<Vec<TabId>, TerminalError> {
        if self.tabs.index_of(of).is_none() {
            return Err(TerminalError::UnknownTab(of));
        }
        let previous = self.selected_focus();
        let closed = self.tabs.close_tabs_to_right(of);
        Ok(self.release_closed(closed, previous))
    }

    pub(super) fn close_all_tabs(&mut self) -> Vec<TabId> {
        let closed = self.tabs.close_all();
        self.release_closed(closed, None)
    }

    fn release_closed(&mut self, closed: Vec<TerminalTab>, previous: Option<PaneId>) -> Vec<TabId> {
        let ids: Vec<TabId> = closed.into_iter().map(|tab| tab.id).collect();
        for tab in &ids {
            self.release_tab(*tab);
        }
        self.refocus_after_close(previous);
        ids
    }

    fn release_tab(&mut self, tab: TabId) {
        self.focused.remove(&tab);
        if let Some(tree) = self.trees.remove(&tab) {
            for pane in tree.panes() {
                self.engine.destroy_surface(pane);
            }
        }
    }

    pub(super) fn split(
        &mut self,
        tab: TabId,
        pane: PaneId,
        direction: SplitDirection,
    ) -> Result<PaneId, TerminalError> {
        let contains = self
            .trees
            .get(&tab)
            .ok_or(TerminalError::UnknownTab(tab))?
            .contains(pane);
        if !contains {
            return Err(TerminalError::UnknownPane(pane));
        }

        let new_pane = self.create_surface(None)?;
        if let Some(tree) = self.trees.get_mut(&tab) {
            tree.split(pane, new_pane, direction);
        }
        self.focus_pane(tab, new_pane)?;
        Ok(new_pane)
    }

    /// Destroys the pane's surface. A tab left without panes is closed.
    pub(super) fn close_pane(&mut self, tab: TabId, pane: PaneId) -> Result<(), TerminalError> {
        let tree = self.trees.remove(&tab).ok_or(TerminalError::UnknownTab(tab))?;
        if !tree.contains(pane) {
            self.trees.insert(tab, tree);
            return Err(TerminalError::UnknownPane(pane));
        }
        let fallback = tree.previous_pane(pane).filter(|other| *other != pane);
        self.engine.destroy_surface(pane);

        match tree.remove(pane) {
            Some(remaining) => {
                self.trees.insert(tab, remaining);
                if self.focused_pane(tab) == Some(pane) {
                    self.focused.remove(&tab);
                    if let Some(next) = fallback {
                        self.focus_pane(tab, next)?;
                    }
                }
                Ok(())
            }
            None => {
                let previous = self.selected_focus().filter(|focused| *focused != pane);
                self.focused.remove(&tab);
                self.tabs.close_tab(tab);
                self.refocus_after_close(previous);
                Ok(())
            }
        }
    }

    pub(super) fn focus_pane(&mut self, tab: TabId, pane: PaneId) -> Result<(), TerminalError> {
        let tree = self.trees.get(&tab).ok_or(TerminalError::UnknownTab(tab))?;
        if !tree.contains(pane) {
            return Err(TerminalError::UnknownPane(pane));
        }
        let previous = self.focused.insert(tab, pane);
        if self.tabs.selected() == Some(tab) {
            self.move_focus(previous, Some(pane));
        }
        self.has_unseen_notification = false;
        Ok(())
    }

    pub(super) fn equalize(&mut self, tab: TabId) -> Result<(), TerminalError> {
        self.trees
            .get_mut(&tab)
            .ok_or(TerminalError::UnknownTab(tab))?
            .equalize();
        Ok(())
    }

    pub(super) fn resize(&mut self, tab: TabId, pane: PaneId, ratio: f32) -> Result<(), TerminalError> {
        let tree = self.trees.get_mut(&tab).ok_or(TerminalError::UnknownTab(tab))?;
        if !tree.resize(pane, ratio) {
            return Err(TerminalError::UnknownPane(pane));
        }
        Ok(())
    }

    /// Runs a key-binding action against the focused pane of the selected tab.
    /// Returns false when there is no such pane or the engine ignored it.
    pub(super) fn perform_binding_action(&mut self, action: &str) -> Result<bool, TerminalError> {
        let Some(tab) = self.tabs.selected() else {
            return Ok(false);
        };
        let Some(pane) = self.focused_pane(tab) else {
            return Ok(false);
        };

        if let Some(direction) = action.strip_prefix("new_split:") {
            return match SplitDirection::parse(direction) {
                Some(direction) => self.split(tab, pane, direction).map(|_| true),
                None => Ok(false),
            };
        }

        match action {
            "close_surface" => self.close_pane(tab, pane).map(|_| true),
            "equalize_splits" => self.equalize(tab).map(|_| true),
            "goto_split:next" | "goto_split:previous" => {
                let target = self.trees.get(&tab).and_then(|tree| {
                    if action.ends_with("next") {
                        tree.next_pane(pane)
                    } else {
                        tree.previous_pane(pane)
                    }
                });
                match target {
                    Some(target) => self.focus_pane(tab, target).map(|_| true),
                    None => Ok(false),
                }
            }
            other => self
                .engine
                .perform_action(pane, other)
                .map_err(TerminalError::Engine),
        }
    }

    /// Types `text` into the focused pane of the selected tab, opening a tab
    /// first when there is none.
    pub(super) fn send_text(&mut self, text: &str) -> Result<PaneId, TerminalError> {
        if self.tabs.is_empty() {
            self.create_tab(true)?;
        }
        let pane = self
            .selected_focus()
            .ok_or(TerminalError::NoFocusedPane)?;
        self.engine
            .send_text(pane, text)
            .map_err(TerminalError::Engine)?;
        Ok(pane)
    }

    pub(super) fn handle_event(&mut self, event: TerminalEvent) -> Result<(), TerminalError> {
        let pane = event.pane();
        let tab = self
            .tab_containing(pane)
            .ok_or(TerminalError::UnknownPane(pane))?;

        match event {
            TerminalEvent::SurfaceExited { .. } => {
                log::debug!(
                    "[WorktreeTerminalState] {pane} exited in {}",
                    self.worktree_id
                );
                self.close_pane(tab, pane)?;
            }
            TerminalEvent::TitleChanged { title, .. } => {
                if let Some(tab) = self.tabs.tab_mut(tab) {
                    tab.title = title;
                }
            }
            TerminalEvent::Progress { percent, .. } => {
                if let Some(tab) = self.tabs.tab_mut(tab) {
                    tab.progress = percent.map(|p| p.min(100));
                }
            }
            TerminalEvent::Notification { title, .. } => {
                log::info!(
                    "[WorktreeTerminalState] Notification from {}: {title}",
                    self.worktree_id
                );
                if !(self.window_active && self.selected_focus() == Some(pane)) {
                    self.has_unseen_notification = true;
                }
            }
        }
        Ok(())
    }

    pub(super) fn set_window_active(&mut self, active: bool) {
        if self.window_active == active {
            return;
        }
        self.window_active = active;
        for pane in self.panes() {
            self.engine.set_occlusion(pane, active);
        }
    }

    /// Releases every surface. The state is empty afterwards.
    pub(super) fn teardown(&mut self) {
        let panes = self.panes();
        for pane in &panes {
            self.engine.destroy_surface(*pane);
        }
        self.tabs.close_all();
        self.trees.clear();
        self.focused.clear();
        self.pending_initial_input = None;
        log::debug!(
            "[WorktreeTerminalState] Released {} surfaces for {}",
            panes.len(),
            self.worktree_id
        );
    }

    fn selected_focus(&self) -> Option<PaneId> {
        self.tabs.selected().and_then(|tab| self.focused_pane(tab))
    }

    fn refocus_after_close(&mut self, previous: Option<PaneId>) {
        let current = self.selected_focus();
        if current != previous {
            self.move_focus(previous.filter(|pane| self.tab_containing(*pane).is_some()), current);
        }
    }

    fn move_focus(&self, from: Option<PaneId>, to: Option<PaneId>) {
        if from == to {
            return;
        }
        if let Some(from) = from {
            self.engine.set_focus(from, false);
        }
        if let Some(to) = to {
            self.engine.set_focus(to, true);
        }
    }
}
