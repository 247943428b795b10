use super::engine::TabId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalTab {
    pub id: TabId,
    pub title: String,
    pub progress: Option<u8>,
}

impl TerminalTab {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: TabId::new(),
            title: title.into(),
            progress: None,
        }
    }
}

/// Ordered tab strip with a single selection.
///
/// Bulk closes resolve the anchor tab's index when they run, so they stay
/// correct when the strip changed between the user's click and the call.
#[derive(Debug, Default)]
pub struct TerminalTabManager {
    tabs: Vec<TerminalTab>,
    selected: Option<TabId>,
}

impl TerminalTabManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tabs(&self) -> &[TerminalTab] {
        &self.tabs
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn selected(&self) -> Option<TabId> {
        self.selected
    }

    pub fn index_of(&self, id: TabId) -> Option<usize> {
        self.tabs.iter().position(|tab| tab.id == id)
    }

    pub fn tab(&self, id: TabId) -> Option<&TerminalTab> {
        self.tabs.iter().find(|tab| tab.id == id)
    }

    pub fn tab_mut(&mut self, id: TabId) -> Option<&mut TerminalTab> {
        self.tabs.iter_mut().find(|tab| tab.id == id)
    }

    /// Appends and selects.
    pub fn push(&mut self, tab: TerminalTab) -> TabId {
        let id = tab.id;
        self.tabs.push(tab);
        self.selected = Some(id);
        id
    }

    pub fn select(&mut self, id: TabId) -> bool {
        if self.index_of(id).is_none() {
            return false;
        }
        self.selected = Some(id);
        true
    }

    /// Closing the selected tab selects its right neighbour, else its left one.
    pub fn close_tab(&mut self, id: TabId) -> Option<TerminalTab> {
        let index = self.index_of(id)?;
        let removed = self.tabs.remove(index);
        if self.selected == Some(id) {
            self.selected = self
                .tabs
                .get(index)
                .or_else(|| index.checked_sub(1).and_then(|left| self.tabs.get(left)))
                .map(|tab| tab.id);
        }
        Some(removed)
    }

    pub fn close_other_tabs(&mut self, keeping: TabId) -> Vec<TerminalTab> {
        if self.index_of(keeping).is_none() {
            return Vec::new();
        }
        let (kept, closed): (Vec<_>, Vec<_>) =
            self.tabs.drain(..).partition(|tab| tab.id == keeping);
        self.tabs = kept;
        self.selected = Some(keeping);
        closed
    }

    pub fn close_tabs_to_right(&mut self, of: TabId) -> Vec<TerminalTab> {
        let Some(index) = self.index_of(of) else {
            return Vec::new();
        };
        let closed: Vec<TerminalTab> = self.tabs.drain(index + 1..).collect();
        if self
            .selected
            .is_some_and(|selected| closed.iter().any(|tab| tab.id == selected))
        {
            self.selected = Some(of);
        }
        closed
    }

    pub fn close_all(&mut self) -> Vec<TerminalTab> {
        self.selected = None;
        std::mem::take(&mut self.tabs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(count: usize) -> (TerminalTabManager, Vec<TabId>) {
        let mut manager = TerminalTabManager::new();
        let ids = (0..count)
            .map(|i| manager.push(TerminalTab::new(format!("Terminal {}", i + 1))))
            .collect();
        (manager, ids)
    }

    fn tab_ids(tabs: &[TerminalTab]) -> Vec<TabId> {
        tabs.iter().map(|tab| tab.id).collect()
    }

    #[test]
    fn push_selects_new_tab() {
        let (manager, ids) = strip(2);
        assert_eq!(manager.selected(), Some(ids[1]));
    }

    #[test]
    fn closing_selected_tab_prefers_right_neighbour() {
        let (mut manager, ids) = strip(3);
        manager.select(ids[1]);

        manager.close_tab(ids[1]);
        assert_eq!(manager.selected(), Some(ids[2]));

        manager.close_tab(ids[2]);
        assert_eq!(manager.selected(), Some(ids[0]));

        manager.close_tab(ids[0]);
        assert_eq!(manager.selected(), None);
        assert!(manager.is_empty());
    }

    #[test]
    fn closing_unselected_tab_keeps_selection() {
        let (mut manager, ids) = strip(3);
        manager.close_tab(ids[0]);
        assert_eq!(manager.selected(), Some(ids[2]));
        assert!(manager.close_tab(ids[0]).is_none());
    }

    #[test]
    fn close_others_uses_current_position() {
        let (mut manager, ids) = strip(4);
        manager.close_tab(ids[0]);

        let closed = manager.close_other_tabs(ids[2]);
        assert_eq!(tab_ids(&closed), vec![ids[1], ids[3]]);
        assert_eq!(tab_ids(manager.tabs()), vec![ids[2]]);
        assert_eq!(manager.selected(), Some(ids[2]));
    }

    #[test]
    fn close_to_right_reresolves_index() {
        let (mut manager, ids) = strip(5);
        manager.close_tab(ids[0]);
        manager.close_tab(ids[1]);

        let closed = manager.close_tabs_to_right(ids[2]);
        assert_eq!(tab_ids(&closed), vec![ids[3], ids[4]]);
        assert_eq!(tab_ids(manager.tabs()), vec![ids[2]]);
        assert_eq!(manager.selected(), Some(ids[2]));
    }

    #[test]
    fn close_to_right_keeps_selection_on_left() {
        let (mut manager, ids) = strip(3);
        manager.select(ids[0]);
        manager.close_tabs_to_right(ids[1]);
        assert_eq!(manager.selected(), Some(ids[0]));
    }

    #[test]
    fn bulk_closes_with_unknown_anchor_do_nothing() {
        let (mut manager, _) = strip(2);
        assert!(manager.close_other_tabs(TabId::new()).is_empty());
        assert!(manager.close_tabs_to_right(TabId::new()).is_empty());
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn close_all_clears_selection() {
        let (mut manager, _) = strip(3);
        assert_eq!(manager.close_all().len(), 3);
        assert_eq!(manager.selected(), None);
    }
}
