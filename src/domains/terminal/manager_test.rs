use super::engine::{MockTerminalEngine, PaneId, SurfaceConfig, TerminalEvent};
use super::manager::{TerminalCommand, TerminalOutcome, WorktreeTerminalManager};
use super::split_tree::{SplitDirection, SplitTree};
use super::TerminalError;
use crate::domains::git::Worktree;
use mockall::Sequence;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

type Calls<T> = Arc<Mutex<Vec<T>>>;

/// Everything the mock engine was asked to do, in order.
#[derive(Default, Clone)]
struct EngineLog {
    created: Calls<(PaneId, SurfaceConfig)>,
    destroyed: Calls<PaneId>,
    sent: Calls<(PaneId, String)>,
    actions: Calls<(PaneId, String)>,
    occlusion: Calls<(PaneId, bool)>,
    focus: Calls<(PaneId, bool)>,
}

impl EngineLog {
    fn created(&self) -> Vec<(PaneId, SurfaceConfig)> {
        self.created.lock().unwrap().clone()
    }

    fn destroyed(&self) -> Vec<PaneId> {
        self.destroyed.lock().unwrap().clone()
    }

    fn sent(&self) -> Vec<(PaneId, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn actions(&self) -> Vec<(PaneId, String)> {
        self.actions.lock().unwrap().clone()
    }

    fn occlusion(&self) -> Vec<(PaneId, bool)> {
        self.occlusion.lock().unwrap().clone()
    }

    fn focus(&self) -> Vec<(PaneId, bool)> {
        self.focus.lock().unwrap().clone()
    }
}

fn expect_passive_calls(engine: &mut MockTerminalEngine, log: &EngineLog) {
    let destroyed = log.destroyed.clone();
    engine
        .expect_destroy_surface()
        .returning(move |pane| destroyed.lock().unwrap().push(pane));
    let sent = log.sent.clone();
    engine.expect_send_text().returning(move |pane, text| {
        sent.lock().unwrap().push((pane, text.to_string()));
        Ok(())
    });
    let actions = log.actions.clone();
    engine.expect_perform_action().returning(move |pane, action| {
        actions.lock().unwrap().push((pane, action.to_string()));
        Ok(true)
    });
    let occlusion = log.occlusion.clone();
    engine
        .expect_set_occlusion()
        .returning(move |pane, visible| occlusion.lock().unwrap().push((pane, visible)));
    let focus = log.focus.clone();
    engine
        .expect_set_focus()
        .returning(move |pane, focused| focus.lock().unwrap().push((pane, focused)));
}

fn recording_engine(log: &EngineLog) -> MockTerminalEngine {
    let mut engine = MockTerminalEngine::new();
    let created = log.created.clone();
    engine.expect_create_surface().returning(move |pane, config| {
        created.lock().unwrap().push((pane, config.clone()));
        Ok(())
    });
    expect_passive_calls(&mut engine, log);
    engine
}

fn manager_with_log() -> (WorktreeTerminalManager, EngineLog) {
    let log = EngineLog::default();
    let manager = WorktreeTerminalManager::new(Arc::new(recording_engine(&log)));
    (manager, log)
}

fn worktree(name: &str) -> Worktree {
    let path = PathBuf::from(format!("/tmp/treedeck/repos/app/{name}"));
    Worktree {
        id: path.to_string_lossy().into_owned(),
        name: name.to_string(),
        detail: name.to_string(),
        working_directory: path,
        repository_root: PathBuf::from("/tmp/app"),
        created_at: None,
    }
}

fn open_tab(manager: &mut WorktreeTerminalManager, worktree: &Worktree) -> super::TabId {
    match assert_ok!(manager.apply(TerminalCommand::CreateTab {
        worktree_id: worktree.id.clone(),
        focus: true,
    })) {
        TerminalOutcome::TabCreated(tab) => tab,
        other => panic!("expected a new tab, got {other:?}"),
    }
}

fn selected_pane(manager: &WorktreeTerminalManager, worktree: &Worktree) -> PaneId {
    let state = manager.state_if_exists(&worktree.id).unwrap();
    let tab = state.tabs().selected().unwrap();
    state.focused_pane(tab).unwrap()
}

fn binding(manager: &mut WorktreeTerminalManager, worktree: &Worktree, action: &str) -> TerminalOutcome {
    assert_ok!(manager.apply(TerminalCommand::BindingAction {
        worktree_id: worktree.id.clone(),
        action: action.to_string(),
    }))
}

#[test]
fn state_is_built_once_and_thunk_runs_once() {
    let (mut manager, _) = manager_with_log();
    let otter = worktree("otter");
    let mut thunk_calls = 0;

    manager.state(&otter, || {
        thunk_calls += 1;
        Some("npm install".to_string())
    });
    manager.state(&otter, || {
        thunk_calls += 1;
        Some("ignored".to_string())
    });

    assert_eq!(thunk_calls, 1);
    assert_eq!(manager.session_count(&otter.id), 1);
    assert_eq!(
        manager.state_if_exists(&otter.id).unwrap().pending_initial_input(),
        Some("npm install")
    );
}

#[test]
fn setup_input_is_consumed_by_first_tab_only() {
    let (mut manager, log) = manager_with_log();
    let otter = worktree("otter");
    manager.state(&otter, || Some("./setup.sh".to_string()));

    let first = assert_ok!(manager.apply(TerminalCommand::EnsureInitialTab {
        worktree_id: otter.id.clone(),
        focus: true,
    }));
    assert!(matches!(first, TerminalOutcome::TabCreated(_)));
    let again = assert_ok!(manager.apply(TerminalCommand::EnsureInitialTab {
        worktree_id: otter.id.clone(),
        focus: true,
    }));
    assert_eq!(again, TerminalOutcome::Done);
    open_tab(&mut manager, &otter);

    let created = log.created();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].1.initial_input.as_deref(), Some("./setup.sh"));
    assert_eq!(created[0].1.working_directory, otter.working_directory);
    assert_eq!(created[1].1.initial_input, None);
    assert_eq!(
        manager.state_if_exists(&otter.id).unwrap().pending_initial_input(),
        None
    );
}

#[test]
fn blank_setup_input_is_dropped() {
    let (mut manager, log) = manager_with_log();
    let otter = worktree("otter");
    manager.state(&otter, || Some("  \n".to_string()));
    open_tab(&mut manager, &otter);
    assert_eq!(log.created()[0].1.initial_input, None);
}

#[test]
fn failed_surface_keeps_setup_input_for_retry() {
    let log = EngineLog::default();
    let mut engine = MockTerminalEngine::new();
    let mut seq = Sequence::new();
    engine
        .expect_create_surface()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err("no renderer".to_string()));
    let created = log.created.clone();
    engine
        .expect_create_surface()
        .times(1)
        .in_sequence(&mut seq)
        .returning(move |pane, config| {
            created.lock().unwrap().push((pane, config.clone()));
            Ok(())
        });
    expect_passive_calls(&mut engine, &log);

    let mut manager = WorktreeTerminalManager::new(Arc::new(engine));
    let otter = worktree("otter");
    manager.state(&otter, || Some("make".to_string()));

    let err = assert_err!(manager.apply(TerminalCommand::CreateTab {
        worktree_id: otter.id.clone(),
        focus: true,
    }));
    assert_eq!(err, TerminalError::Engine("no renderer".to_string()));
    assert!(!manager.is_alive(&otter.id));

    open_tab(&mut manager, &otter);
    assert_eq!(log.created()[0].1.initial_input.as_deref(), Some("make"));
}

#[test]
fn removing_worktree_releases_every_surface_then_the_entry() {
    let (mut manager, log) = manager_with_log();
    let otter = worktree("otter");
    manager.state(&otter, || None);
    open_tab(&mut manager, &otter);
    binding(&mut manager, &otter, "new_split:right");
    open_tab(&mut manager, &otter);

    let panes = manager.state_if_exists(&otter.id).unwrap().panes();
    assert_eq!(panes.len(), 3);
    assert!(manager.is_alive(&otter.id));

    assert_ok!(manager.apply(TerminalCommand::RemoveWorktree {
        worktree_id: otter.id.clone(),
    }));

    let mut destroyed = log.destroyed();
    destroyed.sort();
    let mut expected = panes;
    expected.sort();
    assert_eq!(destroyed, expected);
    assert_eq!(manager.session_count(&otter.id), 0);
    assert!(!manager.is_alive(&otter.id));
    assert!(manager.state_if_exists(&otter.id).is_none());
}

#[test]
fn commands_for_unknown_worktree_fail() {
    let (mut manager, _) = manager_with_log();
    let err = assert_err!(manager.apply(TerminalCommand::CloseAllTabs {
        worktree_id: "/nowhere".to_string(),
    }));
    assert_eq!(err, TerminalError::UnknownWorktree("/nowhere".to_string()));

    assert_ok!(manager.apply(TerminalCommand::RemoveWorktree {
        worktree_id: "/nowhere".to_string(),
    }));
}

#[test]
fn split_bindings_build_the_tree_and_move_focus() {
    let (mut manager, log) = manager_with_log();
    let otter = worktree("otter");
    manager.state(&otter, || None);
    let tab = open_tab(&mut manager, &otter);
    let first = selected_pane(&manager, &otter);

    assert_eq!(
        binding(&mut manager, &otter, "new_split:down"),
        TerminalOutcome::Handled(true)
    );
    let second = selected_pane(&manager, &otter);
    assert_ne!(first, second);
    assert!(log.focus().ends_with(&[(first, false), (second, true)]));

    binding(&mut manager, &otter, "new_split:left");
    let third = selected_pane(&manager, &otter);

    let state = manager.state_if_exists(&otter.id).unwrap();
    assert_eq!(state.split_tree(tab).unwrap().panes(), vec![first, third, second]);

    binding(&mut manager, &otter, "goto_split:next");
    assert_eq!(selected_pane(&manager, &otter), second);
    binding(&mut manager, &otter, "goto_split:previous");
    assert_eq!(selected_pane(&manager, &otter), third);

    assert_eq!(
        binding(&mut manager, &otter, "new_split:sideways"),
        TerminalOutcome::Handled(false)
    );
}

#[test]
fn close_surface_collapses_tree_then_closes_tab() {
    let (mut manager, log) = manager_with_log();
    let otter = worktree("otter");
    manager.state(&otter, || None);
    let tab = open_tab(&mut manager, &otter);
    let first = selected_pane(&manager, &otter);
    binding(&mut manager, &otter, "new_split:right");
    let second = selected_pane(&manager, &otter);

    binding(&mut manager, &otter, "close_surface");
    let state = manager.state_if_exists(&otter.id).unwrap();
    assert_eq!(state.split_tree(tab), Some(&SplitTree::Leaf(first)));
    assert_eq!(selected_pane(&manager, &otter), first);

    binding(&mut manager, &otter, "close_surface");
    let state = manager.state_if_exists(&otter.id).unwrap();
    assert!(state.tabs().is_empty());
    assert_eq!(log.destroyed(), vec![second, first]);
    assert_eq!(
        binding(&mut manager, &otter, "close_surface"),
        TerminalOutcome::Handled(false)
    );
}

#[test]
fn unknown_actions_are_forwarded_to_the_engine() {
    let (mut manager, log) = manager_with_log();
    let otter = worktree("otter");
    manager.state(&otter, || None);
    open_tab(&mut manager, &otter);
    let pane = selected_pane(&manager, &otter);

    assert_eq!(
        binding(&mut manager, &otter, "toggle_fullscreen"),
        TerminalOutcome::Handled(true)
    );
    assert_eq!(log.actions(), vec![(pane, "toggle_fullscreen".to_string())]);
}

#[test]
fn surface_exit_closes_tab_and_selects_right_neighbour() {
    let (mut manager, log) = manager_with_log();
    let otter = worktree("otter");
    manager.state(&otter, || None);
    let left = open_tab(&mut manager, &otter);
    let middle = open_tab(&mut manager, &otter);
    let right = open_tab(&mut manager, &otter);
    assert_ok!(manager.apply(TerminalCommand::SelectTab {
        worktree_id: otter.id.clone(),
        tab: middle,
    }));
    let exiting = selected_pane(&manager, &otter);

    assert_ok!(manager.apply(TerminalCommand::Event {
        worktree_id: otter.id.clone(),
        event: TerminalEvent::SurfaceExited { pane: exiting },
    }));

    let state = manager.state_if_exists(&otter.id).unwrap();
    let remaining: Vec<_> = state.tabs().tabs().iter().map(|tab| tab.id).collect();
    assert_eq!(remaining, vec![left, right]);
    assert_eq!(state.tabs().selected(), Some(right));
    assert_eq!(log.destroyed(), vec![exiting]);

    let right_pane = state.focused_pane(right).unwrap();
    assert_eq!(log.focus().last(), Some(&(right_pane, true)));
}

#[test]
fn close_tabs_to_right_and_others() {
    let (mut manager, log) = manager_with_log();
    let otter = worktree("otter");
    manager.state(&otter, || None);
    let tabs: Vec<_> = (0..4).map(|_| open_tab(&mut manager, &otter)).collect();

    let closed = assert_ok!(manager.apply(TerminalCommand::CloseTabsToRight {
        worktree_id: otter.id.clone(),
        of: tabs[1],
    }));
    assert_eq!(closed, TerminalOutcome::TabsClosed(vec![tabs[2], tabs[3]]));
    assert_eq!(log.destroyed().len(), 2);

    let closed = assert_ok!(manager.apply(TerminalCommand::CloseOtherTabs {
        worktree_id: otter.id.clone(),
        keeping: tabs[1],
    }));
    assert_eq!(closed, TerminalOutcome::TabsClosed(vec![tabs[0]]));

    let err = assert_err!(manager.apply(TerminalCommand::CloseTab {
        worktree_id: otter.id.clone(),
        tab: tabs[3],
    }));
    assert_eq!(err, TerminalError::UnknownTab(tabs[3]));

    let closed = assert_ok!(manager.apply(TerminalCommand::CloseAllTabs {
        worktree_id: otter.id.clone(),
    }));
    assert_eq!(closed, TerminalOutcome::TabsClosed(vec![tabs[1]]));
    assert_eq!(log.destroyed().len(), 4);
    assert_eq!(manager.session_count(&otter.id), 1);
    assert!(!manager.is_alive(&otter.id));
}

#[test]
fn occlusion_follows_window_visibility_for_every_worktree() {
    let (mut manager, log) = manager_with_log();
    let otter = worktree("otter");
    let heron = worktree("heron");
    manager.state(&otter, || None);
    manager.state(&heron, || None);
    open_tab(&mut manager, &otter);
    open_tab(&mut manager, &heron);
    let otter_pane = selected_pane(&manager, &otter);
    let heron_pane = selected_pane(&manager, &heron);
    log.occlusion.lock().unwrap().clear();

    let occlude = |visible, window_is_key| TerminalCommand::SetWindowOcclusion {
        visible,
        window_is_key,
    };

    assert_ok!(manager.apply(occlude(false, false)));
    let mut suspended = log.occlusion();
    suspended.sort();
    let mut expected = vec![(otter_pane, false), (heron_pane, false)];
    expected.sort();
    assert_eq!(suspended, expected);

    // Still inactive: nothing re-sent.
    assert_ok!(manager.apply(occlude(false, false)));
    assert_eq!(log.occlusion().len(), 2);

    // Key but occluded still counts as active.
    assert_ok!(manager.apply(occlude(false, true)));
    assert_eq!(log.occlusion().len(), 4);
    assert!(log.occlusion()[2..].iter().all(|(_, visible)| *visible));

    assert_ok!(manager.apply(occlude(false, false)));
    let extra = open_tab(&mut manager, &otter);
    let extra_pane = manager
        .state_if_exists(&otter.id)
        .unwrap()
        .focused_pane(extra)
        .unwrap();
    assert_eq!(log.occlusion().last(), Some(&(extra_pane, false)));
}

#[test]
fn send_text_opens_a_tab_when_needed() {
    let (mut manager, log) = manager_with_log();
    let otter = worktree("otter");
    manager.state(&otter, || None);

    assert_ok!(manager.apply(TerminalCommand::SendText {
        worktree_id: otter.id.clone(),
        text: "cargo run\n".to_string(),
    }));

    let pane = selected_pane(&manager, &otter);
    assert_eq!(log.created().len(), 1);
    assert_eq!(log.sent(), vec![(pane, "cargo run\n".to_string())]);
}

#[test]
fn title_progress_and_notification_events() {
    let (mut manager, _) = manager_with_log();
    let otter = worktree("otter");
    manager.state(&otter, || None);
    let tab = open_tab(&mut manager, &otter);
    let pane = selected_pane(&manager, &otter);
    let event = |event| TerminalCommand::Event {
        worktree_id: otter.id.clone(),
        event,
    };

    assert_ok!(manager.apply(event(TerminalEvent::TitleChanged {
        pane,
        title: "vim".to_string(),
    })));
    assert_ok!(manager.apply(event(TerminalEvent::Progress {
        pane,
        percent: Some(140),
    })));
    let state = manager.state_if_exists(&otter.id).unwrap();
    let tab_state = state.tabs().tab(tab).unwrap();
    assert_eq!(tab_state.title, "vim");
    assert_eq!(tab_state.progress, Some(100));

    assert_ok!(manager.apply(TerminalCommand::SetWindowOcclusion {
        visible: false,
        window_is_key: false,
    }));
    assert_ok!(manager.apply(event(TerminalEvent::Notification {
        pane,
        title: "Build finished".to_string(),
        body: String::new(),
    })));
    assert!(manager
        .state_if_exists(&otter.id)
        .unwrap()
        .has_unseen_notification());

    assert_ok!(manager.apply(TerminalCommand::FocusPane {
        worktree_id: otter.id.clone(),
        tab,
        pane,
    }));
    assert!(!manager
        .state_if_exists(&otter.id)
        .unwrap()
        .has_unseen_notification());

    let err = assert_err!(manager.apply(event(TerminalEvent::SurfaceExited {
        pane: PaneId::new(),
    })));
    assert!(matches!(err, TerminalError::UnknownPane(_)));
}

#[test]
fn explicit_split_and_resize_commands() {
    let (mut manager, _) = manager_with_log();
    let otter = worktree("otter");
    manager.state(&otter, || None);
    let tab = open_tab(&mut manager, &otter);
    let pane = selected_pane(&manager, &otter);

    let outcome = assert_ok!(manager.apply(TerminalCommand::Split {
        worktree_id: otter.id.clone(),
        tab,
        pane,
        direction: SplitDirection::Right,
    }));
    let TerminalOutcome::PaneCreated(new_pane) = outcome else {
        panic!("expected a new pane");
    };

    assert_ok!(manager.apply(TerminalCommand::ResizeSplit {
        worktree_id: otter.id.clone(),
        tab,
        pane: new_pane,
        ratio: 0.7,
    }));
    assert_ok!(manager.apply(TerminalCommand::EqualizeSplits {
        worktree_id: otter.id.clone(),
        tab,
    }));
    let err = assert_err!(manager.apply(TerminalCommand::Split {
        worktree_id: otter.id.clone(),
        tab,
        pane: PaneId::new(),
        direction: SplitDirection::Down,
    }));
    assert!(matches!(err, TerminalError::UnknownPane(_)));
}

#[test]
fn close_all_tears_down_every_worktree() {
    let (mut manager, log) = manager_with_log();
    for name in ["otter", "heron"] {
        let worktree = worktree(name);
        manager.state(&worktree, || None);
        open_tab(&mut manager, &worktree);
    }

    assert_ok!(manager.apply(TerminalCommand::CloseAll));
    assert_eq!(log.destroyed().len(), 2);
    assert!(manager.worktree_ids().is_empty());
}
