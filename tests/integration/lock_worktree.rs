//! Scenario: the heartbeat lock living inside a real worktree created by
//! `WorktreeManager`, rather than a bare temp directory.

use weft::worktree::lock::{is_stale, Acquisition, WorktreeLock};
use weft::worktree::WorktreeManager;

use crate::helpers::*;

#[test]
fn lock_lives_inside_the_managed_worktree_path() {
    let repo = init_repo();
    let manager = WorktreeManager::new(repo.path().to_path_buf(), repo.path().join("worktrees"));
    let worktree = manager.create("d", "a", "main").unwrap();

    let lock = match WorktreeLock::acquire(&worktree.path).unwrap() {
        Acquisition::Acquired(l) => l,
        _ => panic!("expected a fresh acquisition"),
    };
    assert!(WorktreeLock::lock_path(&worktree.path).exists());
    assert!(!is_stale(&worktree.path).unwrap());

    // `git worktree remove` refuses while the lock file is an untracked,
    // uncommitted addition only when it isn't force-removed; exercise the
    // combination the orchestrator actually uses on a live lock.
    lock.release().unwrap();
    assert!(!WorktreeLock::lock_path(&worktree.path).exists());
    manager.remove("d", "a", false).unwrap();
    assert!(!worktree.path.exists());
}

#[test]
fn resume_treats_a_missing_lock_file_as_stale() {
    let repo = init_repo();
    let manager = WorktreeManager::new(repo.path().to_path_buf(), repo.path().join("worktrees"));
    let worktree = manager.create("d", "a", "main").unwrap();

    // No heartbeat was ever written (matches a worker that died before its
    // first acquire): `is_stale` errors rather than silently reporting
    // fresh, which callers on the resume path treat as stale via
    // `.unwrap_or(true)`.
    assert!(is_stale(&worktree.path).is_err());
}

#[test]
fn a_stale_lock_can_be_stolen_and_then_the_new_holder_heartbeats() {
    let repo = init_repo();
    let manager = WorktreeManager::new(repo.path().to_path_buf(), repo.path().join("worktrees"));
    let worktree = manager.create("d", "a", "main").unwrap();

    let _first = match WorktreeLock::acquire(&worktree.path).unwrap() {
        Acquisition::Acquired(l) => l,
        _ => panic!(),
    };
    // Simulate the holder dying: the lock file stays behind with its
    // original heartbeat, no process keeps refreshing it (`WorktreeLock`
    // has no `Drop` impl, so simply not calling `.release()` is enough).

    // A live second acquisition attempt right away must see contention.
    assert!(matches!(WorktreeLock::acquire(&worktree.path).unwrap(), Acquisition::Contended));

    // Backdate the lock file itself to simulate the passage of the stale
    // threshold, then confirm a new acquisition steals it.
    let heartbeat = weft::worktree::lock::Heartbeat {
        pid: 999999,
        host: "dead-host".into(),
        heartbeat_timestamp: chrono::Utc::now() - chrono::Duration::seconds(200),
    };
    std::fs::write(WorktreeLock::lock_path(&worktree.path), serde_json::to_string(&heartbeat).unwrap()).unwrap();

    let stolen = match WorktreeLock::acquire(&worktree.path).unwrap() {
        Acquisition::Stolen(l) => l,
        _ => panic!("expected the stale lock to be stolen"),
    };
    stolen.heartbeat().unwrap();
    assert!(!is_stale(&worktree.path).unwrap());
}
