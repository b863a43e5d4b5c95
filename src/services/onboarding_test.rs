use super::*;
use crate::storage::MemoryStore;

fn tracker() -> (OnboardingTracker, Arc<MemoryStore>, Uuid) {
    let store = Arc::new(MemoryStore::new());
    let user_id = Uuid::new_v4();
    (OnboardingTracker::load(Arc::clone(&store) as Arc<dyn LocalStore>, user_id), store, user_id)
}

#[test]
fn fresh_state() {
    let (t, _, _) = tracker();
    assert_eq!(t.state(), OnboardingState::default());
    assert_eq!(t.state().total_steps, 4);
}

#[test]
fn key_is_per_user() {
    let id = Uuid::nil();
    assert_eq!(storage_key(id), format!("gymdesk_onboarding_{id}"));
}

#[test]
fn steps_advance_and_complete_at_end() {
    let (mut t, _, _) = tracker();
    for expected in 1..4 {
        assert_eq!(t.next_step().unwrap().current_step, expected);
    }
    let last = t.next_step().unwrap();
    assert!(last.is_complete);
    assert_eq!(last.current_step, 3);
}

#[test]
fn previous_step_saturates() {
    let (mut t, _, _) = tracker();
    assert_eq!(t.previous_step().unwrap().current_step, 0);
    t.next_step().unwrap();
    assert_eq!(t.previous_step().unwrap().current_step, 0);
}

#[test]
fn progress_survives_reload() {
    let (mut t, store, user_id) = tracker();
    t.next_step().unwrap();
    t.mark_tutorial_viewed().unwrap();

    let reloaded = OnboardingTracker::load(store as Arc<dyn LocalStore>, user_id);
    assert_eq!(reloaded.state().current_step, 1);
    assert!(reloaded.state().has_viewed_tutorial);
}

#[test]
fn skip_and_reset() {
    let (mut t, store, user_id) = tracker();
    assert!(t.skip().unwrap().is_complete);
    assert!(t.reset().unwrap() == OnboardingState::default());
    assert_eq!(store.get(&storage_key(user_id)).unwrap(), None);
}

#[test]
fn complete_jumps_to_last_step() {
    let (mut t, _, _) = tracker();
    let state = t.complete().unwrap();
    assert!(state.is_complete);
    assert_eq!(state.current_step, 3);
}

#[test]
fn corrupt_entry_starts_fresh() {
    let store = Arc::new(MemoryStore::new());
    let user_id = Uuid::new_v4();
    store.set(&storage_key(user_id), "{not json").unwrap();
    let t = OnboardingTracker::load(store as Arc<dyn LocalStore>, user_id);
    assert_eq!(t.state(), OnboardingState::default());
}
