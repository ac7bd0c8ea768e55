//! Write/append/update/delete against a real on-disk store.

use hmem_core::role::Role;
use hmem_e2e::harness::TestStore;
use hmem_e2e::mocks::indented_block;

#[test]
fn write_then_read_by_id_round_trips_content() {
    let mut harness = TestStore::new_personal();
    let id = harness
        .store
        .write('P', "Ship the thing", vec![], Role::Worker, false, false, &[])
        .unwrap();

    assert!(id.starts_with('P'));

    let mut session = hmem_core::SessionCache::new();
    let query = hmem_core::ReadQuery {
        id: Some(id.clone()),
        ..Default::default()
    };
    let entries = hmem_core::read(&harness.store, &mut session, None, &query).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level_1, "Ship the thing");
}

#[test]
fn append_children_bumps_parent_access_count() {
    let mut harness = TestStore::new_personal();
    let id = harness
        .store
        .write('P', "Root entry", vec![], Role::Worker, false, false, &[])
        .unwrap();

    let before = harness.store.get_root(&id).unwrap().unwrap().access_count;
    let block = indented_block("first child", &["grandchild"]);
    let new_ids = harness.store.append_children(&id, &block).unwrap();
    assert_eq!(new_ids.len(), 2);

    let after = harness.store.get_root(&id).unwrap().unwrap().access_count;
    assert_eq!(after, before + 1);
}

#[test]
fn update_node_rejects_content_over_the_configured_limit() {
    let mut harness = TestStore::new_personal();
    let id = harness
        .store
        .write('P', "Root", vec![], Role::Worker, false, false, &[])
        .unwrap();
    let ids = harness.store.append_children(&id, "child").unwrap();
    let node_id = &ids[0];

    let limit = harness.store.config.tolerant_limit_for_depth(2);
    let too_long: String = "x".repeat(limit + 1);

    let err = harness
        .store
        .update_node(node_id, Some(&too_long), None, None, None)
        .unwrap_err();
    assert!(matches!(err, hmem_core::HmemError::CharLimitExceeded { .. }));
}

#[test]
fn delete_removes_root_and_descendants() {
    let mut harness = TestStore::new_personal();
    let id = harness
        .store
        .write('P', "Root", vec![], Role::Worker, false, false, &[])
        .unwrap();
    harness.store.append_children(&id, "child one\nchild two").unwrap();

    harness.store.delete(&id).unwrap();
    assert!(harness.store.get_root(&id).unwrap().is_none());
}

#[test]
fn stats_reflects_seeded_roots() {
    let mut harness = TestStore::new_personal();
    harness.seed_roots('P', 5);
    let stats = harness.store.stats().unwrap();
    assert_eq!(stats.root_count, 5);
}
