//! Correction-token protocol: marking a root obsolete without a `[✓ID]`
//! token is refused, a dangling token is refused, a valid token freezes the
//! old entry and transfers its access count, and the chain is walkable on
//! a by-ID read.

use hmem_core::role::Role;
use hmem_e2e::harness::TestStore;

#[test]
fn obsolete_without_correction_token_is_refused() {
    let mut harness = TestStore::new_personal();
    let id = harness
        .store
        .write('D', "Old decision", vec![], Role::Worker, false, false, &[])
        .unwrap();

    let err = harness
        .store
        .update_root(&id, None, None, Some(true), None, None, None, None, false)
        .unwrap_err();
    assert!(matches!(err, hmem_core::HmemError::ObsoleteWithoutCorrection));
}

#[test]
fn correction_token_pointing_at_missing_id_is_refused() {
    let mut harness = TestStore::new_personal();
    let id = harness
        .store
        .write('D', "Old decision", vec![], Role::Worker, false, false, &[])
        .unwrap();

    let content = "Superseded [\u{2713}D9999]";
    let err = harness
        .store
        .update_root(&id, Some(content), None, Some(true), None, None, None, None, false)
        .unwrap_err();
    assert!(matches!(err, hmem_core::HmemError::CorrectionTargetMissing(_)));
}

#[test]
fn valid_correction_token_freezes_and_transfers_access_count() {
    let mut harness = TestStore::new_personal();
    let old_id = harness.seed_accessed_root('D', "Old decision", 3);
    let new_id = harness
        .store
        .write('D', "New decision", vec![], Role::Worker, false, false, &[])
        .unwrap();

    let content = format!("Superseded [\u{2713}{new_id}]");
    harness
        .store
        .update_root(&old_id, Some(&content), None, Some(true), None, None, None, None, false)
        .unwrap();

    let old_root = harness.store.get_root(&old_id).unwrap().unwrap();
    assert!(old_root.obsolete);
    assert_eq!(old_root.access_count, 0);

    let new_root = harness.store.get_root(&new_id).unwrap().unwrap();
    assert_eq!(new_root.access_count, 3);
    assert!(new_root.links.contains(&old_id));
    assert!(old_root.links.contains(&new_id));
}

#[test]
fn curator_bypass_allows_obsolete_without_a_token() {
    let mut harness = TestStore::new_personal();
    let id = harness
        .store
        .write('D', "Old decision", vec![], Role::Worker, false, false, &[])
        .unwrap();

    harness
        .store
        .update_root(&id, None, None, Some(true), None, None, None, None, true)
        .unwrap();

    let root = harness.store.get_root(&id).unwrap().unwrap();
    assert!(root.obsolete);
}

#[test]
fn reading_an_obsolete_root_by_id_walks_the_correction_chain() {
    let mut harness = TestStore::new_personal();
    let old_id = harness
        .store
        .write('D', "Old decision", vec![], Role::Worker, false, false, &[])
        .unwrap();
    let new_id = harness
        .store
        .write('D', "New decision", vec![], Role::Worker, false, false, &[])
        .unwrap();
    let content = format!("Superseded [\u{2713}{new_id}]");
    harness
        .store
        .update_root(&old_id, Some(&content), None, Some(true), None, None, None, None, false)
        .unwrap();

    let mut session = hmem_core::SessionCache::new();
    let query = hmem_core::ReadQuery {
        id: Some(old_id.clone()),
        follow_obsolete: true,
        ..Default::default()
    };
    let entries = hmem_core::read(&harness.store, &mut session, None, &query).unwrap();
    let chain = entries[0].obsolete_chain.as_ref().expect("chain present");
    assert!(chain.contains(&new_id));
}
