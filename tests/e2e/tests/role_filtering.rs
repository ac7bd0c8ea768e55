//! Role filter: the company store hides entries above the caller's role;
//! the personal store ignores role entirely.

use hmem_core::role::Role;
use hmem_e2e::harness::TestStore;

#[test]
fn company_store_hides_entries_above_caller_role() {
    let mut harness = TestStore::new_company();
    let worker_id = harness
        .store
        .write('P', "Visible to everyone", vec![], Role::Worker, false, false, &[])
        .unwrap();
    let ceo_id = harness
        .store
        .write('P', "Ceo eyes only", vec![], Role::Ceo, false, false, &[])
        .unwrap();

    let mut session = hmem_core::SessionCache::new();
    let query = hmem_core::ReadQuery::default();
    let worker_view = Role::Worker.allowed_roles();
    let entries = hmem_core::read(&harness.store, &mut session, Some(&worker_view), &query).unwrap();

    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert!(ids.contains(&worker_id.as_str()));
    assert!(!ids.contains(&ceo_id.as_str()));
}

#[test]
fn ceo_sees_every_role_tier_in_the_company_store() {
    let mut harness = TestStore::new_company();
    let ids = [Role::Worker, Role::Al, Role::Pl, Role::Ceo].map(|role| {
        harness
            .store
            .write('P', "entry", vec![], role, false, false, &[])
            .unwrap()
    });

    let mut session = hmem_core::SessionCache::new();
    let query = hmem_core::ReadQuery::default();
    let ceo_view = Role::Ceo.allowed_roles();
    let entries = hmem_core::read(&harness.store, &mut session, Some(&ceo_view), &query).unwrap();

    let seen: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    for id in &ids {
        assert!(seen.contains(&id.as_str()));
    }
}

#[test]
fn personal_store_ignores_role_filter_entirely() {
    let mut harness = TestStore::new_personal();
    let id = harness
        .store
        .write('P', "Anyone's note", vec![], Role::Ceo, false, false, &[])
        .unwrap();

    let mut session = hmem_core::SessionCache::new();
    let query = hmem_core::ReadQuery::default();
    let entries = hmem_core::read(&harness.store, &mut session, None, &query).unwrap();
    assert!(entries.iter().any(|e| e.id == id));
}

#[test]
fn reading_a_company_entry_above_role_by_id_reports_not_found() {
    let mut harness = TestStore::new_company();
    let ceo_id = harness
        .store
        .write('P', "Ceo eyes only", vec![], Role::Ceo, false, false, &[])
        .unwrap();

    let mut session = hmem_core::SessionCache::new();
    let worker_view = Role::Worker.allowed_roles();
    let query = hmem_core::ReadQuery {
        id: Some(ceo_id),
        ..Default::default()
    };
    let err = hmem_core::read(&harness.store, &mut session, Some(&worker_view), &query).unwrap_err();
    assert!(matches!(err, hmem_core::HmemError::NotFound(_)));
}
