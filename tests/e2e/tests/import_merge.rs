//! Import/merge: new roots are inserted, exact-match `(prefix, level_1)`
//! duplicates are merged, and dry-run mode leaves the target untouched.

use hmem_core::role::Role;
use hmem_e2e::harness::TestStore;

#[test]
fn importing_into_an_empty_store_inserts_every_root() {
    let mut source = TestStore::new_personal();
    source.seed_roots('P', 3);

    let target = TestStore::new_personal();
    let summary = target.store.import_from_hmem(source.path(), false).unwrap();

    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.merged, 0);

    let stats = target.store.stats().unwrap();
    assert_eq!(stats.root_count, 3);
}

#[test]
fn identical_level_1_text_is_treated_as_a_duplicate() {
    let mut source = TestStore::new_personal();
    source
        .store
        .write('P', "Shared root", vec![], Role::Worker, false, false, &[])
        .unwrap();

    let mut target = TestStore::new_personal();
    target
        .store
        .write('P', "Shared root", vec![], Role::Worker, false, false, &[])
        .unwrap();

    let summary = target.store.import_from_hmem(source.path(), false).unwrap();
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.merged, 1);

    let stats = target.store.stats().unwrap();
    assert_eq!(stats.root_count, 1);
}

#[test]
fn dry_run_reports_counts_without_writing() {
    let mut source = TestStore::new_personal();
    source.seed_roots('P', 4);

    let target = TestStore::new_personal();
    let summary = target.store.import_from_hmem(source.path(), true).unwrap();
    assert_eq!(summary.inserted, 4);

    let stats = target.store.stats().unwrap();
    assert_eq!(stats.root_count, 0);
}
