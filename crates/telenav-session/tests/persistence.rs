//! Navigation on the SQLite store, including across a restart.

mod common;

use std::sync::Arc;

use common::{FIRST_MESSAGE, Harness, USER};
use telenav_session::{SqliteStore, StateStore};
use telenav_types::{StateScope, SystemCommand};

// ============================================================================
// Shared test setup
// ============================================================================

fn sqlite_harness() -> Harness {
    Harness::new(Arc::new(SqliteStore::in_memory().unwrap()))
}

#[test]
fn test_walkthrough_on_sqlite() {
    let h = sqlite_harness();
    assert!(h.text("/start").unwrap());
    let first = h.page_ids(FIRST_MESSAGE)[0];

    h.inline(FIRST_MESSAGE, "COUNT_HERE").unwrap();
    h.inline(FIRST_MESSAGE, "NEXT").unwrap();
    assert_eq!(h.page_ids(FIRST_MESSAGE).len(), 2);

    h.inline(FIRST_MESSAGE, SystemCommand::GoBack.id()).unwrap();
    assert_eq!(h.page_ids(FIRST_MESSAGE), vec![first]);
    assert_eq!(h.count(first), Some(1));

    h.inline(FIRST_MESSAGE, "COUNT_NEW").unwrap();
    let counter_page = h.page_ids(FIRST_MESSAGE)[1];
    assert_eq!(h.count(counter_page), Some(11));
}

#[test]
fn test_close_after_local_write_on_sqlite() {
    let h = sqlite_harness();
    h.text("/start").unwrap();
    h.inline(FIRST_MESSAGE, "NEXT").unwrap();

    // Close writes its page's local state, then deletes that page.
    h.inline(FIRST_MESSAGE, "CLOSE").unwrap();
    assert_eq!(h.page_ids(FIRST_MESSAGE).len(), 1);

    h.inline(FIRST_MESSAGE, "CLOSE").unwrap();
    assert!(h.pages(FIRST_MESSAGE).is_empty());
    assert_eq!(h.session().blocks_count().unwrap(), 0);
}

#[test]
fn test_navigation_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telenav.db");

    let (first, second) = {
        let h = Harness::new(Arc::new(SqliteStore::open(&path).unwrap()));
        h.text("/start").unwrap();
        h.inline(FIRST_MESSAGE, "COUNT_HERE").unwrap();
        h.inline(FIRST_MESSAGE, "NEXT").unwrap();
        let ids = h.page_ids(FIRST_MESSAGE);
        (ids[0], ids[1])
    };

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let h = Harness::new(store.clone());
    assert_eq!(h.page_ids(FIRST_MESSAGE), vec![first, second]);

    h.inline(FIRST_MESSAGE, SystemCommand::GoBack.id()).unwrap();
    let call = h.journal.last();
    assert_eq!((call.tag.as_str(), call.page), ("Start", first));
    assert_eq!(h.count(first), Some(1));
    assert!(store.find_state(&StateScope::User(USER)).unwrap().is_some());
}
