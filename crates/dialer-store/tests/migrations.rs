use dialer_store::Store;

#[test]
fn migrations_apply_once() {
    let store = Store::open_in_memory().expect("open in memory");
    assert_eq!(store.schema_version().expect("version before migrate"), 0);
    store.migrate().expect("migrate");
    store.migrate().expect("migrate again");

    let version: i64 = store
        .connection()
        .query_row("SELECT version FROM dialer_schema LIMIT 1;", [], |row| {
            row.get(0)
        })
        .expect("schema version");
    assert_eq!(version, 2);
    assert_eq!(store.schema_version().expect("schema version"), 2);
}

#[test]
fn file_backed_store_persists_between_opens() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dialer.sqlite3");
    {
        let store = Store::open(&path).expect("open");
        store.migrate().expect("migrate");
    }
    let store = Store::open(&path).expect("reopen");
    assert_eq!(store.schema_version().expect("schema version"), 2);
}

#[test]
fn history_entries_link_to_call_attempts() {
    let store = Store::open_in_memory().expect("open in memory");
    store.migrate().expect("migrate");

    let columns: Vec<String> = store
        .connection()
        .prepare("SELECT name FROM pragma_table_info('lead_attempt_history');")
        .expect("prepare")
        .query_map([], |row| row.get(0))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("columns");
    assert!(columns.iter().any(|name| name == "call_attempt_id"));
}
