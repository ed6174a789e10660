//! Reference schema
//!
//! Table and column names follow the time-series database this core was
//! built against (`tsdb_group*`, `cp_comp*`), reduced to the columns the
//! dependency core reads and writes.

use rusqlite::Connection;

/// Current schema revision, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

pub const SCHEMA: &str = r#"
-- Time-series identifiers (owned by the metadata component)
CREATE TABLE IF NOT EXISTS ts_id (
    ts_key        INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id       INTEGER,
    datatype_id   INTEGER,
    location      TEXT NOT NULL,
    param         TEXT NOT NULL,
    param_type    TEXT NOT NULL DEFAULT '',
    interval      TEXT NOT NULL DEFAULT '',
    duration      TEXT NOT NULL DEFAULT '',
    version       TEXT NOT NULL DEFAULT '',
    unique_name   TEXT NOT NULL UNIQUE COLLATE NOCASE
);
CREATE INDEX IF NOT EXISTS idx_ts_id_site ON ts_id(site_id);
CREATE INDEX IF NOT EXISTS idx_ts_id_datatype ON ts_id(datatype_id);

-- Groups
CREATE TABLE IF NOT EXISTS tsdb_group (
    group_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    group_name    TEXT NOT NULL UNIQUE COLLATE NOCASE,
    group_type    TEXT NOT NULL DEFAULT '',
    description   TEXT NOT NULL DEFAULT '',
    modified_at   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tsdb_group_member_ts (
    group_id      INTEGER NOT NULL,
    ts_key        INTEGER NOT NULL,
    PRIMARY KEY (group_id, ts_key)
);
CREATE INDEX IF NOT EXISTS idx_group_member_ts_key ON tsdb_group_member_ts(ts_key);

CREATE TABLE IF NOT EXISTS tsdb_group_member_site (
    group_id      INTEGER NOT NULL,
    site_id       INTEGER NOT NULL,
    PRIMARY KEY (group_id, site_id)
);

CREATE TABLE IF NOT EXISTS tsdb_group_member_dt (
    group_id      INTEGER NOT NULL,
    datatype_id   INTEGER NOT NULL,
    PRIMARY KEY (group_id, datatype_id)
);

CREATE TABLE IF NOT EXISTS tsdb_group_member_other (
    group_id      INTEGER NOT NULL,
    seq           INTEGER NOT NULL,
    member_type   TEXT NOT NULL,
    member_value  TEXT NOT NULL,
    PRIMARY KEY (group_id, seq)
);

CREATE TABLE IF NOT EXISTS tsdb_group_member_group (
    parent_group_id  INTEGER NOT NULL,
    child_group_id   INTEGER NOT NULL,
    include_group    TEXT NOT NULL DEFAULT 'A',
    seq              INTEGER NOT NULL,
    PRIMARY KEY (parent_group_id, child_group_id)
);
CREATE INDEX IF NOT EXISTS idx_group_member_child ON tsdb_group_member_group(child_group_id);

-- Computations
CREATE TABLE IF NOT EXISTS cp_computation (
    computation_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    computation_name        TEXT NOT NULL UNIQUE COLLATE NOCASE,
    enabled                 INTEGER NOT NULL DEFAULT 1,
    algorithm_id            INTEGER,
    group_id                INTEGER,
    loading_application_id  INTEGER,
    comment                 TEXT NOT NULL DEFAULT '',
    modified_at             INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_computation_group ON cp_computation(group_id);

CREATE TABLE IF NOT EXISTS cp_comp_ts_parm (
    computation_id  INTEGER NOT NULL,
    seq             INTEGER NOT NULL,
    role_name       TEXT NOT NULL COLLATE NOCASE,
    parm_type       TEXT NOT NULL,
    ts_key          INTEGER,
    location        TEXT,
    param           TEXT,
    param_type      TEXT,
    interval        TEXT,
    duration        TEXT,
    version         TEXT,
    PRIMARY KEY (computation_id, role_name)
);
CREATE INDEX IF NOT EXISTS idx_comp_ts_parm_key ON cp_comp_ts_parm(ts_key);

CREATE TABLE IF NOT EXISTS cp_comp_property (
    computation_id  INTEGER NOT NULL,
    prop_name       TEXT NOT NULL COLLATE NOCASE,
    prop_value      TEXT NOT NULL,
    PRIMARY KEY (computation_id, prop_name)
);

-- Dependency edges (live) and the per-computation scratch area
CREATE TABLE IF NOT EXISTS cp_comp_depends (
    ts_key          INTEGER NOT NULL,
    computation_id  INTEGER NOT NULL,
    PRIMARY KEY (ts_key, computation_id)
);
CREATE INDEX IF NOT EXISTS idx_comp_depends_comp ON cp_comp_depends(computation_id);

CREATE TABLE IF NOT EXISTS cp_comp_depends_scratchpad (
    ts_key          INTEGER NOT NULL,
    computation_id  INTEGER NOT NULL,
    PRIMARY KEY (ts_key, computation_id)
);
CREATE INDEX IF NOT EXISTS idx_comp_depends_scratch_comp ON cp_comp_depends_scratchpad(computation_id);

-- Cross-process notification queue
CREATE TABLE IF NOT EXISTS cp_depends_notify (
    record_num    INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type    TEXT NOT NULL,
    target_key    INTEGER NOT NULL,
    enqueued_at   INTEGER NOT NULL,
    claimed_by    TEXT,
    claimed_at    INTEGER
);
CREATE INDEX IF NOT EXISTS idx_depends_notify_order ON cp_depends_notify(enqueued_at, record_num);
"#;

/// Create every table and index that does not exist yet
pub fn apply(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Schema revision recorded in the database file
pub fn version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply(&conn).unwrap();
        apply(&conn).unwrap();
        assert_eq!(version(&conn).unwrap(), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'cp_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 6);
    }

    #[test]
    fn test_group_name_is_case_insensitive_unique() {
        let conn = Connection::open_in_memory().unwrap();
        apply(&conn).unwrap();
        conn.execute(
            "INSERT INTO tsdb_group (group_name, modified_at) VALUES ('Basin', 0)",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO tsdb_group (group_name, modified_at) VALUES ('BASIN', 0)",
            [],
        );
        assert!(dup.is_err());
    }
}
