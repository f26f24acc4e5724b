use super::blocks::big_column;
use anyhow::Result;
use num_bigint::BigUint;
use rusqlite::{params, Connection};

/// Chain-wide counters captured at a session change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub block_height: u64,
    pub session_index: u64,
    pub total_issuance: BigUint,
    pub total_emission: BigUint,
    pub active_accounts: u64,
    /// Milliseconds since Unix epoch at capture time
    pub timestamp: i64,
}

/// Insert a snapshot only if its session index is above every stored one
///
/// The check and the insert are a single statement, so concurrent writers
/// cannot interleave a lower or duplicate session index.
pub fn insert_snapshot(conn: &Connection, snapshot: &SnapshotRecord) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO chain_snapshots
         (session_index, block_height, total_issuance, total_emission, active_accounts, timestamp)
         SELECT ?1, ?2, ?3, ?4, ?5, ?6
         WHERE NOT EXISTS (SELECT 1 FROM chain_snapshots WHERE session_index >= ?1)",
        params![
            snapshot.session_index as i64,
            snapshot.block_height as i64,
            snapshot.total_issuance.to_string(),
            snapshot.total_emission.to_string(),
            snapshot.active_accounts as i64,
            snapshot.timestamp
        ],
    )?;
    Ok(inserted > 0)
}

/// Highest persisted session index
pub fn get_latest_session_index(conn: &Connection) -> Result<Option<u64>> {
    let result: Option<i64> = conn.query_row(
        "SELECT MAX(session_index) FROM chain_snapshots",
        [],
        |row| row.get(0),
    )?;
    Ok(result.map(|n| n as u64))
}

/// Most recent snapshots, newest first
pub fn get_recent_snapshots(conn: &Connection, limit: u32) -> Result<Vec<SnapshotRecord>> {
    let mut stmt = conn.prepare(
        "SELECT block_height, session_index, total_issuance, total_emission, active_accounts, timestamp
         FROM chain_snapshots ORDER BY session_index DESC LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit], |row| {
        Ok(SnapshotRecord {
            block_height: row.get::<_, i64>(0)? as u64,
            session_index: row.get::<_, i64>(1)? as u64,
            total_issuance: big_column(row, 2)?,
            total_emission: big_column(row, 3)?,
            active_accounts: row.get::<_, i64>(4)? as u64,
            timestamp: row.get(5)?,
        })
    })?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

pub fn count_snapshots(conn: &Connection) -> Result<u64> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM chain_snapshots", [], |row| row.get(0))?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn snapshot(session_index: u64) -> SnapshotRecord {
        SnapshotRecord {
            block_height: session_index * 600,
            session_index,
            total_issuance: BigUint::from(u128::MAX),
            total_emission: 1_000u32.into(),
            active_accounts: 42,
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_first_snapshot_bootstraps() {
        let conn = setup_db();
        assert_eq!(get_latest_session_index(&conn).unwrap(), None);

        assert!(insert_snapshot(&conn, &snapshot(10)).unwrap());
        assert_eq!(get_latest_session_index(&conn).unwrap(), Some(10));
    }

    #[test]
    fn test_non_increasing_session_is_refused() {
        let conn = setup_db();
        assert!(insert_snapshot(&conn, &snapshot(10)).unwrap());

        assert!(!insert_snapshot(&conn, &snapshot(10)).unwrap());
        assert!(!insert_snapshot(&conn, &snapshot(9)).unwrap());
        assert!(insert_snapshot(&conn, &snapshot(11)).unwrap());

        assert_eq!(count_snapshots(&conn).unwrap(), 2);
    }

    #[test]
    fn test_recent_snapshots_newest_first() {
        let conn = setup_db();
        for session in [3, 4, 7] {
            insert_snapshot(&conn, &snapshot(session)).unwrap();
        }

        let recent = get_recent_snapshots(&conn, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], snapshot(7));
        assert_eq!(recent[1].session_index, 4);
    }
}
