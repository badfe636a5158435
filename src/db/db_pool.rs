use duckdb::Connection;
use r2d2::ManageConnection;
use std::sync::Mutex;

/// Hands out clones of one base connection, so an in-memory database is
/// shared by every pooled connection.
pub struct DuckDBConnectionManager {
    base: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn new(base: Connection) -> Self {
        Self {
            base: Mutex::new(base),
        }
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.base
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r2d2::Pool;

    #[test]
    fn pooled_connections_share_the_in_memory_database() {
        let base = Connection::open_in_memory().unwrap();
        base.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1), (2);")
            .unwrap();

        let pool = Pool::builder()
            .max_size(2)
            .build(DuckDBConnectionManager::new(base))
            .unwrap();

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }
}
