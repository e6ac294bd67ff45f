pub mod db;
pub mod error;
pub mod migrate;
pub mod paths;
pub mod repo;

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = db::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = db::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        migrate::run_migrations(&self.conn)
    }

    pub fn schema_version(&self) -> Result<i64> {
        migrate::schema_version(&self.conn)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn leads(&self) -> repo::LeadsRepo<'_> {
        repo::LeadsRepo::new(&self.conn)
    }

    pub fn agents(&self) -> repo::AgentsRepo<'_> {
        repo::AgentsRepo::new(&self.conn)
    }

    pub fn call_attempts(&self) -> repo::CallAttemptsRepo<'_> {
        repo::CallAttemptsRepo::new(&self.conn)
    }

    /// Multi-record transitions that must commit or fail as one.
    pub fn dispatch(&self) -> repo::DispatchRepo<'_> {
        repo::DispatchRepo::new(&self.conn)
    }
}
