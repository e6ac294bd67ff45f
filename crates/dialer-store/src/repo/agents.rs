use crate::error::{Result, StoreError};
use crate::repo::parse_id;
use dialer_core::domain::{normalize_phone, Agent, AgentId};
use dialer_core::CoreError;
use rusqlite::{params, Connection};

const AGENT_COLUMNS: &str = "id, name, phone, available, active, on_call, total_calls, successful_calls, total_talk_secs, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct AgentNew {
    pub name: String,
    pub phone: String,
    pub available: bool,
}

pub struct AgentsRepo<'a> {
    conn: &'a Connection,
}

impl<'a> AgentsRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn create(&self, now_utc: i64, input: AgentNew) -> Result<Agent> {
        let phone = normalize_phone(&input.phone)
            .ok_or_else(|| CoreError::InvalidPhone(input.phone.clone()))?;
        let agent = Agent {
            id: AgentId::new(),
            name: input.name.trim().to_string(),
            phone,
            available: input.available,
            active: true,
            on_call: false,
            total_calls: 0,
            successful_calls: 0,
            total_talk_secs: 0,
            created_at: now_utc,
            updated_at: now_utc,
        };
        agent.validate()?;

        self.conn.execute(
            "INSERT INTO agents (id, name, phone, available, active, on_call, total_calls, successful_calls, total_talk_secs, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, 0, 0, 0, 0, ?5, ?6);",
            params![
                agent.id.to_string(),
                agent.name,
                agent.phone,
                agent.available,
                agent.created_at,
                agent.updated_at,
            ],
        )?;
        Ok(agent)
    }

    pub fn get(&self, id: AgentId) -> Result<Option<Agent>> {
        get_inner(self.conn, id)
    }

    pub fn list(&self, include_inactive: bool) -> Result<Vec<Agent>> {
        let sql = if include_inactive {
            format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY name COLLATE NOCASE ASC, id ASC;")
        } else {
            format!(
                "SELECT {AGENT_COLUMNS} FROM agents WHERE active = 1 ORDER BY name COLLATE NOCASE ASC, id ASC;"
            )
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut agents = Vec::new();
        while let Some(row) = rows.next()? {
            agents.push(agent_from_row(row)?);
        }
        Ok(agents)
    }

    pub fn set_availability(&self, now_utc: i64, id: AgentId, available: bool) -> Result<Agent> {
        let updated = self.conn.execute(
            "UPDATE agents SET available = ?2, updated_at = ?3 WHERE id = ?1;",
            params![id.to_string(), available, now_utc],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        get_inner(self.conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Deactivated agents keep their history but are never selected again.
    pub fn set_active(&self, now_utc: i64, id: AgentId, active: bool) -> Result<Agent> {
        let updated = self.conn.execute(
            "UPDATE agents SET active = ?2, updated_at = ?3 WHERE id = ?1;",
            params![id.to_string(), active, now_utc],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        get_inner(self.conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Picks the least-loaded selectable agent and marks it on a call in one
    /// statement. Ties go to fewer calls, then less talk time, then the oldest.
    pub fn claim_available(&self, now_utc: i64) -> Result<Option<Agent>> {
        let mut stmt = self.conn.prepare(&format!(
            "UPDATE agents SET on_call = 1, updated_at = ?1
             WHERE id = (
                 SELECT id FROM agents
                 WHERE active = 1 AND available = 1 AND on_call = 0
                 ORDER BY total_calls ASC, total_talk_secs ASC, created_at ASC, rowid ASC
                 LIMIT 1
             )
               AND on_call = 0
             RETURNING {AGENT_COLUMNS};"
        ))?;
        let mut rows = stmt.query([now_utc])?;
        match rows.next()? {
            Some(row) => Ok(Some(agent_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn release(&self, now_utc: i64, id: AgentId) -> Result<bool> {
        release_inner(self.conn, now_utc, id)
    }

    pub fn record_call(
        &self,
        now_utc: i64,
        id: AgentId,
        successful: bool,
        talk_secs: i64,
    ) -> Result<()> {
        record_call_inner(self.conn, now_utc, id, successful, talk_secs)
    }

    pub fn count_selectable(&self) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM agents WHERE active = 1 AND available = 1 AND on_call = 0;",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

pub(crate) fn get_inner(conn: &Connection, id: AgentId) -> Result<Option<Agent>> {
    let mut stmt = conn.prepare(&format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(agent_from_row(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn release_inner(conn: &Connection, now_utc: i64, id: AgentId) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE agents SET on_call = 0, updated_at = ?2 WHERE id = ?1 AND on_call = 1;",
        params![id.to_string(), now_utc],
    )?;
    Ok(updated == 1)
}

pub(crate) fn record_call_inner(
    conn: &Connection,
    now_utc: i64,
    id: AgentId,
    successful: bool,
    talk_secs: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE agents
         SET total_calls = total_calls + 1,
             successful_calls = successful_calls + ?2,
             total_talk_secs = total_talk_secs + ?3,
             updated_at = ?4
         WHERE id = ?1;",
        params![
            id.to_string(),
            i64::from(successful),
            talk_secs.max(0),
            now_utc
        ],
    )?;
    Ok(())
}

/// Adds talk time reported after the call was already credited.
pub(crate) fn add_talk_time_inner(
    conn: &Connection,
    now_utc: i64,
    id: AgentId,
    talk_secs: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE agents SET total_talk_secs = total_talk_secs + ?2, updated_at = ?3 WHERE id = ?1;",
        params![id.to_string(), talk_secs.max(0), now_utc],
    )?;
    Ok(())
}

fn agent_from_row(row: &rusqlite::Row<'_>) -> Result<Agent> {
    Ok(Agent {
        id: parse_id(row.get(0)?)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        available: row.get(3)?,
        active: row.get(4)?,
        on_call: row.get(5)?,
        total_calls: row.get(6)?,
        successful_calls: row.get(7)?,
        total_talk_secs: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
