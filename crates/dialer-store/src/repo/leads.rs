use crate::error::{is_unique_violation, Result, StoreError};
use crate::repo::{parse_id, parse_optional_id};
use dialer_core::domain::{
    normalize_phone, AttemptRecord, CallAttemptId, CallStatus, Lead, LeadId, LeadPriority,
    LeadStatus,
};
use dialer_core::CoreError;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::str::FromStr;

pub(crate) const LEAD_COLUMNS: &str = "id, phone, name, priority, status, attempt_count, next_eligible_at, assigned_agent_id, active, notes, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct LeadNew {
    pub phone: String,
    pub name: Option<String>,
    pub priority: LeadPriority,
    pub notes: Option<String>,
    pub next_eligible_at: Option<i64>,
}

/// Fields an operator may edit. Status, attempts and assignment are owned by
/// the dispatcher and reconciler and are deliberately absent.
#[derive(Debug, Clone, Default)]
pub struct LeadUpdate {
    pub name: Option<Option<String>>,
    pub priority: Option<LeadPriority>,
    pub notes: Option<Option<String>>,
    pub next_eligible_at: Option<Option<i64>>,
}

#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub include_retired: bool,
    pub limit: Option<i64>,
}

pub struct LeadsRepo<'a> {
    conn: &'a Connection,
}

impl<'a> LeadsRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn create(&self, now_utc: i64, input: LeadNew) -> Result<Lead> {
        let phone = normalize_phone(&input.phone)
            .ok_or_else(|| CoreError::InvalidPhone(input.phone.clone()))?;

        let lead = Lead {
            id: LeadId::new(),
            phone,
            name: clean_text(input.name),
            priority: input.priority,
            status: LeadStatus::Pending,
            attempt_count: 0,
            next_eligible_at: input.next_eligible_at,
            assigned_agent_id: None,
            active: true,
            notes: clean_text(input.notes),
            created_at: now_utc,
            updated_at: now_utc,
            attempt_history: Vec::new(),
        };
        lead.validate()?;

        let inserted = self.conn.execute(
            "INSERT INTO leads (id, phone, name, priority, status, attempt_count, next_eligible_at, assigned_agent_id, active, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, 1, ?8, ?9, ?10);",
            params![
                lead.id.to_string(),
                lead.phone,
                lead.name,
                lead.priority.rank(),
                lead.status.as_str(),
                lead.attempt_count,
                lead.next_eligible_at,
                lead.notes,
                lead.created_at,
                lead.updated_at,
            ],
        );
        match inserted {
            Ok(_) => Ok(lead),
            Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicatePhone(lead.phone)),
            Err(err) => Err(err.into()),
        }
    }

    pub fn get(&self, id: LeadId) -> Result<Option<Lead>> {
        get_inner(self.conn, id)
    }

    pub fn get_by_phone(&self, phone: &str) -> Result<Option<Lead>> {
        let normalized = match normalize_phone(phone) {
            Some(value) => value,
            None => return Ok(None),
        };
        let id: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM leads WHERE phone = ?1;",
                [normalized],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(raw) => get_inner(self.conn, parse_id(raw)?),
            None => Ok(None),
        }
    }

    /// Leads in dialing order: priority rank, then oldest first.
    pub fn list(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let mut sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE 1 = 1");
        let mut args: Vec<rusqlite::types::Value> = Vec::new();
        if !filter.include_retired {
            sql.push_str(" AND active = 1");
        }
        if let Some(status) = filter.status {
            args.push(status.as_str().to_string().into());
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY priority DESC, created_at ASC, rowid ASC");
        if let Some(limit) = filter.limit {
            args.push(limit.into());
            sql.push_str(&format!(" LIMIT ?{}", args.len()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(args))?;
        let mut leads = Vec::new();
        while let Some(row) = rows.next()? {
            leads.push(lead_from_row(row)?);
        }
        Ok(leads)
    }

    pub fn update(&self, now_utc: i64, id: LeadId, update: LeadUpdate) -> Result<Lead> {
        let tx = self.conn.unchecked_transaction()?;
        let mut lead = get_inner(&tx, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(value) = update.name {
            lead.name = clean_text(value);
        }
        if let Some(value) = update.priority {
            lead.priority = value;
        }
        if let Some(value) = update.notes {
            lead.notes = clean_text(value);
        }
        if let Some(value) = update.next_eligible_at {
            lead.next_eligible_at = value;
        }
        lead.updated_at = now_utc;

        tx.execute(
            "UPDATE leads SET name = ?2, priority = ?3, notes = ?4, next_eligible_at = ?5, updated_at = ?6
             WHERE id = ?1;",
            params![
                lead.id.to_string(),
                lead.name,
                lead.priority.rank(),
                lead.notes,
                lead.next_eligible_at,
                lead.updated_at,
            ],
        )?;
        tx.commit()?;
        Ok(lead)
    }

    /// Permanently removes the lead from selection. Records are never deleted.
    pub fn retire(&self, now_utc: i64, id: LeadId) -> Result<Lead> {
        let updated = self.conn.execute(
            "UPDATE leads SET active = 0, updated_at = ?2 WHERE id = ?1;",
            params![id.to_string(), now_utc],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        get_inner(self.conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Selects the best eligible lead and moves it to `claimed` in one statement,
    /// so two callers can never claim the same lead.
    pub fn claim_next_eligible(&self, now_utc: i64) -> Result<Option<Lead>> {
        let claimed: Option<String> = self
            .conn
            .query_row(
                "UPDATE leads SET status = ?2, updated_at = ?1
                 WHERE id = (
                     SELECT id FROM leads
                     WHERE active = 1
                       AND status = ?3
                       AND (next_eligible_at IS NULL OR next_eligible_at <= ?1)
                     ORDER BY priority DESC, created_at ASC, rowid ASC
                     LIMIT 1
                 )
                   AND status = ?3
                 RETURNING id;",
                params![
                    now_utc,
                    LeadStatus::Claimed.as_str(),
                    LeadStatus::Pending.as_str()
                ],
                |row| row.get(0),
            )
            .optional()?;

        match claimed {
            Some(raw) => get_inner(self.conn, parse_id(raw)?),
            None => Ok(None),
        }
    }

    /// Returns a claimed lead to `pending` without touching its eligibility.
    pub fn release_claim(&self, now_utc: i64, id: LeadId) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE leads SET status = ?3, updated_at = ?2 WHERE id = ?1 AND status = ?4;",
            params![
                id.to_string(),
                now_utc,
                LeadStatus::Pending.as_str(),
                LeadStatus::Claimed.as_str()
            ],
        )?;
        Ok(updated == 1)
    }

    pub fn count_by_status(&self) -> Result<Vec<(LeadStatus, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM leads GROUP BY status ORDER BY status ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut counts = Vec::new();
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            counts.push((LeadStatus::from_str(&status)?, row.get(1)?));
        }
        Ok(counts)
    }

    pub fn history(&self, id: LeadId) -> Result<Vec<AttemptRecord>> {
        history_inner(self.conn, id)
    }
}

pub(crate) fn get_inner(conn: &Connection, id: LeadId) -> Result<Option<Lead>> {
    let mut stmt = conn.prepare(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    let mut lead = match rows.next()? {
        Some(row) => lead_from_row(row)?,
        None => return Ok(None),
    };
    lead.attempt_history = history_inner(conn, id)?;
    Ok(Some(lead))
}

fn history_inner(conn: &Connection, id: LeadId) -> Result<Vec<AttemptRecord>> {
    let mut stmt = conn.prepare(
        "SELECT attempt_number, occurred_at, outcome, duration_secs, notes
         FROM lead_attempt_history
         WHERE lead_id = ?1
         ORDER BY attempt_number ASC, seq ASC;",
    )?;
    let mut rows = stmt.query([id.to_string()])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let outcome: String = row.get(2)?;
        records.push(AttemptRecord {
            attempt_number: row.get(0)?,
            occurred_at: row.get(1)?,
            outcome: CallStatus::from_str(&outcome)?,
            duration_secs: row.get(3)?,
            notes: row.get(4)?,
        });
    }
    Ok(records)
}

pub(crate) struct HistoryEntry<'a> {
    pub call_attempt_id: CallAttemptId,
    pub attempt_number: i32,
    pub outcome: CallStatus,
    pub duration_secs: Option<i64>,
    pub notes: Option<&'a str>,
}

pub(crate) fn append_history(
    conn: &Connection,
    lead_id: LeadId,
    now_utc: i64,
    entry: HistoryEntry<'_>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO lead_attempt_history
             (lead_id, call_attempt_id, attempt_number, occurred_at, outcome, duration_secs, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            lead_id.to_string(),
            entry.call_attempt_id.to_string(),
            entry.attempt_number,
            now_utc,
            entry.outcome.as_str(),
            entry.duration_secs,
            entry.notes
        ],
    )?;
    Ok(())
}

/// Fills a duration that was unknown when the entry was written.
pub(crate) fn fill_history_duration(
    conn: &Connection,
    call_attempt_id: CallAttemptId,
    duration_secs: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE lead_attempt_history SET duration_secs = ?2
         WHERE call_attempt_id = ?1 AND duration_secs IS NULL;",
        params![call_attempt_id.to_string(), duration_secs],
    )?;
    Ok(())
}

pub(crate) fn lead_from_row(row: &rusqlite::Row<'_>) -> Result<Lead> {
    let rank: i64 = row.get(3)?;
    let priority = LeadPriority::from_rank(rank)
        .ok_or_else(|| CoreError::InvalidPriority(rank.to_string()))?;
    let status: String = row.get(4)?;
    Ok(Lead {
        id: parse_id(row.get(0)?)?,
        phone: row.get(1)?,
        name: row.get(2)?,
        priority,
        status: LeadStatus::from_str(&status)?,
        attempt_count: row.get(5)?,
        next_eligible_at: row.get(6)?,
        assigned_agent_id: parse_optional_id(row.get(7)?)?,
        active: row.get(8)?,
        notes: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        attempt_history: Vec::new(),
    })
}

fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
