use std::collections::HashSet;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value};
use uuid::Uuid;

use flux_core::{Capsule, PipelineSnapshot, State};

use crate::error::{Result, StoreError};
use crate::schema;

const SNAPSHOT_KEY: &str = "pipeline_snapshot";

/// Append-only journal of capsules plus the latest pipeline snapshot.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).optional()?;
        Ok(result)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        set_metadata_on(&self.conn, key, value)
    }

    // --- Snapshot ---

    pub fn save_snapshot(&self, snapshot: &PipelineSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.set_metadata(SNAPSHOT_KEY, &json)
    }

    pub fn load_snapshot(&self) -> Result<Option<PipelineSnapshot>> {
        match self.get_metadata(SNAPSHOT_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    // --- Capsules ---

    /// Insert one capsule. Returns `false` if a capsule with the same id is
    /// already journaled; the stored copy is left untouched.
    pub fn append_capsule(&self, capsule: &Capsule) -> Result<bool> {
        insert_capsule_on(&self.conn, capsule)
    }

    /// Insert several capsules and optionally the snapshot that produced them,
    /// all in one transaction. Returns how many capsules were new.
    pub fn append_all(
        &self,
        capsules: &[Capsule],
        snapshot: Option<&PipelineSnapshot>,
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        for capsule in capsules {
            if insert_capsule_on(&tx, capsule)? {
                inserted += 1;
            }
        }
        if let Some(snapshot) = snapshot {
            set_metadata_on(&tx, SNAPSHOT_KEY, &serde_json::to_string(snapshot)?)?;
        }
        tx.commit()?;
        tracing::debug!(inserted, total = capsules.len(), "journal append");
        Ok(inserted)
    }

    pub fn load_capsule(&self, id: Uuid) -> Result<Option<Capsule>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM capsules WHERE id = ?1",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|b| decode_body(&b)).transpose()
    }

    /// Resolve a full id or a unique prefix of one.
    pub fn resolve_id(&self, prefix: &str) -> Result<Uuid> {
        let pattern = format!("{}%", prefix.replace(['%', '_'], ""));
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM capsules WHERE id LIKE ?1 LIMIT 2")?;
        let ids: Vec<String> = stmt
            .query_map([pattern], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        match ids.as_slice() {
            [one] => parse_uuid(one),
            [] => Err(StoreError::InvalidData(format!("no capsule matches '{prefix}'"))),
            _ => Err(StoreError::InvalidData(format!(
                "'{prefix}' matches more than one capsule"
            ))),
        }
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Capsule>> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM capsules ORDER BY seq DESC LIMIT ?1")?;
        let bodies: Vec<String> = stmt
            .query_map([limit as i64], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        bodies.iter().map(|b| decode_body(b)).collect()
    }

    /// Every capsule in journal order.
    pub fn all_capsules(&self) -> Result<Vec<Capsule>> {
        let mut stmt = self.conn.prepare("SELECT body FROM capsules ORDER BY seq")?;
        let bodies: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        bodies.iter().map(|b| decode_body(b)).collect()
    }

    /// Follow `prev_id` links back from `id`. Oldest first, ending at `id`.
    /// Stops at the first ancestor that is not journaled.
    pub fn lineage(&self, id: Uuid) -> Result<Vec<Capsule>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if !seen.insert(current) {
                tracing::warn!(%current, "lineage cycle");
                break;
            }
            match self.load_capsule(current)? {
                Some(capsule) => {
                    cursor = capsule.prev_id();
                    chain.push(capsule);
                }
                None => break,
            }
        }
        chain.reverse();
        Ok(chain)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM capsules", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Capsule counts per state, in state order. States with no capsules are omitted.
    pub fn count_by_state(&self) -> Result<Vec<(State, usize)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT state, COUNT(*) FROM capsules GROUP BY state")?;
        let rows: Vec<(i64, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;
        let mut counts: Vec<(State, usize)> = rows
            .into_iter()
            .map(|(code, n)| (State::from_code_lossy(code), n as usize))
            .collect();
        counts.sort_by_key(|(state, _)| *state);
        Ok(counts)
    }

    /// Transformed capsules per agent, most frequent first.
    pub fn count_by_agent(&self) -> Result<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT agent, COUNT(*) AS n FROM capsules WHERE agent IS NOT NULL
             GROUP BY agent ORDER BY n DESC, agent",
        )?;
        let rows: Vec<(String, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(rows.into_iter().map(|(a, n)| (a, n as usize)).collect())
    }

    /// Drop every capsule and the snapshot.
    pub fn clear(&self) -> Result<()> {
        self.conn.execute_batch(&format!(
            "DELETE FROM capsules; DELETE FROM metadata WHERE key = '{SNAPSHOT_KEY}';"
        ))?;
        Ok(())
    }
}

fn set_metadata_on(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn insert_capsule_on(conn: &Connection, capsule: &Capsule) -> Result<bool> {
    let body = serde_json::to_string(&capsule.encode())?;
    let agent = capsule
        .metadata
        .get("agent")
        .and_then(Value::as_str)
        .map(str::to_string);
    let changed = conn.execute(
        "INSERT OR IGNORE INTO capsules
            (id, prev_id, session_id, state, agent, timestamp, curvature, entropy, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            capsule.id().to_string(),
            capsule.prev_id().map(|id| id.to_string()),
            capsule.session_id,
            capsule.state.code(),
            agent,
            capsule.timestamp,
            capsule.curvature,
            capsule.entropy,
            body,
        ],
    )?;
    Ok(changed > 0)
}

fn decode_body(body: &str) -> Result<Capsule> {
    let map: Map<String, Value> = serde_json::from_str(body)?;
    Ok(Capsule::decode(&map))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::InvalidData(format!("invalid UUID '{s}': {e}")))
}
