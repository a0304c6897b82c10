//! Database manager for SQLite operations
//! Stores proxy hosts and the pattern rules that point at them

use crate::error::{PacError, Result};
use crate::model::{clean_host_ids, decode_host_ids, Host, HostConfig, HostInput, Rule};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

const HOST_COLUMNS: &str = "id, name, host, port, type";
const RULE_COLUMNS: &str = "id, pattern, host_ids, updated_at";

/// A rule as stored, with its numeric row id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleRecord {
    pub id: i64,
    pub pattern: String,
    #[serde(rename = "hostIds")]
    pub host_ids: Vec<u32>,
    pub updated_at: String,
}

impl From<RuleRecord> for Rule {
    fn from(record: RuleRecord) -> Self {
        Rule {
            pattern: record.pattern,
            host_ids: record.host_ids,
        }
    }
}

/// Thread-safe database manager for SQLite operations
/// Uses a Mutex to ensure only one thread accesses the connection at a time
pub struct DatabaseManager {
    conn: Mutex<Connection>,
    db_path: String,
}

impl DatabaseManager {
    /// Open (creating if needed) the database at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path)?;

        // Enable WAL mode so the admin CLI can write while the server reads
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let manager = Self {
            conn: Mutex::new(conn),
            db_path: db_path_str,
        };

        manager.initialize()?;

        Ok(manager)
    }

    /// Initialize the database schema
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS hosts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT DEFAULT NULL,
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                type TEXT NOT NULL DEFAULT 'PROXY',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pattern TEXT NOT NULL UNIQUE,
                host_ids TEXT NOT NULL DEFAULT '[]',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        Ok(())
    }

    /// Get the database path
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Insert a host, or replace the host with the same id
    pub fn upsert_host(&self, input: &HostInput) -> Result<Host> {
        input.validate()?;

        let conn = self.conn.lock();
        let proxy_type = input.proxy_type.unwrap_or_default();
        let name = input.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let host = input.host.trim();

        let id = match input.id {
            Some(id) => {
                conn.execute(
                    "INSERT INTO hosts (id, name, host, port, type)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                        name = excluded.name,
                        host = excluded.host,
                        port = excluded.port,
                        type = excluded.type,
                        updated_at = CURRENT_TIMESTAMP",
                    params![id, name, host, input.port, proxy_type.as_str()],
                )?;
                id
            }
            None => {
                conn.execute(
                    "INSERT INTO hosts (name, host, port, type) VALUES (?1, ?2, ?3, ?4)",
                    params![name, host, input.port, proxy_type.as_str()],
                )?;
                u32::try_from(conn.last_insert_rowid())
                    .map_err(|_| PacError::validation("host id space exhausted"))?
            }
        };

        debug!("Stored host {} ({} {}:{})", id, proxy_type, host, input.port);

        Ok(Host {
            id,
            name: name.map(str::to_string),
            host: host.to_string(),
            port: input.port as u16,
            proxy_type: Some(proxy_type),
        })
    }

    /// Get a host by id
    pub fn get_host(&self, id: u32) -> Result<Option<Host>> {
        let conn = self.conn.lock();

        let host = conn
            .query_row(
                &format!("SELECT {} FROM hosts WHERE id = ?1", HOST_COLUMNS),
                params![id],
                row_to_host,
            )
            .optional()?;

        Ok(host)
    }

    /// List all hosts ordered by id
    pub fn list_hosts(&self) -> Result<Vec<Host>> {
        let conn = self.conn.lock();
        query_hosts(&conn)
    }

    /// Delete a host. Refused while any rule still references it.
    pub fn delete_host(&self, id: u32) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let referencing: Vec<String> = query_rule_records(&tx)?
            .into_iter()
            .filter(|r| r.host_ids.contains(&id))
            .map(|r| r.pattern)
            .collect();

        if !referencing.is_empty() {
            return Err(PacError::HostInUse {
                id,
                patterns: referencing.join(", "),
            });
        }

        let affected = tx.execute("DELETE FROM hosts WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(PacError::HostNotFound { id });
        }

        tx.commit()?;
        debug!("Deleted host {}", id);

        Ok(())
    }

    /// Insert a rule, or replace the host ids of the rule with the same
    /// pattern. Every id must name an existing host.
    pub fn upsert_rule(&self, rule: &Rule) -> Result<Rule> {
        let host_ids = clean_host_ids(rule.host_ids.iter().copied());

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for id in &host_ids {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM hosts WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(PacError::validation(format!("unknown host id {}", id)));
            }
        }

        tx.execute(
            "INSERT INTO rules (pattern, host_ids) VALUES (?1, ?2)
             ON CONFLICT(pattern) DO UPDATE SET
                host_ids = excluded.host_ids,
                updated_at = CURRENT_TIMESTAMP",
            params![rule.pattern, serde_json::to_string(&host_ids)?],
        )?;
        tx.commit()?;

        debug!("Stored rule {} -> {:?}", rule.pattern, host_ids);

        Ok(Rule {
            pattern: rule.pattern.clone(),
            host_ids,
        })
    }

    /// Get a rule by pattern
    pub fn get_rule(&self, pattern: &str) -> Result<Option<Rule>> {
        let conn = self.conn.lock();

        let record = conn
            .query_row(
                &format!("SELECT {} FROM rules WHERE pattern = ?1", RULE_COLUMNS),
                params![pattern],
                row_to_rule_record,
            )
            .optional()?;

        Ok(record.map(Rule::from))
    }

    /// List rules in insertion order
    pub fn list_rules(&self) -> Result<Vec<Rule>> {
        Ok(self
            .list_rule_records()?
            .into_iter()
            .map(Rule::from)
            .collect())
    }

    /// List rules in insertion order, with row ids and timestamps
    pub fn list_rule_records(&self) -> Result<Vec<RuleRecord>> {
        let conn = self.conn.lock();
        query_rule_records(&conn)
    }

    /// Delete a rule by pattern
    pub fn delete_rule(&self, pattern: &str) -> Result<()> {
        let conn = self.conn.lock();

        let affected = conn.execute("DELETE FROM rules WHERE pattern = ?1", params![pattern])?;
        if affected == 0 {
            return Err(PacError::RuleNotFound {
                key: pattern.to_string(),
            });
        }

        debug!("Deleted rule {}", pattern);
        Ok(())
    }

    /// Delete a rule by its row id
    pub fn delete_rule_by_id(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock();

        let affected = conn.execute("DELETE FROM rules WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(PacError::RuleNotFound { key: id.to_string() });
        }

        debug!("Deleted rule #{}", id);
        Ok(())
    }

    /// Consistent snapshot of hosts and rules for resolution
    pub fn load_config(&self) -> Result<HostConfig> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let hosts = query_hosts(&tx)?;
        let rules = query_rule_records(&tx)?
            .into_iter()
            .map(Rule::from)
            .collect();

        tx.commit()?;

        Ok(HostConfig { hosts, rules })
    }
}

fn query_hosts(conn: &Connection) -> Result<Vec<Host>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM hosts ORDER BY id", HOST_COLUMNS))?;
    let hosts = stmt
        .query_map([], row_to_host)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(hosts)
}

fn query_rule_records(conn: &Connection) -> Result<Vec<RuleRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM rules ORDER BY id", RULE_COLUMNS))?;
    let rules = stmt
        .query_map([], row_to_rule_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rules)
}

fn row_to_host(row: &Row<'_>) -> rusqlite::Result<Host> {
    let proxy_type: Option<String> = row.get(4)?;

    Ok(Host {
        id: row.get(0)?,
        name: row.get(1)?,
        host: row.get(2)?,
        port: row.get(3)?,
        proxy_type: proxy_type.and_then(|t| t.parse().ok()),
    })
}

fn row_to_rule_record(row: &Row<'_>) -> rusqlite::Result<RuleRecord> {
    let raw: String = row.get(2)?;
    let value: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);

    Ok(RuleRecord {
        id: row.get(0)?,
        pattern: row.get(1)?,
        host_ids: decode_host_ids(&value),
        updated_at: row.get(3)?,
    })
}
