//! SQLite-backed settings store.
//!
//! Everything lives in one key/value table, `application_settings`. The
//! auto-role feature uses two keys: `auto_role_enabled` (`"true"` or
//! `"false"`) and `auto_roles` (a JSON array of [`AutoRole`]).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::autorole::{AutoRole, ConditionSpec};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS application_settings (
    key   TEXT PRIMARY KEY,
    value TEXT
);
";

pub const AUTO_ROLE_ENABLED_KEY: &str = "auto_role_enabled";
pub const AUTO_ROLES_KEY: &str = "auto_roles";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to encode settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Role is already in auto-roles list")]
    AlreadyExists,

    #[error("Role not found in auto-roles list")]
    NotFound,

    /// The stored `auto_roles` blob is not a JSON array; it is left untouched.
    #[error("stored auto-role list is unreadable: {0}")]
    CorruptBlob(String),

    #[error("settings store lock poisoned")]
    Poisoned,
}

/// Handle to the settings database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        debug!(path = %path.display(), "settings store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // -- raw settings ----------------------------------------------------------

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        read_setting(&conn, key)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        write_setting(&conn, key, value)
    }

    // -- feature flag ------------------------------------------------------------

    /// Disabled unless the stored flag is exactly `"true"`.
    pub fn autorole_enabled(&self) -> Result<bool, StoreError> {
        Ok(self.get_setting(AUTO_ROLE_ENABLED_KEY)?.as_deref() == Some("true"))
    }

    pub fn set_autorole_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.set_setting(AUTO_ROLE_ENABLED_KEY, if enabled { "true" } else { "false" })
    }

    // -- role list ---------------------------------------------------------------

    /// The configured roles. An unreadable blob reads as empty; an
    /// unreadable entry is skipped.
    pub fn auto_roles(&self) -> Result<Vec<AutoRole>, StoreError> {
        let conn = self.lock()?;
        match read_roles(&conn) {
            Ok(list) => Ok(list.roles),
            Err(StoreError::CorruptBlob(reason)) => {
                warn!(reason = %reason, "auto-role list is unreadable; treating as empty");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    pub fn auto_role(&self, role_id: &str) -> Result<Option<AutoRole>, StoreError> {
        Ok(self.auto_roles()?.into_iter().find(|r| r.id == role_id))
    }

    /// Append a role with no conditions.
    pub fn add_auto_role(&self, role_id: &str, role_name: &str) -> Result<(), StoreError> {
        self.update_roles(|roles| {
            if roles.iter().any(|r| r.id == role_id) {
                return Err(StoreError::AlreadyExists);
            }
            roles.push(AutoRole::new(role_id, role_name));
            Ok(())
        })
    }

    pub fn remove_auto_role(&self, role_id: &str) -> Result<(), StoreError> {
        self.update_roles(|roles| {
            let before = roles.len();
            roles.retain(|r| r.id != role_id);
            if roles.len() == before {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    /// Replace the whole condition map of one role.
    pub fn set_auto_role_conditions(
        &self,
        role_id: &str,
        conditions: BTreeMap<String, ConditionSpec>,
    ) -> Result<(), StoreError> {
        self.update_roles(|roles| {
            let role = roles
                .iter_mut()
                .find(|r| r.id == role_id)
                .ok_or(StoreError::NotFound)?;
            role.conditions = conditions;
            Ok(())
        })
    }

    /// Read-modify-write the role list under one lock.
    fn update_roles<F>(&self, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Vec<AutoRole>) -> Result<(), StoreError>,
    {
        let conn = self.lock()?;
        let RoleList {
            mut roles,
            unreadable,
        } = read_roles(&conn)?;
        mutate(&mut roles)?;

        let mut entries = roles
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        entries.extend(unreadable);
        let blob = serde_json::to_string(&entries)?;
        write_setting(&conn, AUTO_ROLES_KEY, &blob)
    }
}

fn read_setting(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    let value = conn
        .query_row(
            "SELECT value FROM application_settings WHERE key = ?1",
            params![key],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(value.flatten())
}

fn write_setting(conn: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO application_settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// The decoded `auto_roles` blob. Entries that are not a readable role are
/// carried verbatim so rewriting the list keeps them.
#[derive(Debug, Default)]
struct RoleList {
    roles: Vec<AutoRole>,
    unreadable: Vec<serde_json::Value>,
}

fn read_roles(conn: &Connection) -> Result<RoleList, StoreError> {
    let blob = match read_setting(conn, AUTO_ROLES_KEY)? {
        Some(blob) if !blob.trim().is_empty() => blob,
        _ => return Ok(RoleList::default()),
    };
    let entries: Vec<serde_json::Value> =
        serde_json::from_str(&blob).map_err(|err| StoreError::CorruptBlob(err.to_string()))?;

    let mut list = RoleList::default();
    for (index, entry) in entries.into_iter().enumerate() {
        match AutoRole::deserialize(&entry) {
            Ok(role) => list.roles.push(role),
            Err(err) => {
                warn!(index, error = %err, "skipping unreadable auto-role entry");
                list.unreadable.push(entry);
            }
        }
    }
    Ok(list)
}
