//! Startup configuration read from the environment.

use office_audit::{DEFAULT_RETENTION_DAYS, MIN_RETENTION_DAYS};
use office_types::{Role, User};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Backing store for tasks and audit rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub store: StoreKind,
    pub db_path: PathBuf,
    /// Users loaded into the in-memory directory.
    pub seed_users: Vec<User>,
    pub default_retention_days: u32,
}

impl ServerConfig {
    /// `OFFICE_LISTEN`, `OFFICE_STORE`, `OFFICE_DB_PATH`, `OFFICE_SEED_USERS`, `AUDIT_DEFAULT_RETENTION_DAYS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen = lookup("OFFICE_LISTEN")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "OFFICE_LISTEN",
                reason: e.to_string(),
            })?;

        let store = match lookup("OFFICE_STORE").as_deref().map(str::trim) {
            None | Some("") | Some("memory") => StoreKind::Memory,
            Some("sqlite") => StoreKind::Sqlite,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "OFFICE_STORE",
                    reason: format!("expected memory or sqlite, got {}", other),
                })
            }
        };

        let db_path = lookup("OFFICE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("office.db"));

        let seed_users = match lookup("OFFICE_SEED_USERS") {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
                key: "OFFICE_SEED_USERS",
                reason: e.to_string(),
            })?,
            None => default_users(),
        };

        let default_retention_days = match lookup("AUDIT_DEFAULT_RETENTION_DAYS") {
            Some(raw) => {
                let days: u32 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "AUDIT_DEFAULT_RETENTION_DAYS",
                    reason: format!("not a number: {}", raw),
                })?;
                if days < MIN_RETENTION_DAYS {
                    return Err(ConfigError::Invalid {
                        key: "AUDIT_DEFAULT_RETENTION_DAYS",
                        reason: format!("must be at least {}", MIN_RETENTION_DAYS),
                    });
                }
                days
            }
            None => DEFAULT_RETENTION_DAYS,
        };

        Ok(Self {
            listen,
            store,
            db_path,
            seed_users,
            default_retention_days,
        })
    }
}

/// One user per role.
pub fn default_users() -> Vec<User> {
    [
        (1, "Administrator", Role::Admin),
        (2, "Team Leader", Role::TeamLeader),
        (3, "Deputy", Role::Deputy),
        (4, "Secretary", Role::Secretary),
        (5, "Officer", Role::Officer),
    ]
    .into_iter()
    .map(|(id, name, role)| User {
        id,
        name: name.to_string(),
        role,
        is_active: true,
    })
    .collect()
}
