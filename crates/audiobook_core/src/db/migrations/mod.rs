//! Library schema creation, upgrade, and destructive recreate.
//!
//! # Responsibility
//! - Create the `book`/`chapter`/`bookmark` tables on a fresh database.
//! - Upgrade recognized older layouts through a chain of versioned steps.
//! - Fall back to dropping and recreating all tables when the stored
//!   version has no upgrade path.
//!
//! # Invariants
//! - The stored version is read inside the same `BEGIN IMMEDIATE` transaction
//!   that changes the schema, so concurrent openers of one file serialize on
//!   the write lock and each step runs at most once.
//! - An upgrade plan is resolved completely before the first statement runs;
//!   an unknown version never leaves a half-migrated schema behind.
//! - Databases stamped with a version newer than `latest_version()` are never
//!   modified.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Layout before bookmarks existed: `book` without `active`, plus `chapter`.
const BASELINE_VERSION: u32 = 2;

const CREATE_SCHEMA_SQL: &str = include_str!("create.sql");

// Children first, the tables reference `book(id)`.
const DROP_SCHEMA_SQL: &str = "DROP TABLE IF EXISTS bookmark;
DROP TABLE IF EXISTS chapter;
DROP TABLE IF EXISTS book;";

#[derive(Debug, Clone, Copy)]
struct UpgradeStep {
    from: u32,
    to: u32,
    sql: &'static str,
}

const UPGRADE_STEPS: &[UpgradeStep] = &[
    UpgradeStep {
        from: 2,
        to: 3,
        sql: include_str!("0003_bookmarks.sql"),
    },
    UpgradeStep {
        from: 3,
        to: 4,
        sql: include_str!("0004_book_active.sql"),
    },
];

/// Raised when a stored schema version has no upgrade path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaUpgradeError {
    UnknownVersion { version: u32, latest: u32 },
}

impl Display for SchemaUpgradeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownVersion { version, latest } => write!(
                f,
                "no upgrade path from schema version {version} to {latest}"
            ),
        }
    }
}

impl Error for SchemaUpgradeError {}

/// Returns the schema version this binary creates and upgrades to.
pub fn latest_version() -> u32 {
    UPGRADE_STEPS.last().map_or(BASELINE_VERSION, |step| step.to)
}

/// Brings the library schema to `latest_version()`.
///
/// - Fresh database (`user_version = 0`): creates all tables.
/// - Recognized older version: runs [`upgrade`].
/// - Unrecognized older version: logs at error level, drops all three tables
///   and recreates them empty. Stored books are lost.
///
/// The decision and the change share one immediate transaction. A second
/// opener waits for the lock (bounded by the connection busy timeout) and
/// then sees the already-migrated version.
///
/// # Errors
/// - [`DbError::UnsupportedSchemaVersion`] when the database is newer than
///   this binary.
/// - [`DbError::Sqlite`] when any statement fails or the lock cannot be taken.
pub fn ensure_schema(conn: &mut Connection) -> DbResult<()> {
    let latest = latest_version();
    // Up-to-date files skip the write lock entirely.
    if current_user_version(conn)? == latest {
        return Ok(());
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current = current_user_version(&tx)?;
    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }
    if current == latest {
        return Ok(());
    }

    if current == 0 {
        tx.execute_batch(CREATE_SCHEMA_SQL)?;
        set_user_version(&tx, latest)?;
        tx.commit()?;
        info!("event=schema_create module=db status=ok version={latest}");
        return Ok(());
    }

    match upgrade(&tx, current) {
        Ok(()) => {
            tx.commit()?;
            info!("event=schema_upgrade module=db status=ok from_version={current} to_version={latest}");
            Ok(())
        }
        Err(DbError::SchemaUpgrade(err)) => {
            error!(
                "event=schema_recreate module=db status=error from_version={current} to_version={latest} error={err}"
            );
            recreate_schema(&tx)?;
            tx.commit()?;
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Applies every upgrade step from `old_version` to `latest_version()` inside
/// `tx`. The caller commits.
///
/// # Errors
/// - [`DbError::SchemaUpgrade`] when `old_version` is not part of the upgrade
///   chain. Nothing has been executed in that case.
pub fn upgrade(tx: &Transaction<'_>, old_version: u32) -> DbResult<()> {
    let plan = upgrade_plan(old_version)?;
    for step in plan {
        tx.execute_batch(step.sql)?;
        set_user_version(tx, step.to)?;
    }
    Ok(())
}

/// Drops `book`, `chapter` and `bookmark` and recreates them empty inside
/// `tx`. The caller commits.
pub fn recreate_schema(tx: &Transaction<'_>) -> DbResult<()> {
    tx.execute_batch(DROP_SCHEMA_SQL)?;
    tx.execute_batch(CREATE_SCHEMA_SQL)?;
    set_user_version(tx, latest_version())?;
    Ok(())
}

fn upgrade_plan(old_version: u32) -> Result<Vec<&'static UpgradeStep>, SchemaUpgradeError> {
    let latest = latest_version();
    let unknown = SchemaUpgradeError::UnknownVersion {
        version: old_version,
        latest,
    };
    if old_version > latest {
        return Err(unknown);
    }

    let mut plan = Vec::new();
    let mut version = old_version;
    while version < latest {
        let step = UPGRADE_STEPS
            .iter()
            .find(|step| step.from == version)
            .ok_or_else(|| unknown.clone())?;
        plan.push(step);
        version = step.to;
    }
    Ok(plan)
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn set_user_version(tx: &Transaction<'_>, version: u32) -> DbResult<()> {
    tx.execute_batch(&format!("PRAGMA user_version = {version};"))?;
    Ok(())
}
