//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open a library file through `audiobook_core` and print a summary.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `audiobook_cli [DB_PATH]`. Without an argument the path comes from
//! `AUDIOBOOK_DB_PATH`, then falls back to the temp directory. Logging is
//! enabled when `AUDIOBOOK_LOG_DIR` names an absolute directory.

use audiobook_core::{default_log_level, init_logging, LibraryManager, NoopNotifier};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_DB_FILE_NAME: &str = "audiobook_library.sqlite3";

fn main() -> ExitCode {
    if let Some(log_dir) = env_value("AUDIOBOOK_LOG_DIR") {
        let level = env_value("AUDIOBOOK_LOG_LEVEL")
            .unwrap_or_else(|| default_log_level().to_string());
        if let Err(err) = init_logging(&level, &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    let db_path = resolve_db_path();
    let library = match LibraryManager::open(&db_path, NoopNotifier) {
        Ok(library) => library,
        Err(err) => {
            error!("event=cli_open module=cli status=error error={err}");
            eprintln!("failed to open library `{}`: {err}", db_path.display());
            return ExitCode::FAILURE;
        }
    };

    let (active, orphaned) = match (library.list_active(), library.list_orphaned()) {
        (Ok(active), Ok(orphaned)) => (active, orphaned),
        (Err(err), _) | (_, Err(err)) => {
            eprintln!("failed to read library: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("audiobook_core version={}", audiobook_core::core_version());
    println!("library={}", db_path.display());
    println!("active={} orphaned={}", active.len(), orphaned.len());
    for book in &active {
        println!(
            "  [{}] {} chapters={} bookmarks={}",
            book.id.unwrap_or_default(),
            book.name,
            book.chapters.len(),
            book.bookmarks.len()
        );
    }
    ExitCode::SUCCESS
}

fn resolve_db_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| env_value("AUDIOBOOK_DB_PATH"))
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_DB_FILE_NAME))
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}
