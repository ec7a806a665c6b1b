//! Dedicated execution context for the settings database.
//!
//! The underlying store is not safe for concurrent access from arbitrary
//! threads, so a single OS thread owns the `Connection` and every read or
//! write is shipped to it as a closure. Observer callbacks, transfer
//! completions and manual commands all funnel through the same handle,
//! whichever runtime thread they happen to run on.
//!
//! A closure's writes are committed before its reply is sent, so an
//! awaited `call` that returned `Ok` is already durable.

use std::path::Path;
use std::sync::mpsc;
use std::thread;

use rusqlite::Connection;
use tokio::sync::oneshot;

use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Cloneable handle to the settings thread. The thread exits once the
/// last handle is dropped.
#[derive(Clone)]
pub struct SettingsContext {
    jobs: mpsc::Sender<Job>,
}

impl SettingsContext {
    /// Open (or create) the database at `path` and start the context thread.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = open_database(path)?;
        Self::spawn(conn)
    }

    /// In-memory variant (for testing).
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = open_memory_database()?;
        Self::spawn(conn)
    }

    fn spawn(conn: Connection) -> Result<Self, DatabaseError> {
        let (jobs, rx) = mpsc::channel::<Job>();

        thread::Builder::new()
            .name("settings-context".into())
            .spawn(move || {
                let mut conn = conn;
                while let Ok(job) = rx.recv() {
                    job(&mut conn);
                }
                tracing::debug!("Settings context stopped");
            })
            .map_err(|e| DatabaseError::ContextSpawn(e.to_string()))?;

        Ok(Self { jobs })
    }

    /// Run `f` on the settings thread and await its result.
    pub async fn call<T, F>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            // Receiver gone means the caller was cancelled; the work is done either way.
            let _ = reply_tx.send(f(conn));
        });

        self.jobs.send(job).map_err(|_| DatabaseError::ContextClosed)?;
        reply_rx.await.map_err(|_| DatabaseError::ContextClosed)?
    }
}
