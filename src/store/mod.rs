use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;

mod migrations;

use crate::models::VideoContext;
use migrations::run_migrations;

/// The store holds at most one record: the current video, under this key.
const CURRENT_KEY: &str = "currentVideo";

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreCommand {
    Execute(StoreTask),
    Shutdown,
}

struct StoreInner {
    sender: mpsc::Sender<StoreCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(StoreCommand::Shutdown) {
                error!("Failed to send shutdown to store thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join store thread: {join_err:?}");
            }
        }
    }
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

/// Durable single-record mirror of the current VideoContext. Single-writer by
/// convention (only the coordinator writes), multi-reader. A dedicated worker
/// thread owns the SQLite connection; callers get an async facade.
#[derive(Clone)]
pub struct VideoStore {
    inner: Arc<StoreInner>,
    db_path: Arc<PathBuf>,
}

impl VideoStore {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create store directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("tubechat-store".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run store migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("Store initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StoreCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        StoreCommand::Shutdown => break,
                    }
                }

                info!("Store thread shutting down");
            })
            .with_context(|| "failed to spawn store worker thread")?;

        ready_rx
            .recv()
            .context("store worker exited before signaling readiness")??;

        info!("Video store initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(StoreInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = StoreCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("Store caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to store thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("store thread terminated unexpectedly"))?
    }

    /// Replace the stored record wholesale. There is no merge: a detection of
    /// a new video supersedes everything known about the previous one.
    pub async fn set_current_video(&self, context: &VideoContext) -> Result<()> {
        let record = context.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO current_video (key, video_id, video_title, url, detected_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(key) DO UPDATE SET
                     video_id = excluded.video_id,
                     video_title = excluded.video_title,
                     url = excluded.url,
                     detected_at = excluded.detected_at",
                params![
                    CURRENT_KEY,
                    record.video_id,
                    record.video_title,
                    record.url,
                    record.detected_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to store current video")?;
            Ok(())
        })
        .await
    }

    pub async fn clear_current_video(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute(
                "DELETE FROM current_video WHERE key = ?1",
                params![CURRENT_KEY],
            )
            .with_context(|| "failed to clear current video")?;
            Ok(())
        })
        .await
    }

    pub async fn get_current_video(&self) -> Result<Option<VideoContext>> {
        self.execute(|conn| {
            let row = conn
                .query_row(
                    "SELECT video_id, video_title, url, detected_at
                     FROM current_video
                     WHERE key = ?1",
                    params![CURRENT_KEY],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()
                .with_context(|| "failed to read current video")?;

            row.map(|(video_id, video_title, url, detected_at)| {
                Ok(VideoContext {
                    video_id,
                    video_title,
                    url,
                    detected_at: parse_datetime(&detected_at)?,
                })
            })
            .transpose()
        })
        .await
    }
}
