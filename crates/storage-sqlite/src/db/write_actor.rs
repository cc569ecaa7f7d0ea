use super::DbPool;
use crate::errors::{Result, StorageError};
use diesel::SqliteConnection;
use log::{error, info};
use std::any::Any;
use tokio::sync::{mpsc, oneshot};

// A write job runs on the actor's connection inside an immediate transaction.
type Job<T> = Box<dyn FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static>;

type AnyResult = Result<Box<dyn Any + Send + 'static>>;

/// Bound on queued write jobs.
const QUEUE_CAPACITY: usize = 1024;

/// Handle for sending jobs to the writer actor.
#[derive(Clone)]
pub struct WriteHandle {
    // Each job is a boxed closure with a oneshot sender for the reply.
    // The return type is erased to Box<dyn Any + Send>.
    tx: mpsc::Sender<(Job<Box<dyn Any + Send + 'static>>, oneshot::Sender<AnyResult>)>,
}

impl WriteHandle {
    /// Executes a database job on the writer actor's dedicated connection.
    ///
    /// Jobs run one at a time, in the order they were sent, each inside its
    /// own immediate transaction.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static + Any,
    {
        let (ret_tx, ret_rx) = oneshot::channel();

        self.tx
            .send((
                Box::new(move |c| job(c).map(|v| Box::new(v) as Box<dyn Any + Send>)),
                ret_tx,
            ))
            .await
            .map_err(|_| StorageError::WriterUnavailable("writer actor has stopped".to_string()))?;

        let boxed = ret_rx.await.map_err(|_| {
            StorageError::WriterUnavailable("writer actor dropped the reply".to_string())
        })??;

        boxed
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| StorageError::WriterUnavailable("unexpected writer result type".to_string()))
    }
}

/// Spawns a background Tokio task that acts as a single writer to the database.
/// This actor owns one database connection from the pool and processes write jobs serially.
///
/// The connection is checked out before the task starts, so a pool that
/// cannot hand out a connection is reported here instead of on first write.
pub fn spawn_writer(pool: DbPool) -> Result<WriteHandle> {
    let mut conn = pool.get()?;
    let (tx, mut rx) =
        mpsc::channel::<(Job<Box<dyn Any + Send + 'static>>, oneshot::Sender<AnyResult>)>(
            QUEUE_CAPACITY,
        );

    tokio::spawn(async move {
        info!("Database writer started");

        while let Some((job, reply_tx)) = rx.recv().await {
            let result: AnyResult = conn.immediate_transaction::<_, StorageError, _>(job);
            if let Err(e) = &result {
                error!("Database write failed: {}", e);
            }

            // The requester may have gone away; nothing to do then.
            let _ = reply_tx.send(result);
        }

        info!("Database writer stopped");
    });

    Ok(WriteHandle { tx })
}
