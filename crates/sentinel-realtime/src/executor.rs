//! Per-user single-writer executor.
//!
//! Every piece of hub state keyed by user lives inside one shard task.
//! Callers never touch the state directly: they send a closure to the shard
//! that owns the key and await its result. Closures run to completion one at
//! a time, so all mutation for a given user is linearized without locks.
//!
//! Closures must not block; anything that awaits (sending to a connection,
//! asking the identity provider) happens in the caller before or after.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use sentinel_core::error::AppError;
use sentinel_core::result::AppResult;
use sentinel_core::types::UserId;

/// Queue depth per shard before callers are back-pressured.
const SHARD_QUEUE_DEPTH: usize = 1024;

/// State held per user inside an executor shard.
pub trait KeyedState: Default + Send + 'static {
    /// Whether the entry carries nothing worth keeping. Idle entries are
    /// dropped after every job.
    fn is_idle(&self) -> bool;
}

type KeyedJob<S> = Box<dyn FnOnce(&mut S) + Send>;
type ShardJob<S> = Box<dyn FnOnce(&mut HashMap<UserId, S>) + Send>;

enum Command<S> {
    Keyed { key: UserId, job: KeyedJob<S> },
    Shard(ShardJob<S>),
}

/// Handle to a set of shard tasks. Cheap to clone.
pub struct KeyedExecutor<S: KeyedState> {
    name: &'static str,
    shards: Arc<Vec<mpsc::Sender<Command<S>>>>,
}

impl<S: KeyedState> Clone for KeyedExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            shards: Arc::clone(&self.shards),
        }
    }
}

impl<S: KeyedState> std::fmt::Debug for KeyedExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedExecutor")
            .field("name", &self.name)
            .field("shards", &self.shards.len())
            .finish()
    }
}

impl<S: KeyedState> KeyedExecutor<S> {
    /// Spawn `shard_count` shard tasks that stop when `shutdown` is cancelled.
    pub fn spawn(name: &'static str, shard_count: usize, shutdown: CancellationToken) -> Self {
        let shard_count = shard_count.max(1);
        let mut shards = Vec::with_capacity(shard_count);
        for index in 0..shard_count {
            let (tx, rx) = mpsc::channel(SHARD_QUEUE_DEPTH);
            tokio::spawn(run_shard(name, index, rx, shutdown.clone()));
            shards.push(tx);
        }
        Self {
            name,
            shards: Arc::new(shards),
        }
    }

    fn shard_for(&self, key: &UserId) -> &mpsc::Sender<Command<S>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    /// Run `f` against the state of `key`, serialized with every other job
    /// for the same key.
    pub async fn run<R, F>(&self, key: &UserId, f: F) -> AppResult<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: KeyedJob<S> = Box::new(move |state| {
            let _ = tx.send(f(state));
        });
        self.shard_for(key)
            .send(Command::Keyed {
                key: key.clone(),
                job,
            })
            .await
            .map_err(|_| self.stopped())?;
        rx.await
            .map_err(|_| AppError::internal(format!("{} executor dropped a job", self.name)))
    }

    /// Run `f` once on every shard's full map, e.g. for periodic sweeps.
    ///
    /// Each shard is serialized with its own keyed jobs; shards are visited
    /// independently, so the combined result is not a global snapshot.
    pub async fn run_all<R, F>(&self, f: F) -> AppResult<Vec<R>>
    where
        F: Fn(&mut HashMap<UserId, S>) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        let f = Arc::new(f);
        let mut replies = Vec::with_capacity(self.shards.len());
        for shard in self.shards.iter() {
            let (tx, rx) = oneshot::channel();
            let f = Arc::clone(&f);
            let job: ShardJob<S> = Box::new(move |states| {
                let _ = tx.send(f(states));
            });
            shard
                .send(Command::Shard(job))
                .await
                .map_err(|_| self.stopped())?;
            replies.push(rx);
        }

        let mut results = Vec::with_capacity(replies.len());
        for rx in replies {
            results.push(rx.await.map_err(|_| {
                AppError::internal(format!("{} executor dropped a sweep", self.name))
            })?);
        }
        Ok(results)
    }

    fn stopped(&self) -> AppError {
        AppError::service_unavailable(format!("{} executor is shut down", self.name))
    }
}

async fn run_shard<S: KeyedState>(
    name: &'static str,
    index: usize,
    mut rx: mpsc::Receiver<Command<S>>,
    shutdown: CancellationToken,
) {
    let mut states: HashMap<UserId, S> = HashMap::new();

    loop {
        let command = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            command = rx.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            Command::Keyed { key, job } => {
                let idle = {
                    let state = states.entry(key.clone()).or_default();
                    job(state);
                    state.is_idle()
                };
                if idle {
                    states.remove(&key);
                }
            }
            Command::Shard(job) => {
                job(&mut states);
                states.retain(|_, state| !state.is_idle());
            }
        }
    }

    debug!(executor = name, shard = index, "Executor shard stopped");
}
