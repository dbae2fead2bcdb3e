use crate::error::WarrenError;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

/// Routing key for a mutation: either the distinguished global lane or an
/// entity lane derived from the identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardKey {
    Global,
    Entity(String),
}

impl ShardKey {
    pub fn entity(id: impl Into<String>) -> Self {
        ShardKey::Entity(id.into())
    }
}

/// Total shard derivation: defined for every identifier, not only those
/// ending in a decimal digit. SplitMix64-style byte mixing for distribution.
pub fn shard_of(entity_id: &str, shards: usize) -> usize {
    debug_assert!(shards > 0);
    let mut h: u64 = 0x9e37_79b9_7f4a_7c15;
    for b in entity_id.bytes() {
        h = h.wrapping_add(u64::from(b));
        h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    }
    h = (h ^ (h >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h = (h ^ (h >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    ((h ^ (h >> 31)) % shards as u64) as usize
}

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Job {
    fut: BoxedTask,
    /// Abnormal-outcome channel: the worker reports a timeout or a panic
    /// here, since the task itself can no longer send its result.
    fail_tx: oneshot::Sender<WarrenError>,
}

fn lane_name(lane: usize) -> String {
    if lane == 0 {
        "global".to_string()
    } else {
        format!("entity-{}", lane - 1)
    }
}

/// N entity lanes plus one global lane, each an independent FIFO worker.
/// Exactly one task per lane runs at a time; lanes interleave freely. This is
/// the sole mutual-exclusion mechanism in the system; storage carries no
/// lock of its own.
///
/// A task that outlives the lane timeout is dropped at its next suspension
/// point and the lane advances. The abandoned waiter observes
/// `WarrenError::QueueTimeout`; a task that panics surfaces as
/// `WarrenError::TaskPanicked` instead.
pub struct ShardScheduler {
    lanes: Vec<mpsc::UnboundedSender<Job>>,
    entity_shards: usize,
    _workers: Vec<JoinHandle<()>>,
}

impl ShardScheduler {
    pub fn new(entity_shards: usize, task_timeout: Duration) -> Self {
        let entity_shards = entity_shards.max(1);
        let mut lanes = Vec::with_capacity(entity_shards + 1);
        let mut workers = Vec::with_capacity(entity_shards + 1);
        for lane in 0..entity_shards + 1 {
            let (tx, rx) = mpsc::unbounded_channel();
            lanes.push(tx);
            workers.push(Self::spawn_worker(lane, rx, task_timeout));
        }
        Self {
            lanes,
            entity_shards,
            _workers: workers,
        }
    }

    fn spawn_worker(
        lane: usize,
        mut rx: mpsc::UnboundedReceiver<Job>,
        task_timeout: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // Run the task isolated in its own tokio task so a panic
                // cannot take the lane down with it. The lane still waits for
                // completion before dequeuing the next job, preserving
                // per-shard exclusivity.
                let mut handle = tokio::spawn(job.fut);
                match tokio::time::timeout(task_timeout, &mut handle).await {
                    Ok(Ok(())) => {}
                    Ok(Err(join_err)) => {
                        warn!(lane, error = %join_err, "shard task panicked");
                        let _ = job.fail_tx.send(WarrenError::TaskPanicked {
                            shard: lane_name(lane),
                        });
                    }
                    Err(_elapsed) => {
                        handle.abort();
                        let _ = handle.await;
                        warn!(lane, "shard task exceeded timeout; dropped, lane advancing");
                        let _ = job.fail_tx.send(WarrenError::QueueTimeout {
                            shard: lane_name(lane),
                        });
                    }
                }
            }
        })
    }

    fn lane_index(&self, key: &ShardKey) -> usize {
        match key {
            ShardKey::Global => 0,
            ShardKey::Entity(id) => 1 + shard_of(id, self.entity_shards),
        }
    }

    /// Enqueue a task on the lane selected by `key` and await its result.
    ///
    /// Tasks enqueued on the same lane execute in strict submission order; a
    /// task `Err` propagates to its waiter and the lane advances. Every
    /// submission carries its own result channel, so identical textual keys
    /// never collide.
    pub async fn submit<T, F>(&self, key: ShardKey, task: F) -> Result<T, WarrenError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, WarrenError>> + Send + 'static,
    {
        let lane = self.lane_index(&key);
        let (result_tx, result_rx) = oneshot::channel();
        let (fail_tx, fail_rx) = oneshot::channel();
        let job = Job {
            fut: Box::pin(async move {
                let _ = result_tx.send(task.await);
            }),
            fail_tx,
        };
        self.lanes[lane]
            .send(job)
            .map_err(|_| WarrenError::QueueClosed)?;
        match result_rx.await {
            Ok(result) => result,
            // The task never sent a result: the worker reports whether it
            // timed out or panicked.
            Err(_) => Err(fail_rx.await.unwrap_or(WarrenError::QueueClosed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::shard_of;

    #[test]
    fn shard_derivation_is_total_and_in_range() {
        for id in ["", "123456789", "no-trailing-digit", "global", "ユーザー"] {
            assert!(shard_of(id, 10) < 10);
        }
        assert_eq!(shard_of("abc", 10), shard_of("abc", 10));
    }
}
