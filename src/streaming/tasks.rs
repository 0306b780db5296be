//! Worker task plumbing for chunk noise and meshing
//!
//! Producers run as blocking jobs on a dedicated tokio runtime; results come
//! back over an unbounded channel in completion order. Dispatch is throttled
//! by the scheduler, which also commits results on the controlling thread.

use std::collections::VecDeque;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::field::ScalarField;
use crate::mesh::MeshData;
use crate::streaming::chunk::ChunkCoord;

/// What a completed task produced
#[derive(Debug)]
pub enum TaskPayload {
    Noise(ScalarField),
    Mesh(MeshData),
}

/// Which producer a task ran for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    Noise,
    Mesh { lod: usize },
}

/// Identity a result is committed under: the chunk, the activation cycle it
/// was scheduled in, and the producer kind.
#[derive(Clone, Copy, Debug)]
pub struct TaskTag {
    pub coord: ChunkCoord,
    pub generation: u64,
    pub kind: TaskKind,
}

type Producer = Box<dyn FnOnce() -> Result<TaskPayload> + Send + 'static>;
type Completion = (TaskTag, Result<TaskPayload>);

/// FIFO task queue backed by a dedicated worker runtime.
///
/// `submit` only records the task; `dispatch` hands up to a budget of them
/// to the blocking pool. Completions are drained one at a time so commit
/// work is spread across ticks.
pub struct TaskQueue {
    pending: VecDeque<(TaskTag, Producer)>,
    result_tx: mpsc::UnboundedSender<Completion>,
    result_rx: mpsc::UnboundedReceiver<Completion>,
    runtime: Runtime,
}

impl TaskQueue {
    pub fn new() -> Result<Self> {
        let runtime = Runtime::new()
            .map_err(|e| Error::Streaming(format!("failed to start worker runtime: {e}")))?;
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        Ok(Self {
            pending: VecDeque::new(),
            result_tx,
            result_rx,
            runtime,
        })
    }

    /// Queue a producer for a later dispatch
    pub fn submit(
        &mut self,
        tag: TaskTag,
        producer: impl FnOnce() -> Result<TaskPayload> + Send + 'static,
    ) {
        self.pending.push_back((tag, Box::new(producer)));
    }

    /// Start up to `max` pending tasks on the worker pool; returns how many
    /// were started
    pub fn dispatch(&mut self, max: usize) -> usize {
        let mut started = 0;
        while started < max {
            let Some((tag, producer)) = self.pending.pop_front() else {
                break;
            };
            let tx = self.result_tx.clone();
            self.runtime.spawn(async move {
                let result = match tokio::task::spawn_blocking(producer).await {
                    Ok(output) => output,
                    Err(e) => Err(Error::Streaming(format!("worker task panicked: {e}"))),
                };
                // receiver gone means the queue is shutting down
                let _ = tx.send((tag, result));
            });
            started += 1;
        }
        started
    }

    /// Take the oldest completed result, if any (non-blocking)
    pub fn try_next_completed(&mut self) -> Option<Completion> {
        self.result_rx.try_recv().ok()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{IVec3, UVec3};
    use std::time::Duration;

    fn tag(kind: TaskKind) -> TaskTag {
        TaskTag {
            coord: IVec3::ZERO,
            generation: 0,
            kind,
        }
    }

    fn noise_task() -> impl FnOnce() -> Result<TaskPayload> + Send + 'static {
        || Ok(TaskPayload::Noise(ScalarField::new(UVec3::splat(2))))
    }

    fn drain_one(queue: &mut TaskQueue) -> Completion {
        for _ in 0..200 {
            if let Some(completion) = queue.try_next_completed() {
                return completion;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("task never completed");
    }

    #[test]
    fn test_dispatch_respects_budget() {
        let mut queue = TaskQueue::new().unwrap();
        for _ in 0..5 {
            queue.submit(tag(TaskKind::Noise), noise_task());
        }
        assert_eq!(queue.pending_count(), 5);
        assert_eq!(queue.dispatch(2), 2);
        assert_eq!(queue.pending_count(), 3);
        assert_eq!(queue.dispatch(10), 3);
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(queue.dispatch(10), 0);
    }

    #[test]
    fn test_completion_carries_tag() {
        let mut queue = TaskQueue::new().unwrap();
        queue.submit(
            TaskTag {
                coord: IVec3::new(1, 2, 3),
                generation: 9,
                kind: TaskKind::Mesh { lod: 2 },
            },
            || Ok(TaskPayload::Mesh(MeshData::default())),
        );
        queue.dispatch(1);

        let (tag, result) = drain_one(&mut queue);
        assert_eq!(tag.coord, IVec3::new(1, 2, 3));
        assert_eq!(tag.generation, 9);
        assert_eq!(tag.kind, TaskKind::Mesh { lod: 2 });
        assert!(matches!(result, Ok(TaskPayload::Mesh(_))));
    }

    #[test]
    fn test_failed_task_surfaces_as_err() {
        let mut queue = TaskQueue::new().unwrap();
        queue.submit(tag(TaskKind::Noise), || {
            Err(Error::Field("no samples".into()))
        });
        queue.dispatch(1);

        let (_, result) = drain_one(&mut queue);
        assert!(result.is_err());
    }
}
