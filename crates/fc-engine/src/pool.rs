//! Persistent render worker pool.
//!
//! Workers are spawned once and live for the pool's lifetime; each
//! render call hands out per-container fill jobs over a bounded
//! crossbeam channel and join-barriers on the results before the mix
//! runs. Containers are disjoint, so workers lock them individually
//! and never contend on the same chip.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender};
use fc_ir::MAX_CHIPS;
use tracing::warn;

use crate::container::DispatchContainer;

/// The container table workers index into.
pub type SharedContainers = Arc<Vec<Mutex<DispatchContainer>>>;

enum WorkItem {
    Fill { index: usize, want: usize, offset: usize },
    Shutdown,
}

struct Worker {
    thread: Option<JoinHandle<()>>,
}

pub struct RenderPool {
    workers: Vec<Worker>,
    work_tx: Sender<WorkItem>,
    done_rx: Receiver<usize>,
}

impl RenderPool {
    /// Spawn `size` workers over a shared container table. Size 0 means
    /// every render call runs serially on the caller's thread.
    pub fn new(size: usize, containers: &SharedContainers) -> Self {
        let (work_tx, work_rx) = bounded::<WorkItem>(MAX_CHIPS);
        let (done_tx, done_rx) = bounded::<usize>(MAX_CHIPS);

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let rx = work_rx.clone();
            let tx = done_tx.clone();
            let table = Arc::clone(containers);
            let spawned = thread::Builder::new()
                .name(format!("fc-render-{id}"))
                .spawn(move || Self::run(rx, tx, table));
            match spawned {
                Ok(t) => workers.push(Worker { thread: Some(t) }),
                Err(e) => warn!(worker = id, error = %e, "failed to spawn render worker"),
            }
        }

        Self { workers, work_tx, done_rx }
    }

    fn run(rx: Receiver<WorkItem>, tx: Sender<usize>, table: SharedContainers) {
        while let Ok(item) = rx.recv() {
            match item {
                WorkItem::Fill { index, want, offset } => {
                    if let Some(slot) = table.get(index) {
                        if let Ok(mut container) = slot.lock() {
                            container.fill_buf(want, offset);
                        }
                    }
                    if tx.send(index).is_err() {
                        break;
                    }
                }
                WorkItem::Shutdown => break,
            }
        }
    }

    /// Fill `want` output samples at `offset` on every container,
    /// returning once all of them are done.
    pub fn render(&self, containers: &SharedContainers, want: usize, offset: usize) {
        if self.workers.is_empty() {
            for slot in containers.iter() {
                if let Ok(mut container) = slot.lock() {
                    container.fill_buf(want, offset);
                }
            }
            return;
        }

        let mut sent = 0;
        for index in 0..containers.len() {
            if self.work_tx.send(WorkItem::Fill { index, want, offset }).is_ok() {
                sent += 1;
            }
        }
        for _ in 0..sent {
            if self.done_rx.recv().is_err() {
                break;
            }
        }
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for RenderPool {
    fn drop(&mut self) {
        for _ in 0..self.workers.len() {
            let _ = self.work_tx.send(WorkItem::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
    }
}
