//! The coordinator loop.

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};
use scour_db::{Database, Lock, Snapshot};
use scour_types::{ConnId, DatasetId, IteratorId, TaskId, WorkerId};
use scour_wire as wire;
use scour_wire::{LockReply, Report};

use crate::error::{BrokerError, BrokerResult};
use crate::frontend::Frontend;
use crate::queue::WorkerQueue;
use crate::worker::{BackendReport, RetryPolicy, Worker, WorkerDispatch};

/// How long one loop iteration waits on either side.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Coordinator-side record of one worker.
#[derive(Debug)]
struct WorkerHandle {
    mailbox: Sender<WorkerDispatch>,
    task: Option<TaskId>,
    snap: Option<Arc<Snapshot>>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    fn is_busy(&self) -> bool {
        self.task.is_some()
    }
}

/// The single-threaded coordinator.
///
/// Owns the database, the worker pool and the frontend. Every mutation
/// of published database state happens on this thread, inside
/// [`Database::commit_task`]; lock grants are serialized here too, so
/// two workers can never both observe `LockOk` for one resource.
pub struct Broker<F: Frontend> {
    db: Arc<Database>,
    frontend: F,
    backend_rx: Receiver<BackendReport>,
    backend_tx: Sender<BackendReport>,
    workers: BTreeMap<WorkerId, WorkerHandle>,
    queue: WorkerQueue,
}

impl<F: Frontend> Broker<F> {
    /// Creates a broker and spawns `pool_size` worker threads.
    pub fn new(db: Arc<Database>, frontend: F, pool_size: usize) -> BrokerResult<Self> {
        let (backend_tx, backend_rx) = mpsc::channel();
        let mut broker = Self {
            db,
            frontend,
            backend_rx,
            backend_tx,
            workers: BTreeMap::new(),
            queue: WorkerQueue::new(),
        };
        for n in 0..pool_size {
            broker.spawn_worker(WorkerId::new(n.to_string()))?;
        }
        info!(workers = pool_size, "broker up");
        Ok(broker)
    }

    fn spawn_worker(&mut self, identity: WorkerId) -> BrokerResult<()> {
        let (mailbox_tx, mailbox_rx) = mpsc::channel();
        let worker = Worker::new(
            identity.clone(),
            self.backend_tx.clone(),
            mailbox_rx,
            RetryPolicy::default(),
        );
        let thread = std::thread::Builder::new()
            .name(format!("scour-worker-{identity}"))
            .spawn(move || worker.run())?;

        self.workers.insert(
            identity,
            WorkerHandle {
                mailbox: mailbox_tx,
                task: None,
                snap: None,
                thread: Some(thread),
            },
        );
        Ok(())
    }

    /// Registers a worker endpoint without spawning a thread.
    ///
    /// Tests drive such workers by hand through the returned mailbox.
    #[cfg(test)]
    pub(crate) fn register_worker(&mut self, identity: WorkerId) -> Receiver<WorkerDispatch> {
        let (mailbox_tx, mailbox_rx) = mpsc::channel();
        self.workers.insert(
            identity,
            WorkerHandle {
                mailbox: mailbox_tx,
                task: None,
                snap: None,
                thread: None,
            },
        );
        mailbox_rx
    }

    #[cfg(test)]
    pub(crate) fn backend_sender(&self) -> Sender<BackendReport> {
        self.backend_tx.clone()
    }

    #[cfg(test)]
    pub(crate) fn idle_workers(&self) -> usize {
        self.queue.len()
    }

    /// Runs the loop until the pool or frontend collapses.
    ///
    /// A single dead worker shrinks the pool and the loop continues;
    /// worker death is not detected or repaired beyond that.
    pub fn run(&mut self) -> BrokerResult<()> {
        loop {
            match self.run_iteration() {
                Ok(()) => {}
                Err(BrokerError::WorkerGone(worker)) => {
                    warn!(worker = %worker, remaining = self.workers.len(), "pool degraded");
                    if self.workers.is_empty() {
                        return Err(BrokerError::BackendClosed);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One loop iteration: at most one backend event, then at most one
    /// frontend dispatch, backend first.
    pub(crate) fn run_iteration(&mut self) -> BrokerResult<()> {
        if self.queue.is_empty() {
            // No idle worker: block on the backend only. Client requests
            // stay queued in the transport, which is the admission bound.
            match self.backend_rx.recv_timeout(POLL_INTERVAL) {
                Ok(report) => self.handle_backend(report)?,
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(BrokerError::BackendClosed)
                }
            }
            return Ok(());
        }

        match self.backend_rx.try_recv() {
            Ok(report) => self.handle_backend(report)?,
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return Err(BrokerError::BackendClosed),
        }

        if !self.queue.is_empty() {
            if let Some((conn, request)) = self.frontend.poll(POLL_INTERVAL)? {
                self.dispatch(conn, request)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Backend
    // ------------------------------------------------------------------

    fn handle_backend(&mut self, report: BackendReport) -> BrokerResult<()> {
        let identity = report.identity;
        match wire::decode_report(&report.frames)? {
            Report::Ready => {
                debug!(worker = %identity, "worker ready");
                self.queue.push(identity);
            }
            Report::Response { conn, reply } => {
                self.frontend.send(&conn, &reply)?;
                self.finish_task(&identity);
                self.queue.push(identity);
                self.collect_garbage();
            }
            Report::DatasetLockReq { names } => {
                let ids: Vec<DatasetId> = names.into_iter().map(DatasetId::new).collect();
                let granted = !ids.iter().any(|id| self.dataset_locked_elsewhere(&identity, id));
                if granted {
                    let locks: Vec<Lock> = ids.into_iter().map(Lock::Dataset).collect();
                    self.record_locks(&identity, &locks);
                    debug!(worker = %identity, "dataset locks granted");
                } else {
                    debug!(worker = %identity, "dataset locks denied");
                }
                self.reply_lock(&identity, granted)?;
            }
            Report::IteratorLockReq { name } => {
                let id = IteratorId::new(name);
                let granted = !self.iterator_locked_elsewhere(&identity, &id);
                if granted {
                    self.record_locks(&identity, &[Lock::Iterator(id)]);
                    debug!(worker = %identity, "iterator lock granted");
                } else {
                    debug!(worker = %identity, "iterator lock denied");
                }
                self.reply_lock(&identity, granted)?;
            }
        }
        Ok(())
    }

    /// Commits the worker's task and clears its busy state.
    fn finish_task(&mut self, identity: &WorkerId) {
        let handle = self
            .workers
            .get_mut(identity)
            .expect("response from unknown worker");
        let Some(task_id) = handle.task.take() else {
            panic!("response from worker {identity} with no task");
        };
        handle.snap = None;

        info!(task = %task_id, worker = %identity, "task finished");
        if let Err(e) = self.db.commit_task(task_id) {
            warn!(task = %task_id, error = %e, "commit failed");
        }
    }

    /// True if any *other* busy worker's snapshot holds this dataset lock.
    fn dataset_locked_elsewhere(&self, requester: &WorkerId, id: &DatasetId) -> bool {
        self.workers.iter().any(|(worker_id, handle)| {
            worker_id != requester
                && handle.is_busy()
                && handle
                    .snap
                    .as_ref()
                    .is_some_and(|snap| snap.is_dataset_locked(id))
        })
    }

    fn iterator_locked_elsewhere(&self, requester: &WorkerId, id: &IteratorId) -> bool {
        self.workers.iter().any(|(worker_id, handle)| {
            worker_id != requester
                && handle.is_busy()
                && handle
                    .snap
                    .as_ref()
                    .is_some_and(|snap| snap.is_iterator_locked(id))
        })
    }

    /// Records granted locks on the requesting worker's snapshot.
    fn record_locks(&self, identity: &WorkerId, locks: &[Lock]) {
        let handle = self
            .workers
            .get(identity)
            .expect("lock request from unknown worker");
        let snap = handle
            .snap
            .as_ref()
            .expect("lock request from a worker with no snapshot");
        snap.record_locks(locks);
    }

    fn reply_lock(&mut self, identity: &WorkerId, granted: bool) -> BrokerResult<()> {
        let reply = if granted {
            LockReply::Ok
        } else {
            LockReply::Denied
        };
        self.send_to_worker(identity, WorkerDispatch::LockReply(wire::encode_lock_reply(reply)))
    }

    /// GC with the snapshots of every busy worker as the live set.
    fn collect_garbage(&self) {
        let active: Vec<Arc<Snapshot>> = self
            .workers
            .values()
            .filter(|handle| handle.is_busy())
            .filter_map(|handle| handle.snap.clone())
            .collect();
        self.db.collect_garbage(&active);
    }

    // ------------------------------------------------------------------
    // Frontend
    // ------------------------------------------------------------------

    /// Dispatches one request to the LRU worker.
    fn dispatch(&mut self, conn: ConnId, request: String) -> BrokerResult<()> {
        let identity = self.queue.pop().expect("dispatch with an empty queue");

        let task = self.db.allocate_task(&request, conn.clone());
        let snap = self.db.snapshot();

        {
            let handle = self
                .workers
                .get_mut(&identity)
                .expect("queued worker must exist");
            handle.task = Some(task.id());
            handle.snap = Some(Arc::clone(&snap));
        }

        debug!(task = %task.id(), worker = %identity, "dispatching");
        let frames = wire::encode_dispatch(&conn, &request);
        let task_id = task.id();
        let result = self.send_to_worker(&identity, WorkerDispatch::Job { frames, task, snap });
        if result.is_err() {
            // The job never reached a worker: unregister the empty task
            // so `status` does not report it forever.
            let _ = self.db.commit_task(task_id);
        }
        result
    }

    fn send_to_worker(
        &mut self,
        identity: &WorkerId,
        dispatch: WorkerDispatch,
    ) -> BrokerResult<()> {
        let handle = self
            .workers
            .get_mut(identity)
            .expect("send to unknown worker");
        if handle.mailbox.send(dispatch).is_err() {
            // The worker thread died. Its task is never committed; its
            // snapshot drops with the handle, releasing its locks for GC.
            warn!(worker = %identity, "worker died; removing from pool");
            if let Some(thread) = handle.thread.take() {
                let _ = thread.join();
            }
            self.workers.remove(identity);
            return Err(BrokerError::WorkerGone(identity.clone()));
        }
        Ok(())
    }
}
