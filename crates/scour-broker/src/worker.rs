//! Worker threads.
//!
//! A worker's life is a loop over its mailbox: announce `Ready`, block
//! for a job, acquire whatever locks the command plans, execute, reply.
//! State machine: `Idle → Busy → AwaitingLocks? → Executing → Replying →
//! Idle`.
//!
//! Lock denials are retried with jittered exponential back-off until the
//! coordinator grants them; the holder commits in finite time, so the
//! retry loop terminates. A panic anywhere in execution kills only this
//! thread — the task is never committed and the pool shrinks by one.

use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};
use scour_db::{Lock, Snapshot, Task};
use scour_kernel::{dispatch_safe, parse_command, plan_locks};
use scour_types::{ConnId, WorkerId};
use scour_wire as wire;
use scour_wire::{LockReply, Multipart};

/// Coordinator-to-worker messages.
#[derive(Debug)]
pub enum WorkerDispatch {
    /// A job: the dispatch frames plus the task and snapshot handles.
    Job {
        frames: Multipart,
        task: Arc<Task>,
        snap: Arc<Snapshot>,
    },
    /// Reply to an in-flight lock request.
    LockReply(Multipart),
}

/// Worker-to-coordinator messages: the identity plus encoded frames.
#[derive(Debug)]
pub struct BackendReport {
    pub identity: WorkerId,
    pub frames: Multipart,
}

/// Back-off policy for denied lock requests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// First delay after a denial.
    pub base: Duration,
    /// Ceiling the delay doubles up to.
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(10),
            max: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before the `attempt`-th retry (0-based), with jitter.
    fn delay(&self, attempt: u32) -> Duration {
        let doubled = self
            .base
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max);
        let jitter = rand::thread_rng().gen_range(0..=doubled.as_millis() as u64 / 2);
        doubled + Duration::from_millis(jitter)
    }
}

/// One worker of the pool.
#[derive(Debug)]
pub struct Worker {
    identity: WorkerId,
    backend: Sender<BackendReport>,
    mailbox: Receiver<WorkerDispatch>,
    retry: RetryPolicy,
}

impl Worker {
    pub fn new(
        identity: WorkerId,
        backend: Sender<BackendReport>,
        mailbox: Receiver<WorkerDispatch>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            identity,
            backend,
            mailbox,
            retry,
        }
    }

    /// Runs the worker loop until the coordinator hangs up.
    pub fn run(self) {
        info!(worker = %self.identity, "worker up");
        self.report(wire::encode_ready());

        while let Ok(dispatch) = self.mailbox.recv() {
            let WorkerDispatch::Job { frames, task, snap } = dispatch else {
                // A lock reply with no request in flight means the
                // coordinator and this worker disagree about state.
                panic!("worker {}: lock reply while idle", self.identity);
            };

            let (conn, request) =
                wire::decode_dispatch(&frames).expect("malformed dispatch from coordinator");
            let reply = self.serve(&conn, &request, &task, &snap);
            self.report(wire::encode_response(&conn, reply.as_bytes()));
        }

        info!(worker = %self.identity, "worker mailbox closed");
    }

    /// Busy → AwaitingLocks? → Executing: returns the reply text.
    fn serve(&self, conn: &ConnId, request: &str, task: &Task, snap: &Snapshot) -> String {
        debug!(worker = %self.identity, task = %task.id(), conn = %conn, "job received");

        // Lock planning needs the parsed command; a request that does not
        // parse plans nothing and lets dispatch_safe produce the error.
        if let Ok(cmd) = parse_command(request) {
            let locks = plan_locks(&cmd, snap);
            self.acquire_locks(&locks);
        }

        dispatch_safe(request, task, snap).to_text()
    }

    /// Blocks until the coordinator grants every planned lock.
    ///
    /// Dataset locks go out as one all-or-nothing request; the iterator
    /// lock is singular by construction.
    fn acquire_locks(&self, locks: &[Lock]) {
        let datasets: Vec<&str> = locks
            .iter()
            .filter_map(|lock| match lock {
                Lock::Dataset(id) => Some(id.as_str()),
                Lock::Iterator(_) => None,
            })
            .collect();
        if !datasets.is_empty() {
            self.acquire(wire::encode_dataset_lock_req(&datasets));
        }

        for lock in locks {
            if let Lock::Iterator(id) = lock {
                self.acquire(wire::encode_iterator_lock_req(id.as_str()));
            }
        }
    }

    fn acquire(&self, request: Multipart) {
        let mut attempt = 0u32;
        loop {
            self.report(request.clone());
            let reply = match self.mailbox.recv() {
                Ok(WorkerDispatch::LockReply(frames)) => wire::decode_lock_reply(&frames)
                    .expect("malformed lock reply from coordinator"),
                Ok(WorkerDispatch::Job { .. }) => {
                    panic!("worker {}: job while awaiting lock reply", self.identity)
                }
                Err(_) => {
                    // Coordinator is gone; nothing left to serve.
                    warn!(worker = %self.identity, "coordinator hung up during lock wait");
                    return;
                }
            };

            match reply {
                LockReply::Ok => return,
                LockReply::Denied => {
                    let delay = self.retry.delay(attempt);
                    debug!(
                        worker = %self.identity,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "lock denied, backing off"
                    );
                    std::thread::sleep(delay);
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    fn report(&self, frames: Multipart) {
        if self
            .backend
            .send(BackendReport {
                identity: self.identity.clone(),
                frames,
            })
            .is_err()
        {
            warn!(worker = %self.identity, "backend channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_up_to_the_ceiling() {
        let policy = RetryPolicy {
            base: Duration::from_millis(10),
            max: Duration::from_millis(80),
        };
        // Jitter adds at most half the doubled delay.
        for attempt in 0..10 {
            let delay = policy.delay(attempt);
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(120));
        }
    }
}
