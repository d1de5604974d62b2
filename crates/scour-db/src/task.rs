//! Live tasks and the task registry.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use scour_types::{ConnId, TaskId, TaskSpec};

use crate::change::DbChange;

/// One in-flight client request.
///
/// A task is created by the database when a request is accepted and
/// handed to exactly one worker. The worker appends pending changes
/// while executing; the database drains them at commit. The registry
/// keeps a second handle only so `status` can list live tasks.
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    conn: ConnId,
    request: String,
    changes: Mutex<Vec<DbChange>>,
}

impl Task {
    pub fn new(id: TaskId, conn: ConnId, request: String) -> Self {
        Self {
            id,
            conn,
            request,
            changes: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn conn(&self) -> &ConnId {
        &self.conn
    }

    pub fn request(&self) -> &str {
        &self.request
    }

    /// Appends a pending change.
    pub fn record(&self, change: DbChange) {
        self.changes.lock().expect("task changes poisoned").push(change);
    }

    /// Number of pending changes.
    pub fn change_count(&self) -> usize {
        self.changes.lock().expect("task changes poisoned").len()
    }

    /// Takes every pending change, leaving the task empty.
    pub fn drain_changes(&self) -> Vec<DbChange> {
        std::mem::take(&mut *self.changes.lock().expect("task changes poisoned"))
    }

    /// Display form: id plus hex connection id.
    pub fn spec(&self) -> TaskSpec {
        TaskSpec::new(self.id, self.conn.to_hex(), self.request.clone())
    }
}

/// Registry of live tasks, shared between the database and snapshots.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<BTreeMap<TaskId, Arc<Task>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: Arc<Task>) {
        self.tasks
            .write()
            .expect("task registry poisoned")
            .insert(task.id(), task);
    }

    pub fn remove(&self, id: TaskId) -> Option<Arc<Task>> {
        self.tasks.write().expect("task registry poisoned").remove(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.read().expect("task registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Specs of every live task, in id order.
    pub fn specs(&self) -> Vec<TaskSpec> {
        self.tasks
            .read()
            .expect("task registry poisoned")
            .values()
            .map(|task| task.spec())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u64) -> Arc<Task> {
        Arc::new(Task::new(
            TaskId::new(id),
            ConnId::from(&[id as u8][..]),
            format!("ping ; #{id}"),
        ))
    }

    #[test]
    fn record_and_drain() {
        let t = task(1);
        t.record(DbChange::Drop("set_x".into()));
        assert_eq!(t.change_count(), 1);

        let drained = t.drain_changes();
        assert_eq!(drained.len(), 1);
        assert_eq!(t.change_count(), 0);
    }

    #[test]
    fn registry_lists_specs_in_id_order() {
        let registry = TaskRegistry::new();
        registry.insert(task(2));
        registry.insert(task(1));

        let specs = registry.specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].id, TaskId::new(1));
        assert_eq!(specs[1].id, TaskId::new(2));
        assert_eq!(specs[0].connection, "01");
    }

    #[test]
    fn remove_unregisters() {
        let registry = TaskRegistry::new();
        registry.insert(task(5));
        assert!(registry.remove(TaskId::new(5)).is_some());
        assert!(registry.remove(TaskId::new(5)).is_none());
        assert!(registry.is_empty());
    }
}
