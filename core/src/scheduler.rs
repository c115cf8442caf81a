/*
 * scheduler.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Spool, an asynchronous HTTP client.
 *
 * Spool is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Spool is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Spool.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Task registry over tokio's local task set.
//!
//! Tasks are spawned with `spawn_local`, so a `Scheduler` must be used from inside a
//! `LocalSet`. The registry records each task's state, an orchestrator-defined custom
//! state, opaque user data and the terminal outcome until it is collected.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::{Rc, Weak};

use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub type TaskId = u64;

tokio::task_local! {
    static CURRENT_TASK: TaskId;
}

/// Id of the scheduled task currently running, if called from inside one.
pub fn current_task() -> Option<TaskId> {
    CURRENT_TASK.try_with(|id| *id).ok()
}

/// Scheduler-side lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, not yet polled.
    Pending,
    Running,
    Completed,
    Erred,
}

/// Orchestrator tag carried alongside the scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomState {
    Beginning,
    Started,
    Ended,
    Aborted,
}

struct Entry<T, E> {
    state: TaskState,
    custom: Option<CustomState>,
    data: Option<Box<dyn Any>>,
    outcome: Option<Result<T, E>>,
    handle: Option<JoinHandle<()>>,
}

struct Registry<T, E> {
    next_id: TaskId,
    tasks: HashMap<TaskId, Entry<T, E>>,
}

impl<T, E> Registry<T, E> {
    fn mark_running(&mut self, id: TaskId) {
        if let Some(entry) = self.tasks.get_mut(&id) {
            if entry.state == TaskState::Pending {
                entry.state = TaskState::Running;
            }
        }
    }

    fn settle(&mut self, id: TaskId, outcome: Option<Result<T, E>>) {
        if let Some(entry) = self.tasks.get_mut(&id) {
            entry.state = match &outcome {
                Some(Ok(_)) => TaskState::Completed,
                _ => TaskState::Erred,
            };
            entry.outcome = outcome;
        }
    }
}

/// Marks the task erred if its future is dropped before settling (panic or abort).
struct SettleGuard<T, E> {
    id: TaskId,
    registry: Weak<RefCell<Registry<T, E>>>,
    notify: Rc<Notify>,
    armed: bool,
}

impl<T, E> Drop for SettleGuard<T, E> {
    fn drop(&mut self) {
        if self.armed {
            if let Some(registry) = self.registry.upgrade() {
                if let Ok(mut reg) = registry.try_borrow_mut() {
                    reg.settle(self.id, None);
                }
            }
        }
        self.notify.notify_waiters();
    }
}

pub struct Scheduler<T, E> {
    registry: Rc<RefCell<Registry<T, E>>>,
    notify: Rc<Notify>,
}

impl<T: 'static, E: 'static> Scheduler<T, E> {
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                next_id: 0,
                tasks: HashMap::new(),
            })),
            notify: Rc::new(Notify::new()),
        }
    }

    /// Spawn `future` on the local task set and register it.
    pub fn create_task<F>(&self, future: F) -> TaskId
    where
        F: Future<Output = Result<T, E>> + 'static,
    {
        let id = {
            let mut reg = self.registry.borrow_mut();
            reg.next_id += 1;
            let id = reg.next_id;
            reg.tasks.insert(
                id,
                Entry {
                    state: TaskState::Pending,
                    custom: None,
                    data: None,
                    outcome: None,
                    handle: None,
                },
            );
            id
        };
        let registry = Rc::downgrade(&self.registry);
        let notify = self.notify.clone();
        let handle = tokio::task::spawn_local(CURRENT_TASK.scope(id, async move {
            let mut guard = SettleGuard {
                id,
                registry: registry.clone(),
                notify,
                armed: true,
            };
            if let Some(reg) = registry.upgrade() {
                reg.borrow_mut().mark_running(id);
            }
            let outcome = future.await;
            guard.armed = false;
            if let Some(reg) = registry.upgrade() {
                reg.borrow_mut().settle(id, Some(outcome));
            }
        }));
        if let Some(entry) = self.registry.borrow_mut().tasks.get_mut(&id) {
            entry.handle = Some(handle);
        }
        id
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.registry.borrow().tasks.contains_key(&id)
    }

    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.registry.borrow().tasks.get(&id).map(|e| e.state)
    }

    /// Ids of tasks that have not settled.
    pub fn running(&self) -> Vec<TaskId> {
        self.ids_where(|s| matches!(s, TaskState::Pending | TaskState::Running))
    }

    /// Ids of tasks that settled successfully and are not yet collected.
    pub fn completed(&self) -> Vec<TaskId> {
        self.ids_where(|s| s == TaskState::Completed)
    }

    fn ids_where(&self, pred: impl Fn(TaskState) -> bool) -> Vec<TaskId> {
        let reg = self.registry.borrow();
        let mut ids: Vec<TaskId> = reg
            .tasks
            .iter()
            .filter(|(_, e)| pred(e.state))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn custom_state(&self, id: TaskId) -> Option<CustomState> {
        self.registry.borrow().tasks.get(&id).and_then(|e| e.custom)
    }

    pub fn set_custom_state(&self, id: TaskId, state: CustomState) -> bool {
        match self.registry.borrow_mut().tasks.get_mut(&id) {
            Some(entry) => {
                entry.custom = Some(state);
                true
            }
            None => false,
        }
    }

    /// Attach opaque user data to a task, replacing any previous value.
    pub fn attach(&self, id: TaskId, data: Box<dyn Any>) -> bool {
        match self.registry.borrow_mut().tasks.get_mut(&id) {
            Some(entry) => {
                entry.data = Some(data);
                true
            }
            None => false,
        }
    }

    /// Run `f` on the task's user data if it is a `D`.
    pub fn with_data<D: 'static, R>(&self, id: TaskId, f: impl FnOnce(&D) -> R) -> Option<R> {
        let reg = self.registry.borrow();
        let data = reg.tasks.get(&id)?.data.as_ref()?;
        (**data).downcast_ref::<D>().map(f)
    }

    /// Remove a settled task and return its outcome. `None` if it is unknown, unsettled, or died without one.
    pub fn take_outcome(&self, id: TaskId) -> Option<Result<T, E>> {
        let mut reg = self.registry.borrow_mut();
        match reg.tasks.get(&id).map(|e| e.state) {
            Some(TaskState::Completed) | Some(TaskState::Erred) => {
                reg.tasks.remove(&id).and_then(|e| e.outcome)
            }
            _ => None,
        }
    }

    /// Abort the task if it is still running and drop it from the registry.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        let entry = self.registry.borrow_mut().tasks.remove(&id);
        match entry {
            Some(entry) => {
                if let Some(handle) = entry.handle {
                    handle.abort();
                }
                drop(entry.outcome);
                self.notify.notify_waiters();
                true
            }
            None => false,
        }
    }

    /// Let other tasks on the local set run once.
    pub async fn run_step(&self) {
        tokio::task::yield_now().await;
    }

    /// Future resolving the next time any task settles or is cancelled. Create it before checking states.
    pub fn changed(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

impl<T: 'static, E: 'static> Default for Scheduler<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::task::LocalSet;

    #[tokio::test]
    async fn lifecycle() {
        LocalSet::new()
            .run_until(async {
                let s: Scheduler<u32, String> = Scheduler::new();
                let a = s.create_task(async { Ok(1) });
                let b = s.create_task(async { Err("boom".to_string()) });
                assert_eq!(s.state(a), Some(TaskState::Pending));
                assert_eq!(s.running(), vec![a, b]);
                while !s.running().is_empty() {
                    s.run_step().await;
                }
                assert_eq!(s.completed(), vec![a]);
                assert_eq!(s.state(b), Some(TaskState::Erred));
                assert_eq!(s.take_outcome(a), Some(Ok(1)));
                assert_eq!(s.take_outcome(b), Some(Err("boom".to_string())));
                assert!(!s.contains(a) && !s.contains(b));
            })
            .await;
    }

    #[tokio::test]
    async fn current_id_inside_task() {
        LocalSet::new()
            .run_until(async {
                let s: Scheduler<Option<TaskId>, ()> = Scheduler::new();
                assert_eq!(current_task(), None);
                let id = s.create_task(async { Ok(current_task()) });
                let changed = s.changed();
                changed.await;
                assert_eq!(s.take_outcome(id), Some(Ok(Some(id))));
            })
            .await;
    }

    #[tokio::test]
    async fn cancel_removes_and_aborts() {
        LocalSet::new()
            .run_until(async {
                let s: Scheduler<(), ()> = Scheduler::new();
                let id = s.create_task(async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                });
                s.set_custom_state(id, CustomState::Beginning);
                s.attach(id, Box::new(7u8));
                assert_eq!(s.with_data(id, |n: &u8| *n), Some(7));
                assert_eq!(s.custom_state(id), Some(CustomState::Beginning));
                assert!(s.cancel_task(id));
                assert!(!s.contains(id));
                assert!(!s.cancel_task(id));
            })
            .await;
    }
}
