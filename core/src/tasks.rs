/*
 * tasks.rs
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

//! Concurrent HTTP tasks: spawn request operations, cancel them, and wait for all
//! of them or race for the first N.
//!
//! Each task carries a weak reference to its `Hyper`'s in-flight state, so a
//! cancelled or outraced task can have its stream closed without owning the
//! orchestrator.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::rc::Weak;

use tracing::{debug, error, warn};

use crate::error::HyperError;
use crate::hyper::{Hyper, Inflight};
use crate::message::Response;
use crate::scheduler::{CustomState, Scheduler, TaskId, TaskState};

pub type Outcome = Result<Response, HyperError>;

/// How the next `wait` behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Return after this many tasks finish; 0 waits for all.
    pub race: usize,
    /// Return the first task failure as the error of `wait`.
    pub propagate_errors: bool,
    /// After a race, abort the tasks that did not finish.
    pub clear_aborted: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            race: 0,
            propagate_errors: true,
            clear_aborted: true,
        }
    }
}

impl WaitOptions {
    pub fn race(count: usize) -> Self {
        Self {
            race: count,
            ..Self::default()
        }
    }

    pub fn collect_errors(mut self) -> Self {
        self.propagate_errors = false;
        self
    }

    pub fn keep_losers(mut self) -> Self {
        self.clear_aborted = false;
        self
    }
}

pub struct HttpTasks {
    scheduler: Scheduler<Response, HyperError>,
    pending: Cell<Option<WaitOptions>>,
}

impl Default for HttpTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTasks {
    pub fn new() -> Self {
        Self {
            scheduler: Scheduler::new(),
            pending: Cell::new(None),
        }
    }

    pub fn scheduler(&self) -> &Scheduler<Response, HyperError> {
        &self.scheduler
    }

    /// Spawn `operation(hyper)` as a task. It does not run until the caller yields or waits.
    pub fn awaitable<F, Fut>(&self, hyper: Hyper, operation: F) -> TaskId
    where
        F: FnOnce(Hyper) -> Fut,
        Fut: Future<Output = Outcome> + 'static,
    {
        let tracker = hyper.tracker();
        let id = self.scheduler.create_task(operation(hyper));
        self.scheduler.set_custom_state(id, CustomState::Beginning);
        if let Some(inflight) = tracker.upgrade() {
            inflight.set_task_id(id);
        }
        self.scheduler.attach(id, Box::new(tracker));
        debug!(task = id, "awaitable created");
        id
    }

    /// Cancel a task and close its stream. Unknown ids are an error.
    pub fn cancel(&self, id: TaskId) -> Result<bool, HyperError> {
        if !self.scheduler.contains(id) {
            error!(task = id, "cancel of unknown HTTP task");
            return Err(HyperError::TaskAccess(id));
        }
        self.scheduler.set_custom_state(id, CustomState::Aborted);
        self.abort_inflight(id);
        debug!(task = id, "cancelled");
        Ok(self.scheduler.cancel_task(id))
    }

    /// Options for the next `wait` only; they reset once read.
    pub fn wait_options(&self, options: WaitOptions) {
        self.pending.set(Some(options));
    }

    /// Wait for `ids` with the options set by `wait_options`, or the defaults.
    pub async fn wait(&self, ids: &[TaskId]) -> Result<HashMap<TaskId, Outcome>, HyperError> {
        let options = self.pending.take().unwrap_or_default();
        self.wait_with(ids, options).await
    }

    /// Same as `wait`.
    pub async fn fetch(&self, ids: &[TaskId]) -> Result<HashMap<TaskId, Outcome>, HyperError> {
        self.wait(ids).await
    }

    /// Wait for all of `ids`, or the first `options.race` of them to finish.
    ///
    /// Ids are validated first. Tasks that already completed are collected
    /// without suspending; tasks that never ran are stepped once. Failed tasks
    /// either end the wait (propagating) or are returned as `Err` entries.
    pub async fn wait_with(
        &self,
        ids: &[TaskId],
        options: WaitOptions,
    ) -> Result<HashMap<TaskId, Outcome>, HyperError> {
        let sched = &self.scheduler;
        if let Some(&missing) = ids.iter().find(|id| !sched.contains(**id)) {
            error!(task = missing, "wait on unknown HTTP task");
            return Err(HyperError::TaskAccess(missing));
        }
        let mut seen = HashSet::new();
        let mut outstanding: Vec<TaskId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        let racing = options.race > 0;
        if racing && options.race > outstanding.len() {
            error!(submitted = outstanding.len(), requested = options.race, "race count too large");
            return Err(HyperError::RaceShortfall {
                submitted: outstanding.len(),
                requested: options.race,
            });
        }
        let target = if racing { options.race } else { outstanding.len() };
        let mut responses: HashMap<TaskId, Outcome> = HashMap::new();

        let completed: HashSet<TaskId> = sched.completed().into_iter().collect();
        let mut index = 0;
        while index < outstanding.len() && responses.len() < target {
            let id = outstanding[index];
            if completed.contains(&id) {
                outstanding.remove(index);
                self.collect(id, &mut responses);
            } else {
                index += 1;
            }
        }

        while responses.len() < target && !outstanding.is_empty() {
            let changed = sched.changed();
            let mut progressed = false;
            let mut index = 0;
            while index < outstanding.len() && responses.len() < target {
                let id = outstanding[index];
                match sched.state(id) {
                    Some(TaskState::Pending) | Some(TaskState::Running) => {
                        if sched.custom_state(id) == Some(CustomState::Beginning) {
                            sched.set_custom_state(id, CustomState::Started);
                            sched.run_step().await;
                            progressed = true;
                        }
                        index += 1;
                    }
                    Some(TaskState::Completed) => {
                        outstanding.remove(index);
                        self.collect(id, &mut responses);
                        progressed = true;
                    }
                    Some(TaskState::Erred) | None => {
                        outstanding.remove(index);
                        progressed = true;
                        let failure = self.fail(id);
                        if options.propagate_errors {
                            warn!(task = id, error = %failure, "HTTP task failed");
                            return Err(failure);
                        }
                        responses.insert(id, Err(failure));
                    }
                }
            }
            if !progressed {
                changed.await;
            }
        }

        if racing && options.clear_aborted {
            for id in outstanding {
                self.abort(id);
            }
        }
        Ok(responses)
    }

    fn inflight(&self, id: TaskId) -> Option<std::rc::Rc<Inflight>> {
        self.scheduler
            .with_data(id, |tracker: &Weak<Inflight>| tracker.upgrade())
            .flatten()
    }

    fn abort_inflight(&self, id: TaskId) {
        if let Some(inflight) = self.inflight(id) {
            inflight.abort();
        }
    }

    /// Move a completed task's response into `responses` and drop its bookkeeping.
    fn collect(&self, id: TaskId, responses: &mut HashMap<TaskId, Outcome>) {
        self.scheduler.set_custom_state(id, CustomState::Ended);
        if let Some(inflight) = self.inflight(id) {
            inflight.release();
        }
        match self.scheduler.take_outcome(id) {
            Some(outcome) => {
                responses.insert(id, outcome);
            }
            None => {
                responses.insert(id, Err(HyperError::Cancelled(id)));
            }
        }
    }

    /// Close a failed task's stream and take its error.
    fn fail(&self, id: TaskId) -> HyperError {
        self.scheduler.set_custom_state(id, CustomState::Ended);
        self.abort_inflight(id);
        match self.scheduler.take_outcome(id) {
            Some(Err(e)) => e,
            _ => HyperError::Cancelled(id),
        }
    }

    /// Abort a race loser: close its stream and remove it from the scheduler.
    fn abort(&self, id: TaskId) {
        if !self.scheduler.contains(id) {
            return;
        }
        self.scheduler.set_custom_state(id, CustomState::Aborted);
        self.abort_inflight(id);
        self.scheduler.cancel_task(id);
        debug!(task = id, "race loser aborted");
    }
}
