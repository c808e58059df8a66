//! Cooperative task scheduler (C8): runs at most one due task per `update`
//! call, selected by lowest priority number then earliest `next_run_ms`.
//!
//! Note the tie-break direction is the *opposite* of
//! [`crate::pid::PidManager::next_pid_to_read`], which picks the most
//! overdue entry. The scheduler picks the one that became due first.

use crate::clock::{elapsed, is_due, Clock};
use crate::error::{ErrorCode, ErrorSink, Severity};
use smallvec::SmallVec;

pub const MAX_TASKS: usize = 16;
pub const MIN_INTERVAL_MS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TaskPriority {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
    Background = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Pending,
    Running,
    Blocked,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    QueueFull,
    TaskNotFound,
    InvalidParam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: u32,
    pub priority: TaskPriority,
    pub state: TaskState,
    pub interval_ms: u32,
    pub next_run_ms: u32,
    pub run_count: u32,
    pub error_count: u32,
    pub enabled: bool,
    pub one_shot: bool,
}

struct Task<F> {
    id: u32,
    function: F,
    priority: TaskPriority,
    state: TaskState,
    interval_ms: u32,
    last_run_ms: u32,
    next_run_ms: u32,
    run_count: u32,
    error_count: u32,
    enabled: bool,
    one_shot: bool,
}

/// `F` is boxed because each task slot holds a different closure body, and a
/// fixed-size array can't unify heterogeneous element types the way a
/// generic callback can. The box is created once in `add_task`, not per
/// tick, so the scheduler is still allocation-free at steady state.
type TaskFn = Box<dyn FnMut() -> Result<(), ()>>;

pub struct Scheduler<Clk, Cb> {
    tasks: SmallVec<[Task<TaskFn>; MAX_TASKS]>,
    clock: Clk,
    complete_callback: Option<Cb>,
    min_interval_ms: u32,
    running: bool,
    next_id: u32,
    freed_ids: SmallVec<[u32; MAX_TASKS]>,
    total_runs: u32,
    total_errors: u32,
}

impl<Clk, Cb> Scheduler<Clk, Cb>
where
    Clk: Clock,
    Cb: FnMut(u32, Result<(), ()>),
{
    #[must_use]
    pub fn new(clock: Clk, complete_callback: Option<Cb>, min_interval_ms: u32) -> Self {
        Scheduler {
            tasks: SmallVec::new(),
            clock,
            complete_callback,
            min_interval_ms: min_interval_ms.max(MIN_INTERVAL_MS),
            running: false,
            next_id: 1,
            freed_ids: SmallVec::new(),
            total_runs: 0,
            total_errors: 0,
        }
    }

    fn find_index(&self, id: u32) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    /// Pops the smallest retired id, if any are waiting to be reused.
    fn take_freed_id(&mut self) -> Option<u32> {
        if self.freed_ids.is_empty() {
            return None;
        }
        let (min_pos, _) = self
            .freed_ids
            .iter()
            .enumerate()
            .min_by_key(|&(_, &id)| id)
            .expect("checked non-empty above");
        Some(self.freed_ids.remove(min_pos))
    }

    /// Returns the new task's id. Reuses ids freed by [`Self::remove_task`]
    /// instead of the reference scheduler's forever-incrementing `max + 1`,
    /// so the id space can't be exhausted by long-running add/remove churn.
    pub fn add_task(
        &mut self,
        function: TaskFn,
        priority: TaskPriority,
        interval_ms: u32,
        one_shot: bool,
        error_sink: &mut impl ErrorSink,
    ) -> Result<u32, SchedulerError> {
        if self.tasks.len() >= MAX_TASKS {
            error_sink.report(ErrorCode::SchedulerQueueFull, Severity::Error);
            return Err(SchedulerError::QueueFull);
        }
        let actual_interval = if interval_ms > 0 && interval_ms < self.min_interval_ms {
            self.min_interval_ms
        } else {
            interval_ms
        };
        let now = self.clock.now_ms();
        let id = self.take_freed_id().unwrap_or_else(|| {
            let id = self.next_id;
            self.next_id += 1;
            id
        });
        self.tasks.push(Task {
            id,
            function,
            priority,
            state: TaskState::Idle,
            interval_ms: actual_interval,
            last_run_ms: 0,
            next_run_ms: now.wrapping_add(actual_interval),
            run_count: 0,
            error_count: 0,
            enabled: true,
            one_shot,
        });
        Ok(id)
    }

    pub fn remove_task(
        &mut self,
        id: u32,
        error_sink: &mut impl ErrorSink,
    ) -> Result<(), SchedulerError> {
        match self.find_index(id) {
            Some(idx) => {
                self.tasks.remove(idx);
                self.freed_ids.push(id);
                Ok(())
            }
            None => {
                error_sink.report(ErrorCode::SchedulerTaskNotFound, Severity::Warning);
                Err(SchedulerError::TaskNotFound)
            }
        }
    }

    pub fn enable_task(&mut self, id: u32) -> Result<(), SchedulerError> {
        let now = self.clock.now_ms();
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(SchedulerError::TaskNotFound)?;
        task.enabled = true;
        task.state = TaskState::Idle;
        task.next_run_ms = now.wrapping_add(task.interval_ms);
        Ok(())
    }

    pub fn disable_task(&mut self, id: u32) -> Result<(), SchedulerError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(SchedulerError::TaskNotFound)?;
        task.enabled = false;
        task.state = TaskState::Disabled;
        Ok(())
    }

    pub fn set_interval(&mut self, id: u32, interval_ms: u32) -> Result<(), SchedulerError> {
        let min = self.min_interval_ms;
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(SchedulerError::TaskNotFound)?;
        task.interval_ms = if interval_ms > 0 && interval_ms < min {
            min
        } else {
            interval_ms
        };
        Ok(())
    }

    pub fn set_priority(&mut self, id: u32, priority: TaskPriority) -> Result<(), SchedulerError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(SchedulerError::TaskNotFound)?;
        task.priority = priority;
        Ok(())
    }

    pub fn trigger_task(&mut self, id: u32) -> Result<(), SchedulerError> {
        let now = self.clock.now_ms();
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(SchedulerError::TaskNotFound)?;
        task.state = TaskState::Pending;
        task.next_run_ms = now;
        Ok(())
    }

    /// Runs at most one task per call: the lowest-priority-number due task,
    /// ties broken by earliest `next_run_ms` (earliest-due-first).
    pub fn update(&mut self) -> Result<(), SchedulerError> {
        if !self.running {
            return Ok(());
        }
        let now = self.clock.now_ms();

        let mut best: Option<usize> = None;
        for (idx, task) in self.tasks.iter().enumerate() {
            if !task.enabled || task.state == TaskState::Disabled || task.state == TaskState::Running
            {
                continue;
            }
            if !is_due(now, task.next_run_ms) {
                continue;
            }
            best = Some(match best {
                None => idx,
                Some(best_idx) => {
                    let b = &self.tasks[best_idx];
                    if task.priority < b.priority
                        || (task.priority == b.priority && task.next_run_ms < b.next_run_ms)
                    {
                        idx
                    } else {
                        best_idx
                    }
                }
            });
        }

        let Some(idx) = best else {
            return Ok(());
        };

        self.tasks[idx].state = TaskState::Running;
        let result = (self.tasks[idx].function)();
        let task = &mut self.tasks[idx];
        task.last_run_ms = now;
        task.run_count += 1;
        self.total_runs += 1;
        if result.is_err() {
            task.error_count += 1;
            self.total_errors += 1;
        }
        let id = task.id;
        let one_shot = task.one_shot;
        if one_shot {
            task.enabled = false;
            task.state = TaskState::Disabled;
        } else {
            task.next_run_ms = now.wrapping_add(task.interval_ms);
            task.state = TaskState::Idle;
        }

        if let Some(cb) = &mut self.complete_callback {
            cb(id, result);
        }
        Ok(())
    }

    /// Resets every *currently enabled* task's schedule and starts running.
    pub fn start(&mut self) {
        let now = self.clock.now_ms();
        for task in &mut self.tasks {
            if task.enabled {
                task.state = TaskState::Idle;
                task.next_run_ms = now.wrapping_add(task.interval_ms);
            }
        }
        self.running = true;
    }

    /// Preserves all task state; only the `running` flag changes.
    pub fn stop(&mut self) {
        self.running = false;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn task_info(&self, id: u32) -> Option<TaskInfo> {
        self.tasks.iter().find(|t| t.id == id).map(|t| TaskInfo {
            id: t.id,
            priority: t.priority,
            state: t.state,
            interval_ms: t.interval_ms,
            next_run_ms: t.next_run_ms,
            run_count: t.run_count,
            error_count: t.error_count,
            enabled: t.enabled,
            one_shot: t.one_shot,
        })
    }

    /// Earliest-due enabled, non-disabled task id and time until due (0 if
    /// already past due). `None` if there are no eligible tasks.
    #[must_use]
    pub fn next_task(&self) -> Option<(u32, u32)> {
        let now = self.clock.now_ms();
        self.tasks
            .iter()
            .filter(|t| t.enabled && t.state != TaskState::Disabled)
            .min_by_key(|t| elapsed(t.next_run_ms, now))
            .map(|t| {
                let until = if is_due(now, t.next_run_ms) {
                    0
                } else {
                    elapsed(t.next_run_ms, now)
                };
                (t.id, until)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::NullErrorSink;

    fn scheduler_at(now: u32) -> Scheduler<FixedClock, fn(u32, Result<(), ()>)> {
        Scheduler::new(FixedClock(now), None, MIN_INTERVAL_MS)
    }

    #[test]
    fn add_task_clamps_interval_up_to_the_minimum() {
        let mut sched = scheduler_at(0);
        let mut sink = NullErrorSink;
        let id = sched
            .add_task(Box::new(|| Ok(())), TaskPriority::Medium, 1, false, &mut sink)
            .unwrap();
        assert_eq!(sched.task_info(id).unwrap().interval_ms, MIN_INTERVAL_MS);
    }

    #[test]
    fn add_task_reports_queue_full_past_capacity() {
        let mut sched = scheduler_at(0);
        let mut sink = NullErrorSink;
        for _ in 0..MAX_TASKS {
            sched
                .add_task(Box::new(|| Ok(())), TaskPriority::Low, 100, false, &mut sink)
                .unwrap();
        }
        let result = sched.add_task(Box::new(|| Ok(())), TaskPriority::Low, 100, false, &mut sink);
        assert_eq!(result, Err(SchedulerError::QueueFull));
    }

    #[test]
    fn remove_task_compacts_and_reuses_the_freed_id() {
        let mut sched = scheduler_at(0);
        let mut sink = NullErrorSink;
        let a = sched
            .add_task(Box::new(|| Ok(())), TaskPriority::Low, 100, false, &mut sink)
            .unwrap();
        sched.remove_task(a, &mut sink).unwrap();
        assert_eq!(sched.task_count(), 0);
        let b = sched
            .add_task(Box::new(|| Ok(())), TaskPriority::Low, 100, false, &mut sink)
            .unwrap();
        assert_eq!(b, a, "freed id should be reused");
    }

    #[test]
    fn remove_task_reports_not_found() {
        let mut sched = scheduler_at(0);
        let mut sink = NullErrorSink;
        assert_eq!(sched.remove_task(999, &mut sink), Err(SchedulerError::TaskNotFound));
    }

    #[test]
    fn update_runs_at_most_one_task_per_call() {
        use std::cell::Cell;
        use std::rc::Rc;

        let mut sched = scheduler_at(0);
        let mut sink = NullErrorSink;
        let counter = Rc::new(Cell::new(0));
        let mut ids = Vec::new();
        for _ in 0..3 {
            let c = counter.clone();
            ids.push(
                sched
                    .add_task(
                        Box::new(move || {
                            c.set(c.get() + 1);
                            Ok(())
                        }),
                        TaskPriority::Medium,
                        10,
                        false,
                        &mut sink,
                    )
                    .unwrap(),
            );
        }
        sched.start();
        for id in ids {
            sched.trigger_task(id).unwrap();
        }
        sched.update().unwrap();
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn update_picks_lowest_priority_then_earliest_next_run() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut sched = scheduler_at(1_000);
        let mut sink = NullErrorSink;
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let o1 = order.clone();
        sched
            .add_task(Box::new(move || { o1.borrow_mut().push("low"); Ok(()) }), TaskPriority::Low, 10, false, &mut sink)
            .unwrap();
        let o2 = order.clone();
        sched
            .add_task(Box::new(move || { o2.borrow_mut().push("high"); Ok(()) }), TaskPriority::High, 10, false, &mut sink)
            .unwrap();

        sched.start();
        // Both tasks were scheduled relative to now=1_000 at start(), so both
        // become due at the same future tick. Trigger them both to be due now.
        sched.trigger_task(1).unwrap();
        sched.trigger_task(2).unwrap();
        sched.update().unwrap();
        assert_eq!(*order.borrow(), vec!["high"]);
        sched.update().unwrap();
        assert_eq!(*order.borrow(), vec!["high", "low"]);
    }

    #[test]
    fn update_is_a_no_op_while_stopped() {
        let mut sched = scheduler_at(0);
        let mut sink = NullErrorSink;
        sched
            .add_task(Box::new(|| Ok(())), TaskPriority::Critical, 10, false, &mut sink)
            .unwrap();
        sched.trigger_task(1).unwrap();
        sched.update().unwrap();
        assert_eq!(sched.task_info(1).unwrap().run_count, 0);
    }

    #[test]
    fn one_shot_task_disables_itself_after_running() {
        let mut sched = scheduler_at(0);
        let mut sink = NullErrorSink;
        sched
            .add_task(Box::new(|| Ok(())), TaskPriority::Critical, 10, true, &mut sink)
            .unwrap();
        sched.start();
        sched.trigger_task(1).unwrap();
        sched.update().unwrap();
        let info = sched.task_info(1).unwrap();
        assert!(!info.enabled);
        assert_eq!(info.state, TaskState::Disabled);
        assert_eq!(info.run_count, 1);
    }

    #[test]
    fn next_task_reports_zero_time_until_when_already_due() {
        let mut sched = scheduler_at(0);
        let mut sink = NullErrorSink;
        sched
            .add_task(Box::new(|| Ok(())), TaskPriority::Medium, 100, false, &mut sink)
            .unwrap();
        sched.trigger_task(1).unwrap();
        assert_eq!(sched.next_task(), Some((1, 0)));
    }

    #[test]
    fn priority_enum_orders_critical_first() {
        assert!(TaskPriority::Critical < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Medium);
        assert!(TaskPriority::Background > TaskPriority::Low);
    }
}
