//! Task composition primitives.
//!
//! A [`Task`] is a named, no-argument unit of work with a success/failure
//! completion signal. Tasks compose with [`sequence`] (run in order, abort
//! on first failure) and [`concurrent`] (run on scoped threads, settle all
//! branches, then report the first failure in listed order).

use std::fmt;
use std::thread;

/// Error produced by a failed task, carrying the task's name.
#[derive(Debug)]
pub struct TaskError {
    /// Name of the task that failed
    pub task: String,
    /// Failure description
    pub message: String,
}

impl TaskError {
    /// Create a task error from anything displayable.
    pub fn new(task: impl Into<String>, message: impl fmt::Display) -> Self {
        Self { task: task.into(), message: message.to_string() }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task '{}' failed: {}", self.task, self.message)
    }
}

impl std::error::Error for TaskError {}

/// A named unit of work.
///
/// Stateless between invocations: running a task twice with unchanged
/// inputs on disk produces identical outputs.
pub struct Task {
    name: String,
    run: Box<dyn Fn() -> Result<(), TaskError> + Send + Sync>,
}

impl Task {
    /// Create a task from a closure.
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn() -> Result<(), TaskError> + Send + Sync + 'static,
    {
        Self { name: name.into(), run: Box::new(run) }
    }

    /// The task's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the task to completion.
    pub fn run(&self) -> Result<(), TaskError> {
        (self.run)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("name", &self.name).finish()
    }
}

/// Compose tasks to run one after another.
///
/// A step never starts before its predecessor completes; the first failure
/// aborts the remaining steps and is propagated.
pub fn sequence(name: impl Into<String>, tasks: Vec<Task>) -> Task {
    Task::new(name, move || {
        for task in &tasks {
            task.run()?;
        }
        Ok(())
    })
}

/// Compose tasks to run at the same time.
///
/// All branches are started immediately on scoped threads and all of them
/// settle before the composition completes. Relative completion order across
/// branches is unspecified; on failure the first failed branch in listed
/// order is reported.
pub fn concurrent(name: impl Into<String>, tasks: Vec<Task>) -> Task {
    Task::new(name, move || {
        let results: Vec<Result<(), TaskError>> = thread::scope(|scope| {
            let handles: Vec<_> = tasks
                .iter()
                .map(|task| (task.name().to_string(), scope.spawn(move || task.run())))
                .collect();

            handles
                .into_iter()
                .map(|(task_name, handle)| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(TaskError::new(task_name, "task panicked")))
                })
                .collect()
        });

        for result in results {
            result?;
        }
        Ok(())
    })
}
