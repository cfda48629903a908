//! Pipeline scheduler.
//!
//! Operators are wired together by moving channel ends between them; the
//! scheduler's job is only to hand every task the shared cancellation
//! signal, spawn them, and translate the first task failure into a
//! pipeline-wide teardown.

use log::{debug, error};

use crate::rowbridge::sql::error::{SqlError, SqlResult};

use super::task::{SigChan, Task};

/// Owns a set of wired tasks and the shared cancellation signal
pub struct Pipeline {
    tasks: Vec<Box<dyn Task>>,
    sig: SigChan,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline {
            tasks: Vec::new(),
            sig: SigChan::new(),
        }
    }

    /// The pipeline's shared signal; closing it cancels every task.
    pub fn sig(&self) -> SigChan {
        self.sig.clone()
    }

    /// Register a task, installing the shared signal on it. Channel wiring
    /// between tasks happens before registration, via `take_output` /
    /// `set_input` on the tasks themselves.
    pub fn add(&mut self, mut task: Box<dyn Task>) {
        task.set_sig(self.sig.clone());
        self.tasks.push(task);
    }

    /// Spawn every task and wait for all of them to finish. A task that
    /// fails closes the shared signal so the rest drain promptly; the
    /// first failure is returned.
    pub async fn run(self) -> SqlResult<()> {
        let sig = self.sig;
        let mut handles = Vec::with_capacity(self.tasks.len());

        for mut task in self.tasks {
            let sig = sig.clone();
            handles.push(tokio::spawn(async move {
                let task_type = task.task_type();
                let result = task.run().await;
                match &result {
                    Ok(()) => debug!("task {} finished", task_type),
                    Err(e) => {
                        error!("task {} failed: {}", task_type, e);
                        sig.close();
                    }
                }
                result
            }));
        }

        let mut first_err: Option<SqlError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(join_err) => {
                    sig.close();
                    if first_err.is_none() {
                        first_err = Some(SqlError::stream_error(
                            "pipeline",
                            format!("task aborted: {}", join_err),
                        ));
                    }
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline::new()
    }
}
