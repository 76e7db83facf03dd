//! Where delegated TLS tasks run.
//!
//! The pump never runs a [`DelegatedTask`] on the caller's thread; it hands
//! it to a [`TaskExecutor`] and reports `WouldBlock` until the task is done.

use std::io;
use std::thread;

use super::engine::DelegatedTask;

/// Runs delegated tasks off the event loop thread.
pub trait TaskExecutor: Send + Sync {
    /// Start `task`. Must not wait for it to finish.
    ///
    /// # Errors
    ///
    /// Returns an error when the task could not be started; it has been
    /// dropped and will never run.
    fn execute(&self, task: DelegatedTask) -> io::Result<()>;
}

/// Spawns a named OS thread per task.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadExecutor;

impl TaskExecutor for ThreadExecutor {
    fn execute(&self, task: DelegatedTask) -> io::Result<()> {
        thread::Builder::new()
            .name("wspump-tls-task".into())
            .spawn(task)
            .map(drop)
    }
}

/// Runs tasks on a tokio runtime's blocking pool.
#[cfg(feature = "async-tokio")]
impl TaskExecutor for tokio::runtime::Handle {
    fn execute(&self, task: DelegatedTask) -> io::Result<()> {
        drop(self.spawn_blocking(task));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_thread_executor_runs_task() {
        let (tx, rx) = mpsc::channel();
        ThreadExecutor
            .execute(Box::new(move || {
                tx.send(thread::current().name().map(str::to_owned)).unwrap();
            }))
            .unwrap();
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("wspump-tls-task"));
    }

    #[cfg(feature = "async-tokio")]
    #[test]
    fn test_tokio_handle_executor_runs_task() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let (tx, rx) = mpsc::channel();
        runtime
            .handle()
            .execute(Box::new(move || tx.send(42).unwrap()))
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }
}
