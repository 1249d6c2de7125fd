//! Worker-context providers backed by tokio runtimes.

use crate::config::{SchedulerConfig, DEFAULT_THREAD_NAME, DEFAULT_WORKER_THREADS};
use crate::observability::events;
use crate::scheduling::{Scheduler, Task};
use lazy_static::lazy_static;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, warn};

const COMPONENT: &str = "scheduler";

lazy_static! {
    static ref SHARED_POOL: Arc<TokioPool> = Arc::new(
        TokioPool::new(DEFAULT_WORKER_THREADS, DEFAULT_THREAD_NAME)
            .expect("Unable to create shared scheduler pool")
    );
}

/// Runs every task on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct Immediate;

impl Scheduler for Immediate {
    fn schedule(&self, task: Task) {
        task();
    }

    /// Delayed tasks still need somewhere to wait; they get a short-lived
    /// timer thread.
    fn schedule_after(&self, delay: Duration, task: Task) {
        let spawned = thread::Builder::new()
            .name("backflow-timer".to_string())
            .spawn(move || {
                thread::sleep(delay);
                task();
            });
        if let Err(err) = spawned {
            warn!(
                event = events::SCHEDULER_TASK_REJECTED,
                component = COMPONENT,
                scheduler = "immediate",
                err = %err,
                "unable to start timer thread"
            );
        }
    }

    fn name(&self) -> &str {
        "immediate"
    }
}

/// One named OS thread draining a FIFO of tasks on a current-thread tokio
/// runtime. Tasks run strictly in submission order.
pub struct WorkerThread {
    name: String,
    sender: UnboundedSender<Task>,
    handle: Handle,
}

impl WorkerThread {
    pub fn spawn(name: impl Into<String>) -> io::Result<Self> {
        let name = name.into();
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();

        let thread_name = name.clone();
        thread::Builder::new().name(name.clone()).spawn(move || {
            debug!(
                event = events::SCHEDULER_WORKER_STARTED,
                component = COMPONENT,
                scheduler = %thread_name,
                "worker thread started"
            );
            runtime.block_on(async move {
                while let Some(task) = receiver.recv().await {
                    task();
                }
            });
            debug!(
                event = events::SCHEDULER_WORKER_STOPPED,
                component = COMPONENT,
                scheduler = %thread_name,
                "worker thread stopped"
            );
        })?;

        Ok(Self {
            name,
            sender,
            handle,
        })
    }
}

impl Scheduler for WorkerThread {
    fn schedule(&self, task: Task) {
        if self.sender.send(task).is_err() {
            warn!(
                event = events::SCHEDULER_TASK_REJECTED,
                component = COMPONENT,
                scheduler = %self.name,
                "worker thread is gone; task dropped"
            );
        }
    }

    fn schedule_after(&self, delay: Duration, task: Task) {
        let sender = self.sender.clone();
        let name = self.name.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(task).is_err() {
                warn!(
                    event = events::SCHEDULER_TASK_REJECTED,
                    component = COMPONENT,
                    scheduler = %name,
                    "worker thread is gone; delayed task dropped"
                );
            }
        });
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Multi-threaded tokio runtime; tasks may run on any of its workers.
pub struct TokioPool {
    name: String,
    runtime: Option<Runtime>,
}

impl TokioPool {
    pub fn new(worker_threads: usize, thread_name: impl Into<String>) -> io::Result<Self> {
        let name = thread_name.into();
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name(name.clone())
            .enable_all()
            .build()?;
        debug!(
            event = events::SCHEDULER_WORKER_STARTED,
            component = COMPONENT,
            scheduler = %name,
            worker_threads,
            "pool started"
        );
        Ok(Self {
            name,
            runtime: Some(runtime),
        })
    }

    pub fn from_config(config: &SchedulerConfig) -> io::Result<Self> {
        Self::new(config.worker_threads, config.thread_name.clone())
    }

    /// Process-wide pool with the default worker count and thread name.
    pub fn shared() -> Arc<dyn Scheduler> {
        let pool: Arc<TokioPool> = Arc::clone(&SHARED_POOL);
        pool
    }

    fn spawn_task(&self, task: Task) {
        match &self.runtime {
            Some(runtime) => {
                runtime.spawn(async move { task() });
            }
            None => warn!(
                event = events::SCHEDULER_TASK_REJECTED,
                component = COMPONENT,
                scheduler = %self.name,
                "pool shut down; task dropped"
            ),
        }
    }
}

impl Scheduler for TokioPool {
    fn schedule(&self, task: Task) {
        self.spawn_task(task);
    }

    fn schedule_after(&self, delay: Duration, task: Task) {
        match &self.runtime {
            Some(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    task();
                });
            }
            None => self.spawn_task(task),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TokioPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!(
                event = events::SCHEDULER_WORKER_STOPPED,
                component = COMPONENT,
                scheduler = %self.name,
                "pool stopped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Immediate, TokioPool, WorkerThread};
    use crate::scheduling::Scheduler;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn immediate_runs_inline() {
        let (tx, rx) = mpsc::channel();
        let caller = thread::current().id();

        Immediate.schedule(Box::new(move || {
            tx.send(thread::current().id()).expect("send");
        }));

        assert_eq!(rx.try_recv().expect("ran inline"), caller);
    }

    #[test]
    fn worker_thread_runs_tasks_in_order_on_its_thread() {
        let worker = WorkerThread::spawn("ordered-worker").expect("worker spawns");
        let (tx, rx) = mpsc::channel();

        for i in 0..5 {
            let tx = tx.clone();
            worker.schedule(Box::new(move || {
                let name = thread::current().name().map(str::to_string);
                tx.send((i, name)).expect("send");
            }));
        }

        let received: Vec<_> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).expect("task ran"))
            .collect();
        assert_eq!(
            received.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
        assert!(received
            .iter()
            .all(|(_, name)| name.as_deref() == Some("ordered-worker")));
    }

    #[test]
    fn delayed_task_runs_after_delay() {
        let worker = WorkerThread::spawn("delay-worker").expect("worker spawns");
        let (tx, rx) = mpsc::channel();

        worker.schedule_after(
            Duration::from_millis(50),
            Box::new(move || tx.send(()).expect("send")),
        );

        assert!(rx.recv_timeout(Duration::from_millis(10)).is_err());
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn pool_threads_carry_the_configured_name() {
        let pool = TokioPool::new(2, "pool-under-test").expect("pool builds");
        let (tx, rx) = mpsc::channel();

        pool.schedule(Box::new(move || {
            tx.send(thread::current().name().map(str::to_string))
                .expect("send");
        }));

        let name = rx.recv_timeout(Duration::from_secs(2)).expect("task ran");
        assert_eq!(name.as_deref(), Some("pool-under-test"));
    }
}
