use crate::internal_logs::{notifier_debug, notifier_warn};
use futures_util::{future::BoxFuture, FutureExt};
use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::{
    runtime::Handle,
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};

type Job = BoxFuture<'static, ()>;

/// Fixed pool of workers on a tokio runtime fed by a bounded queue.
#[derive(Debug)]
pub(crate) struct TaskRunner {
    queue: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskRunner {
    pub(crate) fn new(handle: &Handle, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let workers = (0..workers.max(1))
            .map(|_| handle.spawn(work(Arc::clone(&receiver))))
            .collect();
        TaskRunner {
            queue: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// Queue `job`. Returns `false` and drops the job when the queue is full or closed.
    pub(crate) fn schedule(&self, job: Job) -> bool {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = match queue.as_ref() {
            Some(sender) => sender,
            None => {
                notifier_warn!("notification dropped, runner is shut down");
                return false;
            }
        };
        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                notifier_warn!("notification dropped, queue is full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                notifier_warn!("notification dropped, queue is closed");
                false
            }
        }
    }

    /// Close the queue and wait until the workers have run every queued job.
    pub(crate) async fn shutdown(&self) {
        drop(
            self.queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for worker in workers {
            if let Err(_err) = worker.await {
                notifier_warn!(error = %_err, "notification worker failed");
            }
        }
        notifier_debug!("notification workers stopped");
    }
}

async fn work(queue: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = queue.lock().await.recv().await;
        let job = match job {
            Some(job) => job,
            None => break,
        };
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            notifier_warn!("notification job panicked");
        }
    }
}
