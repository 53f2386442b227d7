//! Pub-sub plumbing for settlement hooks
//!
//! Each [`EventHandler`] owns one channel and one async callback. The settlement pipeline holds the
//! [`EventProducer`] ends and publishes *after* its transaction has committed, so a hook never observes a settlement
//! that could still roll back. Callbacks only ever receive the event value.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    name: &'static str,
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(name: &'static str, buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, listener) = mpsc::channel(buffer_size.max(1));
        Self { name, listener, sender, handler }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer { name: self.name, sender: self.sender.clone() }
    }

    /// Dispatches events until the last producer is dropped. Returns once every spawned callback has finished.
    pub async fn start_handler(self) {
        let Self { name, mut listener, sender, handler } = self;
        debug!("📬️ Starting {name} hook");
        drop(sender);
        let mut jobs = JoinSet::new();
        while let Some(ev) = listener.recv().await {
            trace!("📬️ Dispatching {name} event");
            jobs.spawn((handler)(ev));
            // reap finished callbacks as we go
            while let Some(res) = jobs.try_join_next() {
                log_join_result(name, res);
            }
        }
        if !jobs.is_empty() {
            debug!("📬️ Waiting for {} {name} callbacks to complete", jobs.len());
        }
        while let Some(res) = jobs.join_next().await {
            log_join_result(name, res);
        }
        debug!("📬️ {name} hook has shut down");
    }
}

fn log_join_result(name: &str, res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        error!("📬️ A {name} callback panicked or was cancelled: {e}");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    name: &'static str,
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    /// Hands the event to the hook. Blocks while the hook's buffer is full; if the hook has shut down the event is
    /// dropped with an error log, and the settlement it describes stands.
    pub async fn publish_event(&self, event: E) {
        if self.sender.send(event).await.is_err() {
            error!("📬️ The {} hook is gone. Event dropped.", self.name);
        }
    }
}
