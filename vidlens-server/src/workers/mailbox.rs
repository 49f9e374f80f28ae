//! Worker runtime: bounded mailboxes, the message loop and fault reporting
//!
//! Each worker is one tokio task draining one bounded mpsc mailbox in FIFO
//! order, so its private state is only ever touched by that task. A handler
//! that returns a [`WorkerFault`] or panics is reported to the supervisor,
//! which answers with a [`Directive`]:
//! - `Resume`: keep the instance and its state, take the next message
//! - `Restart`: build a fresh instance through the factory
//! - `Stop`: close the mailbox; queued and future messages are dead letters

use super::policy::{directive_for, FaultEvent, WorkerFault};
use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vidlens_common::supervision::Directive;

/// A sequential message processor with private state
#[async_trait]
pub trait Worker: Send + 'static {
    type Message: Send + 'static;

    async fn handle(&mut self, msg: Self::Message) -> Result<(), WorkerFault>;
}

/// Lets a supervisor run a worker chosen at runtime behind a fixed address type
#[async_trait]
impl<M: Send + 'static> Worker for Box<dyn Worker<Message = M>> {
    type Message = M;

    async fn handle(&mut self, msg: M) -> Result<(), WorkerFault> {
        (**self).handle(msg).await
    }
}

/// Message delivery failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("worker '{0}' is stopped")]
    Stopped(String),

    #[error("worker '{0}' mailbox is full")]
    MailboxFull(String),

    #[error("worker '{0}' dropped the request without replying")]
    NoReply(String),
}

/// Lifecycle counters of one supervised child
#[derive(Debug)]
pub struct ChildStatus {
    name: String,
    incarnation: AtomicU64,
    restarts: AtomicU64,
    stopped: AtomicBool,
}

impl ChildStatus {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            incarnation: AtomicU64::new(1),
            restarts: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 1 for the first instance, incremented on every restart
    pub fn incarnation(&self) -> u64 {
        self.incarnation.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn record_restart(&self) {
        self.incarnation.fetch_add(1, Ordering::SeqCst);
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }

    fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ChildStatusSnapshot {
        ChildStatusSnapshot {
            name: self.name.clone(),
            alive: !self.is_stopped(),
            incarnation: self.incarnation(),
            restarts: self.restarts(),
        }
    }
}

/// Point-in-time copy of a [`ChildStatus`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildStatusSnapshot {
    pub name: String,
    pub alive: bool,
    pub incarnation: u64,
    pub restarts: u64,
}

/// Address of a running worker
pub struct WorkerRef<M> {
    tx: mpsc::Sender<M>,
    status: Arc<ChildStatus>,
}

impl<M> Clone for WorkerRef<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            status: self.status.clone(),
        }
    }
}

impl<M: Send + 'static> WorkerRef<M> {
    pub fn name(&self) -> &str {
        self.status.name()
    }

    /// Enqueue a message, waiting for mailbox space
    pub async fn tell(&self, msg: M) -> Result<(), DeliveryError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| DeliveryError::Stopped(self.name().to_string()))
    }

    /// Enqueue a message without waiting
    pub fn try_tell(&self, msg: M) -> Result<(), DeliveryError> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::MailboxFull(self.name().to_string()),
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Stopped(self.name().to_string()),
        })
    }

    /// Send a request carrying a reply channel and wait for the answer
    pub async fn ask<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> M) -> Result<R, DeliveryError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tell(make(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| DeliveryError::NoReply(self.name().to_string()))
    }

    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed() && !self.status.is_stopped()
    }

    pub fn incarnation(&self) -> u64 {
        self.status.incarnation()
    }

    pub fn status(&self) -> Arc<ChildStatus> {
        self.status.clone()
    }

    pub fn downgrade(&self) -> WeakWorkerRef<M> {
        WeakWorkerRef {
            tx: self.tx.downgrade(),
            status: self.status.clone(),
        }
    }
}

/// Address that does not keep the worker's mailbox open
pub struct WeakWorkerRef<M> {
    tx: mpsc::WeakSender<M>,
    status: Arc<ChildStatus>,
}

impl<M> Clone for WeakWorkerRef<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            status: self.status.clone(),
        }
    }
}

impl<M: Send + 'static> WeakWorkerRef<M> {
    pub fn upgrade(&self) -> Option<WorkerRef<M>> {
        self.tx.upgrade().map(|tx| WorkerRef {
            tx,
            status: self.status.clone(),
        })
    }
}

/// Deliver the result of `rx` back into `target`'s mailbox as a new message
///
/// `None` is passed to `wrap` when the replying side went away. Nothing is
/// delivered if the target has shut down in the meantime.
pub fn pipe_to<T, M, F>(rx: oneshot::Receiver<T>, target: WeakWorkerRef<M>, wrap: F)
where
    T: Send + 'static,
    M: Send + 'static,
    F: FnOnce(Option<T>) -> M + Send + 'static,
{
    tokio::spawn(async move {
        let result = rx.await.ok();
        match target.upgrade() {
            Some(target) => {
                if let Err(e) = target.tell(wrap(result)).await {
                    debug!("Piped reply dropped: {}", e);
                }
            }
            None => debug!("Piped reply dropped: target worker is gone"),
        }
    });
}

/// Fault report awaiting the supervisor's directive
#[derive(Debug)]
pub struct FaultReport {
    pub event: FaultEvent,
    pub reply: oneshot::Sender<Directive>,
}

/// Channel from workers to their supervisor
///
/// When the supervisor is unreachable the worker applies the fault policy
/// itself, so a fault is never left without a directive.
#[derive(Clone, Debug)]
pub struct FaultReporter {
    tx: Option<mpsc::Sender<FaultReport>>,
}

impl FaultReporter {
    pub fn new(tx: mpsc::Sender<FaultReport>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Reporter for a worker with no supervisor
    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub async fn report(&self, event: FaultEvent) -> Directive {
        let fallback = directive_for(event.kind);
        let Some(tx) = &self.tx else {
            return fallback;
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send(FaultReport { event, reply: reply_tx }).await.is_err() {
            return fallback;
        }
        reply_rx.await.unwrap_or(fallback)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Start a worker task
///
/// `factory` builds the initial instance and every restarted one; it receives
/// the worker's own weak address for replies piped back into the mailbox.
pub fn spawn_worker<W, F>(
    name: &str,
    capacity: usize,
    faults: FaultReporter,
    factory: F,
) -> (WorkerRef<W::Message>, JoinHandle<()>)
where
    W: Worker,
    F: Fn(&WeakWorkerRef<W::Message>) -> W + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let worker_ref = WorkerRef {
        tx,
        status: Arc::new(ChildStatus::new(name)),
    };
    let weak = worker_ref.downgrade();
    let handle = tokio::spawn(run_worker(rx, weak, faults, factory));
    (worker_ref, handle)
}

async fn run_worker<W, F>(
    mut rx: mpsc::Receiver<W::Message>,
    self_ref: WeakWorkerRef<W::Message>,
    faults: FaultReporter,
    factory: F,
) where
    W: Worker,
    F: Fn(&WeakWorkerRef<W::Message>) -> W + Send + 'static,
{
    let status = self_ref.status.clone();
    let name = status.name().to_string();
    let mut worker = factory(&self_ref);
    debug!(worker = %name, "Worker started");

    while let Some(msg) = rx.recv().await {
        let outcome = AssertUnwindSafe(worker.handle(msg)).catch_unwind().await;
        let fault = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(fault)) => fault,
            Err(payload) => WorkerFault::transient(panic_message(payload.as_ref())),
        };

        warn!(worker = %name, kind = %fault.kind, "Worker fault: {}", fault.detail);
        let directive = faults.report(FaultEvent::new(name.clone(), fault)).await;

        match directive {
            Directive::Resume => {
                debug!(worker = %name, "Resuming worker with state intact");
            }
            Directive::Restart => {
                worker = factory(&self_ref);
                status.record_restart();
                info!(worker = %name, incarnation = status.incarnation(), "Worker restarted");
            }
            Directive::Stop => {
                error!(worker = %name, "Worker stopped permanently");
                break;
            }
        }
    }

    status.mark_stopped();
    rx.close();
    debug!(worker = %name, "Worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo {
        seen: u32,
    }

    enum EchoMsg {
        Count(oneshot::Sender<u32>),
        Fail(WorkerFault),
        Panic,
    }

    #[async_trait]
    impl Worker for Echo {
        type Message = EchoMsg;

        async fn handle(&mut self, msg: EchoMsg) -> Result<(), WorkerFault> {
            self.seen += 1;
            match msg {
                EchoMsg::Count(reply) => {
                    let _ = reply.send(self.seen);
                    Ok(())
                }
                EchoMsg::Fail(fault) => Err(fault),
                EchoMsg::Panic => panic!("boom"),
            }
        }
    }

    fn echo() -> WorkerRef<EchoMsg> {
        spawn_worker("echo", 4, FaultReporter::detached(), |_| Echo { seen: 0 }).0
    }

    #[tokio::test]
    async fn test_messages_processed_in_order() {
        let worker = echo();
        assert_eq!(worker.ask(EchoMsg::Count).await.unwrap(), 1);
        assert_eq!(worker.ask(EchoMsg::Count).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_detached_restart_resets_state() {
        let worker = echo();
        worker.tell(EchoMsg::Fail(WorkerFault::unclassified("x"))).await.unwrap();
        assert_eq!(worker.ask(EchoMsg::Count).await.unwrap(), 1);
        assert_eq!(worker.incarnation(), 2);
    }

    #[tokio::test]
    async fn test_panic_is_resumed() {
        let worker = echo();
        worker.tell(EchoMsg::Panic).await.unwrap();
        assert_eq!(worker.ask(EchoMsg::Count).await.unwrap(), 2);
        assert_eq!(worker.incarnation(), 1);
    }

    #[tokio::test]
    async fn test_stop_closes_mailbox() {
        let worker = echo();
        worker
            .tell(EchoMsg::Fail(WorkerFault::invariant_violation("bad")))
            .await
            .unwrap();
        let result = worker.ask(EchoMsg::Count).await;
        assert!(matches!(
            result,
            Err(DeliveryError::Stopped(_)) | Err(DeliveryError::NoReply(_))
        ));
        assert!(!worker.is_alive());
    }

    #[tokio::test]
    async fn test_pipe_to_delivers_none_when_sender_dropped() {
        let (tx, rx) = oneshot::channel::<u32>();
        let (target, mut inbox) = {
            let (mtx, mrx) = mpsc::channel::<Option<u32>>(1);
            let target = WorkerRef {
                tx: mtx,
                status: Arc::new(ChildStatus::new("target")),
            };
            (target, mrx)
        };
        pipe_to(rx, target.downgrade(), |v| v);
        drop(tx);
        assert_eq!(inbox.recv().await, Some(None));
    }
}
