//! The worker tree
//!
//! ```text
//! Supervisor
//! ├── search, tags, channel-profile   (collaborator calls)
//! ├── readability, sentiment          (batch enrichment)
//! ├── word-stats                      (cumulative word table)
//! └── coordinator-<session> ...       (one per client session)
//! ```

pub mod channel_profile;
pub mod coordinator;
pub mod mailbox;
pub mod messages;
pub mod policy;
pub mod readability;
pub mod search;
pub mod sentiment;
pub mod supervisor;
pub mod tags;
pub mod word_stats;

pub use mailbox::{
    pipe_to, spawn_worker, ChildStatusSnapshot, DeliveryError, FaultReporter, WeakWorkerRef,
    Worker, WorkerRef,
};
pub use messages::{ClientReply, Inbound};
pub use policy::{directive_for, FaultEvent, WorkerFault};
pub use supervisor::{
    worker_factory, ClientSession, Supervisor, WorkerFactory, WorkerOverrides, WorkerSettings,
};
