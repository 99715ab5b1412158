//! Booking concurrency and availability core for a table-reservation
//! service. Guarantees that no two guests are ever confirmed into
//! overlapping ranges on the same table and date, under concurrent
//! requests, via per-(table, date) locking plus a storage-level overlap
//! guard. HTTP, auth, and rendering live in the embedding service.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod journal;
pub mod limits;
pub mod lock;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod registry;

pub use catalog::SlotCatalog;
pub use config::Config;
pub use engine::{BookingEngine, Error};
pub use lock::{InProcessLocks, LockBackend, LockManager, LockToken};
pub use notify::NotifyHub;
pub use registry::TableRegistry;
