//! Draft image pipeline: per-item locking, sequence allocation, file
//! placement and record persistence.
//!
//! [`UploadCoordinator`] is the entry point. It owns a [`LockManager`] over
//! a shared [`LockStore`](thrift_core::store::LockStore), a
//! [`SequenceAllocator`] reading the draft store, and the on-disk
//! [`ImageStorage`].

pub mod allocator;
pub mod coordinator;
pub mod error;
pub mod lock;
pub mod storage;

pub use allocator::SequenceAllocator;
pub use coordinator::{ReconcileReport, UploadCoordinator};
pub use error::{LockError, UploadError, UploadResult, UploadStage};
pub use lock::{LockGuard, LockManager};
pub use storage::{ImageStorage, StagedFile};
