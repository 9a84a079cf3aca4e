//! Incremental view maintenance for action-sourced state.
//!
//! Inputs are keyed collections of JSON documents. Derived collections are
//! described as a graph of [`op`] operators and kept up to date by
//! propagating diffs instead of recomputing. Every write goes through an
//! optimistic [`commit`] that records a content-addressed [`action`] and
//! fails cleanly when a concurrent writer changed what it read.

pub mod action;
pub mod commit;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod key;
pub mod op;
pub mod space;
pub mod store;

pub use action::{
    ActionError, ActionId, ActionIdGenerator, Clock, ManualClock, SavedAction, SystemClock,
};
pub use commit::{
    execute_commit, Commit, CommitBuilder, CommitError, CommitOutcome, Conflict, FacetId,
    FacetWrite, Kollection, Membership, Pointer, ReadSet, ReadTracker, TrackedReadable, Validator,
};
pub use config::{BatchConfig, EngineConfig};
pub use diff::{diff_to_change, Change, Diff, Mapper};
pub use engine::{Engine, InputDiffs, IntegrateError, IntegrationContext, ACTION_COMMITTED};
pub use error::EngineError;
pub use jobs::{
    backfill_page, backwards_check_page, forwards_check_page, run_job, CollectionGroup, Cursor,
    Inconsistency, JobError, JobKind, PageReport,
};
pub use key::{key_successor, single_value, Key, Range, Schema};
pub use op::{Collection, DirectoryOp, MonoOp};
pub use space::{Item, Readable, ScrambledSpace, Slice, SortedItems};
pub use store::{CollectionPath, DocPath, DocumentStore, InMemoryDocumentStore, StoreError};

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
