//! Integration driver.
//!
//! An [`Engine`] owns a store, the registered input collections, the
//! export graph and a membership function. [`Engine::integrate`] runs one
//! action end to end:
//!
//! 1. reads inputs through [`TrackedReadable`]s so every observed version
//!    lands in one read set,
//! 2. asks the integrator for input diffs,
//! 3. propagates them through the export graph, reading every sort from
//!    its persisted copy under `sorted/<name>`,
//! 4. commits facets, kollections, sorted rows and exports together,
//!    retrying from step 1 when a concurrent writer got there first.
//!
//! ```ignore
//! let engine = Engine::new(InMemoryDocumentStore::new())
//!     .input("game", Schema::new(["game"]))
//!     .export("gamesByPlayer", games_by_player);
//!
//! engine.integrate(json!({"type": "join"}), |ctx| {
//!     let old = ctx.get("game", &key)?;
//!     Ok(InputDiffs::from([("game".into(), vec![..])]))
//! })?;
//! ```

mod error;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
#[cfg(feature = "emitter")]
use std::sync::Mutex;

#[cfg(feature = "emitter")]
use event_emitter_rs::EventEmitter;
use serde_json::Value;
use tracing::{debug, warn};

use crate::action::{ActionId, ActionIdGenerator, Clock, SystemClock};
use crate::commit::{
    CommitBuilder, CommitError, CommitOutcome, Membership, ReadTracker, TrackedReadable, Validator,
};
use crate::config::EngineConfig;
use crate::diff::Diff;
use crate::error::EngineError;
use crate::key::{Key, Range, Schema};
use crate::op::{Collection, DirectoryOp, Inputs};
use crate::space::{Item, Readable, ReadableSpace, ScrambledSpace};
use crate::store::{CollectionPath, DocumentStore, StoreError};

pub use error::IntegrateError;

/// Event fired with the new action id after every successful integration.
pub const ACTION_COMMITTED: &str = "action.committed";

/// Input diffs keyed by collection name.
pub type InputDiffs = BTreeMap<String, Vec<Diff<Value>>>;

#[derive(Clone)]
struct InputCollection {
    schema: Schema,
    validator: Option<Validator>,
}

/// Read access handed to an integrator.
pub struct IntegrationContext<'a, S> {
    readables: &'a BTreeMap<String, TrackedReadable<'a, S>>,
    tracker: &'a ReadTracker,
}

impl<'a, S: DocumentStore> IntegrationContext<'a, S> {
    pub fn readable(&self, collection: &str) -> Result<&TrackedReadable<'a, S>, IntegrateError> {
        self.readables
            .get(collection)
            .ok_or_else(|| EngineError::UnknownCollection(collection.to_string()).into())
    }

    /// Current value of one facet.
    pub fn get(&self, collection: &str, key: &Key) -> Result<Option<Value>, IntegrateError> {
        Ok(self.readable(collection)?.get(key)?)
    }

    /// Every facet of `collection` inside `range`, in key order.
    pub fn scan(
        &self,
        collection: &str,
        range: &Range,
    ) -> Result<Vec<Item<Value>>, IntegrateError> {
        let readable = self.readable(collection)?;
        let mut items = Vec::new();
        for item in readable.seek_to(range.start()) {
            if !range.contains(&item.key)? {
                break;
            }
            items.push(item);
        }
        if let Some(err) = self.tracker.take_error()? {
            return Err(err.into());
        }
        Ok(items)
    }
}

/// Registry of inputs and exports over one store.
pub struct Engine<S> {
    store: S,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    inputs: BTreeMap<String, InputCollection>,
    directory: DirectoryOp<Value>,
    membership: Option<Membership>,
    #[cfg(feature = "emitter")]
    emitter: Mutex<EventEmitter>,
}

impl<S> fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field(
                "exports",
                &self.directory.outputs().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            inputs: BTreeMap::new(),
            directory: DirectoryOp::new(),
            membership: None,
            #[cfg(feature = "emitter")]
            emitter: Mutex::new(EventEmitter::new()),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a stored input collection.
    pub fn input(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.inputs.insert(
            name.into(),
            InputCollection {
                schema,
                validator: None,
            },
        );
        self
    }

    /// Register an input whose documents are checked on every read.
    pub fn validated_input(
        mut self,
        name: impl Into<String>,
        schema: Schema,
        validator: Validator,
    ) -> Self {
        self.inputs.insert(
            name.into(),
            InputCollection {
                schema,
                validator: Some(validator),
            },
        );
        self
    }

    /// Register a derived collection, written under `exports/<name>`.
    pub fn export(mut self, name: impl Into<String>, collection: Collection<Value>) -> Self {
        self.directory = self.directory.output(name, collection);
        self
    }

    pub fn membership(mut self, membership: Membership) -> Self {
        self.membership = Some(membership);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn directory(&self) -> &DirectoryOp<Value> {
        &self.directory
    }

    pub fn input_schemas(&self) -> BTreeMap<String, Schema> {
        self.inputs
            .iter()
            .map(|(name, input)| (name.clone(), input.schema.clone()))
            .collect()
    }

    pub fn input_path(&self, name: &str) -> Result<CollectionPath, EngineError> {
        self.inputs
            .get(name)
            .map(|input| CollectionPath::facets(name, input.schema.clone()))
            .ok_or_else(|| EngineError::UnknownCollection(name.to_string()))
    }

    pub fn export_path(&self, name: &str) -> Result<CollectionPath, EngineError> {
        let collection = self
            .directory
            .get(name)
            .ok_or_else(|| EngineError::UnknownCollection(name.to_string()))?;
        Ok(CollectionPath::exports(
            name,
            collection.schema(&self.input_schemas())?,
        ))
    }

    /// Where the sort `name` is persisted.
    pub fn sorted_path(&self, name: &str) -> Result<CollectionPath, EngineError> {
        let node = self
            .directory
            .sorts()
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::UnknownCollection(name.to_string()))?;
        Ok(CollectionPath::sorted(name, node.schema(&self.input_schemas())?))
    }

    /// Snapshot read of a persisted sorted row.
    pub fn sorted_row(&self, name: &str, key: &Key) -> Result<Option<Value>, IntegrateError> {
        let path = self.sorted_path(name)?.doc_path(key)?;
        Ok(self.store.get(&path)?)
    }

    /// Snapshot read of a stored facet.
    pub fn facet(&self, collection: &str, key: &Key) -> Result<Option<Value>, IntegrateError> {
        let path = self.input_path(collection)?.doc_path(key)?;
        Ok(self.store.get(&path)?)
    }

    /// Snapshot read of a stored export row.
    pub fn export_row(&self, name: &str, key: &Key) -> Result<Option<Value>, IntegrateError> {
        let path = self.export_path(name)?.doc_path(key)?;
        Ok(self.store.get(&path)?)
    }

    fn ids(&self) -> ActionIdGenerator {
        ActionIdGenerator::new(
            self.config.action_id_prefix.clone(),
            self.config.hash_prefix_len,
            self.clock.clone(),
        )
    }

    /// A readable per registered input, all recording into `tracker`.
    pub(crate) fn readables<'a>(
        &'a self,
        tracker: &'a ReadTracker,
    ) -> BTreeMap<String, TrackedReadable<'a, S>> {
        self.inputs
            .iter()
            .map(|(name, input)| {
                let readable = TrackedReadable::new(
                    &self.store,
                    tracker,
                    name.as_str(),
                    input.schema.clone(),
                    self.config.read_page_size,
                );
                let readable = match &input.validator {
                    Some(validator) => readable.with_validator(validator.clone()),
                    None => readable,
                };
                (name.clone(), readable)
            })
            .collect()
    }

    /// A readable per persisted sort. Store errors go to `tracker`.
    pub(crate) fn sorted_readables<'a>(
        &'a self,
        tracker: &'a ReadTracker,
    ) -> Result<BTreeMap<String, TrackedReadable<'a, S>>, EngineError> {
        self.directory
            .sorts()
            .into_keys()
            .map(|name| {
                let readable = TrackedReadable::derived(
                    &self.store,
                    tracker,
                    self.sorted_path(name)?,
                    self.config.read_page_size,
                );
                Ok((name.to_string(), readable))
            })
            .collect()
    }

    /// Integrate `action`, retrying on conflict.
    ///
    /// `integrator` may run several times; it must derive its diffs only
    /// from what it reads through the context.
    pub fn integrate<F>(&self, action: Value, mut integrator: F) -> Result<ActionId, IntegrateError>
    where
        F: FnMut(&IntegrationContext<'_, S>) -> Result<InputDiffs, IntegrateError>,
    {
        let attempts = self.config.max_commit_attempts.max(1);
        for attempt in 1..=attempts {
            match self.attempt(&action, &mut integrator) {
                Ok(CommitOutcome::Committed { action_id }) => {
                    self.notify(&action_id);
                    return Ok(action_id);
                }
                Ok(CommitOutcome::Conflict { conflicts }) => {
                    warn!(attempt, conflicts = conflicts.len(), "integration conflicted, retrying");
                }
                Err(IntegrateError::Store(StoreError::Aborted(reason)))
                | Err(IntegrateError::Commit(CommitError::Store(StoreError::Aborted(reason)))) => {
                    warn!(attempt, %reason, "transaction aborted, retrying");
                }
                Err(err) => return Err(err),
            }
        }
        Err(IntegrateError::RetriesExhausted { attempts })
    }

    fn attempt<F>(
        &self,
        action: &Value,
        integrator: &mut F,
    ) -> Result<CommitOutcome, IntegrateError>
    where
        F: FnMut(&IntegrationContext<'_, S>) -> Result<InputDiffs, IntegrateError>,
    {
        let tracker = ReadTracker::new();
        let readables = self.readables(&tracker);
        let diffs = integrator(&IntegrationContext {
            readables: &readables,
            tracker: &tracker,
        })?;
        if let Some(err) = tracker.take_error()? {
            return Err(err.into());
        }

        let sorted_readables = self.sorted_readables(&tracker)?;
        let spaces = spaces_of(&readables);
        let sorted_spaces = spaces_of(&sorted_readables);
        let propagation = self.directory.propagate_over(
            &inputs_of(&spaces),
            &inputs_of(&sorted_spaces),
            &diffs,
        )?;
        if let Some(err) = tracker.take_error()? {
            return Err(err.into());
        }
        debug!(
            inputs = diffs.len(),
            sorted = propagation.sorted.len(),
            exports = propagation.outputs.len(),
            "integration propagated"
        );

        let mut builder = CommitBuilder::new(action.clone());
        if let Some(membership) = &self.membership {
            builder = builder.membership(membership.clone());
        }
        for (name, batch) in &diffs {
            let input = self
                .inputs
                .get(name)
                .ok_or_else(|| EngineError::UnknownCollection(name.clone()))?;
            for diff in batch {
                input.schema.check(diff.key())?;
                builder = builder.diff(name, &input.schema, diff);
            }
        }
        for (name, batch) in &propagation.sorted {
            let path = self.sorted_path(name)?;
            for diff in batch {
                builder = builder.export(path.clone(), diff);
            }
        }
        for (name, batch) in &propagation.outputs {
            let path = self.export_path(name)?;
            for diff in batch {
                builder = builder.export(path.clone(), diff);
            }
        }

        // Blind writes and membership targets join the read set here.
        for facet in builder.unobserved_facets() {
            tracker.observe_facet(&self.store, &facet)?;
        }
        for id in builder.touched_kollections() {
            tracker.observe_kollection(&self.store, &id)?;
        }
        Ok(builder
            .read_set(tracker.read_set()?)
            .commit(&self.store, &self.ids())?)
    }

    #[cfg(feature = "emitter")]
    fn notify(&self, action_id: &ActionId) {
        match self.emitter.lock() {
            Ok(mut emitter) => {
                emitter.emit(ACTION_COMMITTED, action_id.to_string());
            }
            Err(_) => warn!(%action_id, "emitter lock poisoned, commit not announced"),
        }
    }

    #[cfg(not(feature = "emitter"))]
    fn notify(&self, action_id: &ActionId) {
        debug!(%action_id, "integrated");
    }

    /// Run `listener` with the action id after every successful integration.
    #[cfg(feature = "emitter")]
    pub fn on_commit<F>(&self, listener: F) -> Result<(), StoreError>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.emitter
            .lock()
            .map_err(|_| StoreError::LockPoisoned("emitter"))?
            .on(ACTION_COMMITTED, listener);
        Ok(())
    }
}

type StoredSpace<'r, 'a, S> = ReadableSpace<&'r TrackedReadable<'a, S>>;

pub(crate) fn spaces_of<'r, 'a, S: DocumentStore>(
    readables: &'r BTreeMap<String, TrackedReadable<'a, S>>,
) -> Vec<(&'r str, StoredSpace<'r, 'a, S>)> {
    readables
        .iter()
        .map(|(name, readable)| (name.as_str(), ReadableSpace::new(readable)))
        .collect()
}

pub(crate) fn inputs_of<'s, 'r, 'a, S: DocumentStore>(
    spaces: &'s [(&'r str, StoredSpace<'r, 'a, S>)],
) -> Inputs<'s, Value> {
    spaces
        .iter()
        .map(|(name, space)| (name.to_string(), space as &dyn ScrambledSpace<Value>))
        .collect()
}
