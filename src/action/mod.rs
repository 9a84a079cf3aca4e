//! Content-addressed action log.
//!
//! An [`ActionId`] is `prefix + timestamp + hash`, where the timestamp is
//! never earlier than any parent's and the hash covers the saved action with
//! its parents. Ids are deterministic for a given clock reading and can be
//! ordered causally by decoding their timestamps.

mod clock;
mod error;
mod timestamp;

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ActionError;
pub use timestamp::{format_millis, parse_millis, MAX_MILLIS, TIMESTAMP_LEN};

/// Identifier of a committed action.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    pub fn new(id: impl Into<String>) -> Self {
        ActionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The embedded timestamp, in milliseconds since the epoch.
    ///
    /// The timestamp is the first 24-character window that parses, so the
    /// prefix must not itself contain a timestamp.
    pub fn timestamp_millis(&self) -> Result<u64, ActionError> {
        let s = self.0.as_str();
        s.char_indices()
            .filter_map(|(start, _)| s.get(start..start + TIMESTAMP_LEN))
            .find_map(parse_millis)
            .ok_or_else(|| ActionError::InvalidActionId(self.0.clone()))
    }

    /// True when `self` is not earlier than `other` by embedded time.
    pub fn happened_after(&self, other: &ActionId) -> Result<bool, ActionError> {
        Ok(self.timestamp_millis()? >= other.timestamp_millis()?)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A logged action together with the versions it was derived from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedAction<A> {
    pub parents: Vec<ActionId>,
    pub action: A,
}

impl<A> SavedAction<A> {
    /// Parents are sorted and deduplicated.
    pub fn new(parents: impl IntoIterator<Item = ActionId>, action: A) -> Self {
        let mut parents: Vec<ActionId> = parents.into_iter().collect();
        parents.sort();
        parents.dedup();
        SavedAction { parents, action }
    }
}

/// Mints [`ActionId`]s.
#[derive(Clone)]
pub struct ActionIdGenerator {
    prefix: String,
    hash_prefix_len: usize,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for ActionIdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionIdGenerator")
            .field("prefix", &self.prefix)
            .field("hash_prefix_len", &self.hash_prefix_len)
            .finish_non_exhaustive()
    }
}

impl ActionIdGenerator {
    pub fn new(prefix: impl Into<String>, hash_prefix_len: usize, clock: Arc<dyn Clock>) -> Self {
        ActionIdGenerator {
            prefix: prefix.into(),
            hash_prefix_len,
            clock,
        }
    }

    /// Id for `saved`, timestamped at `max(now, latest parent)`.
    pub fn generate<A: Serialize>(&self, saved: &SavedAction<A>) -> Result<ActionId, ActionError> {
        let latest_parent = saved
            .parents
            .iter()
            .map(ActionId::timestamp_millis)
            .try_fold(0, |latest, ts| ts.map(|ts| latest.max(ts)))?;
        let millis = self.clock.now_millis().max(latest_parent);
        let hash = content_hash(saved)?;
        let hash = hash.get(..self.hash_prefix_len).unwrap_or(&hash);
        Ok(ActionId(format!(
            "{}{}{}",
            self.prefix,
            format_millis(millis)?,
            hash
        )))
    }
}

/// base64url(sha256(canonical JSON)). `serde_json` objects keep keys sorted,
/// so equal values hash equally regardless of field order.
pub fn content_hash<A: Serialize>(saved: &SavedAction<A>) -> Result<String, ActionError> {
    let canonical = serde_json::to_value(saved)?.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(digest))
}
