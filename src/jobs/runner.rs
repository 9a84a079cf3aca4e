use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
    backfill_page, backwards_check_page, forwards_check_page, CollectionGroup, Cursor,
    Inconsistency, JobError, PageReport,
};
use crate::config::BatchConfig;
use crate::engine::Engine;
use crate::store::DocumentStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    BackwardsCheck,
    ForwardsCheck,
    Backfill,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::BackwardsCheck => "backwards-check",
            JobKind::ForwardsCheck => "forwards-check",
            JobKind::Backfill => "backfill",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Totals over a whole job.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub pages: usize,
    pub processed: usize,
    pub written: usize,
    pub inconsistencies: Vec<Inconsistency>,
}

impl JobSummary {
    pub fn is_consistent(&self) -> bool {
        self.inconsistencies.is_empty()
    }
}

/// Process one page of `kind`.
pub fn run_page<S: DocumentStore>(
    kind: JobKind,
    engine: &Engine<S>,
    groups: &[CollectionGroup],
    cursor: &Cursor,
    config: &BatchConfig,
) -> Result<PageReport, JobError> {
    match kind {
        JobKind::BackwardsCheck => backwards_check_page(engine, groups, cursor, config),
        JobKind::ForwardsCheck => forwards_check_page(engine, groups, cursor, config),
        JobKind::Backfill => backfill_page(engine, groups, cursor, config),
    }
}

/// Run `kind` from the first group to completion. Inconsistencies are
/// collected and the job goes on; structural errors stop it.
pub fn run_job<S: DocumentStore>(
    kind: JobKind,
    engine: &Engine<S>,
    groups: &[CollectionGroup],
    config: &BatchConfig,
) -> Result<JobSummary, JobError> {
    let mut summary = JobSummary::default();
    let mut cursor = Cursor {
        done: groups.is_empty(),
        ..Cursor::start()
    };
    while !cursor.done {
        let report = run_page(kind, engine, groups, &cursor, config)?;
        if !report.inconsistencies.is_empty() {
            warn!(
                job = %kind,
                group = cursor.group,
                inconsistencies = report.inconsistencies.len(),
                "page found inconsistencies"
            );
        }
        summary.pages += 1;
        summary.processed += report.processed;
        summary.written += report.written;
        summary.inconsistencies.extend(report.inconsistencies);
        cursor = report.cursor;
    }
    info!(
        job = %kind,
        pages = summary.pages,
        processed = summary.processed,
        written = summary.written,
        inconsistencies = summary.inconsistencies.len(),
        "job finished"
    );
    Ok(summary)
}
