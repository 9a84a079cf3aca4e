use tracing::info;

use super::{expected_page, with_expected, CollectionGroup, Cursor, JobError, PageReport};
use crate::config::BatchConfig;
use crate::engine::Engine;
use crate::store::{DocumentStore, Transaction};

/// Write the page's expected rows that are not stored yet, in one
/// transaction. Stored rows are left alone even when they differ.
pub fn backfill_page<S: DocumentStore>(
    engine: &Engine<S>,
    groups: &[CollectionGroup],
    cursor: &Cursor,
    config: &BatchConfig,
) -> Result<PageReport, JobError> {
    if cursor.done {
        return Ok(PageReport::finished(cursor));
    }
    let group = cursor.group(groups)?;
    let width = group.actual.schema.len();
    let limit = config.page_size.max(1);
    let (items, full) = with_expected(engine, group, |expected| {
        expected_page(expected, cursor, width, limit)
    })?;

    let written = engine
        .store()
        .transaction(|tx: &mut dyn Transaction| -> Result<usize, JobError> {
            let mut written = 0;
            for item in &items {
                let path = group.actual.doc_path(&item.key)?;
                if tx.get(&path)?.is_none() {
                    tx.set(path, item.value.clone())?;
                    written += 1;
                }
            }
            Ok(written)
        })?;

    let report = PageReport {
        cursor: cursor.advance(groups.len(), items.last().map(|item| item.key.clone()), full),
        processed: items.len(),
        inconsistencies: vec![],
        written,
    };
    info!(group = %group.name, processed = report.processed, written, "backfill page");
    Ok(report)
}

