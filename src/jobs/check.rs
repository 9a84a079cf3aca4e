use std::ops::Bound;

use tracing::{error, info};

use super::{
    expected_page, json_diff, with_expected, CollectionGroup, Cursor, Inconsistency, JobError,
    PageReport,
};
use crate::config::BatchConfig;
use crate::engine::Engine;
use crate::key::single_value;
use crate::space::read_range_from_single_slice;
use crate::store::DocumentStore;

/// Check that every stored key of the cursor's group is produced by the
/// expected collection. An unexpected key halts the job.
pub fn backwards_check_page<S: DocumentStore>(
    engine: &Engine<S>,
    groups: &[CollectionGroup],
    cursor: &Cursor,
    config: &BatchConfig,
) -> Result<PageReport, JobError> {
    if cursor.done {
        return Ok(PageReport::finished(cursor));
    }
    let group = cursor.group(groups)?;
    let start = match &cursor.after {
        Some(after) => Bound::Excluded(group.actual.doc_path(after)?),
        None => Bound::Unbounded,
    };
    let limit = config.page_size.max(1);
    let mut page = engine.store().scan(&group.actual.root, start, limit + 1)?;
    let full = page.len() > limit;
    page.truncate(limit);

    let keys = page
        .iter()
        .filter_map(|(path, _)| group.actual.key_of(path))
        .collect::<Vec<_>>();
    with_expected(engine, group, |expected| {
        for key in &keys {
            if read_range_from_single_slice(expected, &single_value(key)?)?.is_empty() {
                error!(group = %group.name, %key, "stored key is not produced by the graph");
                return Err(JobError::UnexpectedKey {
                    group: group.name.clone(),
                    key: key.clone(),
                });
            }
        }
        Ok(())
    })?;

    let last = page.last().and_then(|(path, _)| group.actual.key_of(path));
    let report = PageReport {
        cursor: cursor.advance(groups.len(), last, full),
        processed: keys.len(),
        ..PageReport::default()
    };
    info!(group = %group.name, processed = report.processed, "backwards check page");
    Ok(report)
}

/// Compare every expected row of the page with the stored one. Mismatches
/// are reported, not corrected.
pub fn forwards_check_page<S: DocumentStore>(
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

    let mut inconsistencies = Vec::new();
    for item in &items {
        let actual = engine.store().get(&group.actual.doc_path(&item.key)?)?;
        if actual.as_ref() == Some(&item.value) {
            continue;
        }
        let differences = match &actual {
            Some(actual) => json_diff(&item.value, actual),
            None => vec![],
        };
        error!(
            group = %group.name,
            key = %item.key,
            differences = differences.len(),
            missing = actual.is_none(),
            "stored row differs from the graph"
        );
        inconsistencies.push(Inconsistency {
            group: group.name.clone(),
            key: item.key.clone(),
            expected: item.value.clone(),
            actual,
            differences,
        });
    }

    let report = PageReport {
        cursor: cursor.advance(groups.len(), items.last().map(|item| item.key.clone()), full),
        processed: items.len(),
        inconsistencies,
        written: 0,
    };
    info!(
        group = %group.name,
        processed = report.processed,
        inconsistencies = report.inconsistencies.len(),
        "forwards check page"
    );
    Ok(report)
}
