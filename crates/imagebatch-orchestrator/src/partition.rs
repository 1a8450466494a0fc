//! Split a flat request list into per-route groups

use std::collections::HashSet;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::error::{BatchError, Result};
use crate::model::{BatchProviderKind, ImageModel, Route};
use crate::types::{RequestItem, RoutedItem};

/// Disjoint, exhaustive grouping of one batch's items by execution route
///
/// Group membership depends only on each item's model. Within a group,
/// items keep their submission order.
#[derive(Debug, Default)]
pub struct Partition {
    /// Items for each asynchronous batch provider, in first-seen order
    pub batches: IndexMap<BatchProviderKind, Vec<RoutedItem>>,
    /// Items for the synchronous-only provider
    pub synchronous: Vec<RoutedItem>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.synchronous.len() + self.batches.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validate and route a batch request
///
/// # Errors
///
/// Fails the whole batch on an empty list, a blank or repeated correlation
/// id, a blank prompt, or a model missing from the model table
pub fn partition(items: Vec<RequestItem>) -> Result<Partition> {
    if items.is_empty() {
        return Err(BatchError::InvalidRequest("requests must not be empty".to_string()));
    }

    let mut seen = HashSet::with_capacity(items.len());
    let mut partition = Partition::default();

    for item in items {
        if item.correlation_id.trim().is_empty() {
            return Err(BatchError::InvalidRequest("correlation_id must not be blank".to_string()));
        }

        if item.input.trim().is_empty() {
            return Err(BatchError::InvalidRequest(format!(
                "input for '{}' must not be blank",
                item.correlation_id
            )));
        }

        if !seen.insert(item.correlation_id.clone()) {
            return Err(BatchError::InvalidRequest(format!(
                "duplicate correlation_id '{}'",
                item.correlation_id
            )));
        }

        let model = ImageModel::from_str(&item.model).map_err(|_| BatchError::UnknownModel(item.model.clone()))?;

        let routed = RoutedItem {
            correlation_id: item.correlation_id,
            input: item.input,
            model,
        };

        match model.route() {
            Route::Batch(kind) => partition.batches.entry(kind).or_default().push(routed),
            Route::Synchronous => partition.synchronous.push(routed),
        }
    }

    Ok(partition)
}
