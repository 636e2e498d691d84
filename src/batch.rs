//! Fan-out over many independent files. The engine keeps no shared mutable
//! state, so each file is read on its own rayon worker.

use crate::aggregator;
use crate::format::FormatRegistry;
use crate::model::TagData;
use crate::prelude::*;
use crate::settings::Settings;
use rayon::prelude::*;
use std::path::PathBuf;

/// Read the merged tag of every path in parallel. Per-file failures are
/// returned alongside the path instead of aborting the batch.
pub fn read_many(paths: &[PathBuf], settings: &Settings) -> Vec<(PathBuf, R<TagData>)> {
    let registry = FormatRegistry::new();
    paths
        .par_iter()
        .map(|path| {
            let result = aggregator::open_path(path, &registry, settings).map(|open| open.tag);
            (path.clone(), result)
        })
        .collect()
}
