use super::listing::RemoteEntry;

/// The retention plan for one run: which destination entries survive and
/// which are deleted, oldest-last order preserved for logging. Derived
/// fresh each run, never persisted.
#[derive(Debug, Default)]
pub struct RetentionDecision {
    pub keep: Vec<RemoteEntry>,
    pub delete: Vec<RemoteEntry>,
}

/// Compute which entries to delete so that at most `keep` artifacts
/// remain. Collections are never candidates. Entries are ranked by
/// `last_modified` descending, ties by name descending so the decision is
/// deterministic; everything beyond the first `keep` is deleted.
pub fn plan(entries: &[RemoteEntry], keep: usize) -> RetentionDecision {
    let mut files: Vec<RemoteEntry> = entries
        .iter()
        .filter(|e| !e.is_collection)
        .cloned()
        .collect();

    files.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| b.name.cmp(&a.name))
    });

    // Explicit under-limit path: nothing to delete.
    if files.len() <= keep {
        return RetentionDecision {
            keep: files,
            delete: Vec::new(),
        };
    }

    let delete = files.split_off(keep);
    RetentionDecision {
        keep: files,
        delete,
    }
}
