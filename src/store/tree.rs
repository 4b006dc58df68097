use std::collections::HashSet;

use uuid::Uuid;

use crate::{
    error::StoreError,
    models::comment::Comment,
    store::repository::{NodeRepository, Snapshot, SnapshotMode},
};

/// Breadth-first closure of `root_id`: the root followed by every transitive
/// descendant, level by level, all read through one snapshot.
///
/// Each level costs one `find_children` round trip, whatever the fan-out, and
/// never asks for more rows than the remaining budget allows. Fails with
/// `ResourceExceeded` as soon as the closure would grow past `max_nodes`, and
/// with `Internal` if a comment is reached twice, which only a corrupted
/// parent relation can cause.
pub async fn collect_closure(
    snapshot: &mut dyn Snapshot,
    root_id: Uuid,
    max_nodes: usize,
) -> Result<Vec<Comment>, StoreError> {
    let root = snapshot.get_by_id(root_id).await?;

    let mut visited = HashSet::from([root.id]);
    let mut frontier = vec![root.id];
    let mut closure = vec![root];

    while !frontier.is_empty() {
        // One row past the budget is enough to tell that it is exceeded.
        let budget = max_nodes.saturating_sub(closure.len()) + 1;
        let children = snapshot.find_children(&frontier, budget).await?;

        if closure.len() + children.len() > max_nodes {
            return Err(StoreError::ResourceExceeded(format!(
                "subtree of {root_id} exceeds {max_nodes} comments"
            )));
        }

        let mut next = Vec::with_capacity(children.len());
        for child in children {
            if !visited.insert(child.id) {
                tracing::error!(root = %root_id, comment = %child.id, "closure revisited a comment");
                return Err(StoreError::Internal(format!(
                    "comment {} reached twice while expanding subtree of {}",
                    child.id, root_id
                )));
            }
            next.push(child.id);
            closure.push(child);
        }

        frontier = next;
    }

    tracing::debug!(root = %root_id, size = closure.len(), "closure computed");
    Ok(closure)
}

/// The root and all of its descendants, oldest first.
pub async fn fetch_subtree(
    repo: &dyn NodeRepository,
    root_id: Uuid,
    max_nodes: usize,
) -> Result<Vec<Comment>, StoreError> {
    let mut snapshot = repo.snapshot(SnapshotMode::Read).await?;
    let mut comments = collect_closure(snapshot.as_mut(), root_id, max_nodes).await?;
    snapshot.commit().await?;

    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(comments)
}

/// Deletes the root and every descendant with a single bulk delete, in the
/// same transaction that computed the closure.
pub async fn delete_subtree(
    repo: &dyn NodeRepository,
    root_id: Uuid,
    max_nodes: usize,
) -> Result<u64, StoreError> {
    let mut snapshot = repo.snapshot(SnapshotMode::Write).await?;
    let closure = collect_closure(snapshot.as_mut(), root_id, max_nodes).await?;

    let ids: Vec<Uuid> = closure.iter().map(|c| c.id).collect();
    let deleted = snapshot.delete_by_ids(&ids).await?;
    snapshot.commit().await?;

    Ok(deleted)
}
