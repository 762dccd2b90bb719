//! Cluster merger.
//!
//! Given the contacts an observation matched, loads every cluster they belong
//! to, keeps the oldest primary and demotes the rest under it. Secondaries of
//! a demoted primary are relinked straight to the survivor, so no secondary
//! ever points at another secondary.

use std::collections::BTreeSet;

use crate::db::{now_timestamp, ContactDb, DbContact};
use crate::error::IdentifyError;

/// What a merge did, plus the unified cluster it left behind.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub true_primary: DbContact,
    /// Primaries turned into secondaries of `true_primary`, oldest first.
    pub demoted: Vec<i64>,
    /// Secondaries moved from a demoted primary to `true_primary`.
    pub relinked: usize,
    /// Every member of the unified cluster, oldest first.
    pub cluster: Vec<DbContact>,
}

/// Distinct cluster roots for a set of matched contacts, ascending.
pub fn cluster_roots(matches: &[DbContact]) -> Result<Vec<i64>, IdentifyError> {
    let mut roots = BTreeSet::new();
    for contact in matches {
        let root = contact.root_id().ok_or_else(|| {
            invariant(format!("secondary contact {} has no linked primary", contact.id))
        })?;
        roots.insert(root);
    }
    Ok(roots.into_iter().collect())
}

/// The oldest primary in `cluster`; equal timestamps fall back to the smaller id.
pub fn select_true_primary(cluster: &[DbContact]) -> Option<&DbContact> {
    cluster
        .iter()
        .filter(|c| c.is_primary())
        .min_by(|a, b| (a.created_at.as_str(), a.id).cmp(&(b.created_at.as_str(), b.id)))
}

/// Unify every cluster touched by `matches` under its oldest primary.
///
/// Must run inside the caller's transaction: the demotions and relinks are
/// only safe if nothing else writes between the cluster read and the updates.
pub fn resolve_cluster(
    db: &ContactDb,
    matches: &[DbContact],
) -> Result<MergeOutcome, IdentifyError> {
    let roots = cluster_roots(matches)?;
    let members = db.get_cluster(&roots)?;

    for root in &roots {
        if !members.iter().any(|c| c.id == *root && c.is_primary()) {
            return Err(invariant(format!(
                "cluster root {root} is not a live primary"
            )));
        }
    }

    let true_primary = select_true_primary(&members)
        .cloned()
        .ok_or_else(|| invariant(format!("no primary among clusters {roots:?}")))?;

    let demoted: Vec<i64> = members
        .iter()
        .filter(|c| c.is_primary() && c.id != true_primary.id)
        .map(|c| c.id)
        .collect();

    let mut relinked = 0;
    if !demoted.is_empty() {
        let now = now_timestamp();
        for id in &demoted {
            if db.demote_primary(*id, true_primary.id, &now)? != 1 {
                return Err(invariant(format!("primary {id} changed during merge")));
            }
            relinked += db.relink_secondaries(*id, true_primary.id, &now)?;
        }
        log::info!(
            "Merged {} cluster(s) into primary {} (demoted {:?}, relinked {} secondary row(s))",
            demoted.len(),
            true_primary.id,
            demoted,
            relinked
        );
    }

    let cluster = db.get_all_in_cluster(true_primary.id)?;
    verify_cluster(db, &true_primary, &demoted, &cluster)?;

    Ok(MergeOutcome {
        true_primary,
        demoted,
        relinked,
        cluster,
    })
}

/// Check the unified cluster: one primary at its head, everyone else a
/// secondary linked straight to it, and nothing left pointing at a demoted root.
fn verify_cluster(
    db: &ContactDb,
    true_primary: &DbContact,
    demoted: &[i64],
    cluster: &[DbContact],
) -> Result<(), IdentifyError> {
    let head = cluster
        .iter()
        .find(|c| c.id == true_primary.id)
        .ok_or_else(|| invariant(format!("primary {} vanished", true_primary.id)))?;
    if !head.is_primary() || head.linked_id.is_some() {
        return Err(invariant(format!(
            "primary {} is no longer an unlinked primary",
            head.id
        )));
    }

    if let Some(extra) = cluster
        .iter()
        .find(|c| c.id != head.id && (c.is_primary() || c.linked_id != Some(head.id)))
    {
        return Err(invariant(format!(
            "contact {} in cluster {} is not a secondary of it",
            extra.id, head.id
        )));
    }

    let stale = db.count_links_to(demoted)?;
    if stale > 0 {
        return Err(invariant(format!(
            "{stale} contact(s) still link to demoted primaries {demoted:?}"
        )));
    }

    Ok(())
}

fn invariant(message: String) -> IdentifyError {
    log::error!("Invariant violation: {message}");
    IdentifyError::InvariantViolation(message)
}
