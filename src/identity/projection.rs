//! Builds the consolidated response for a cluster.

use crate::db::{ContactDb, DbContact};
use crate::error::IdentifyError;
use crate::types::ContactSummary;

/// Reload the cluster rooted at `primary_id` and summarise it.
pub fn project(db: &ContactDb, primary_id: i64) -> Result<ContactSummary, IdentifyError> {
    let members = db.get_all_in_cluster(primary_id)?;
    summarize(primary_id, &members)
}

/// Summarise cluster members (oldest first). The primary's own values lead
/// each list; secondaries follow in creation order; duplicates and absent
/// values are dropped.
pub fn summarize(primary_id: i64, members: &[DbContact]) -> Result<ContactSummary, IdentifyError> {
    let primary = members
        .iter()
        .find(|c| c.id == primary_id && c.is_primary())
        .ok_or_else(|| {
            log::error!("Projection: contact {primary_id} is not a live primary");
            IdentifyError::InvariantViolation(format!(
                "contact {primary_id} is not a live primary"
            ))
        })?;
    let secondaries: Vec<&DbContact> = members.iter().filter(|c| c.id != primary_id).collect();

    let ordered = || std::iter::once(primary).chain(secondaries.iter().copied());
    let emails = distinct(ordered().filter_map(|c| c.email.as_deref()));
    let phone_numbers = distinct(ordered().filter_map(|c| c.phone_number.as_deref()));

    Ok(ContactSummary {
        primary_contact_id: primary_id,
        emails,
        phone_numbers,
        secondary_contact_ids: secondaries.iter().map(|c| c.id).collect(),
    })
}

/// First-seen order, duplicates removed.
fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.iter().any(|v| v == value) {
            out.push(value.to_string());
        }
    }
    out
}
