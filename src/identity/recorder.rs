//! Records an observation against a resolved cluster.

use crate::db::{ContactDb, DbContact, NewContact};
use crate::error::IdentifyError;
use crate::types::Observation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub primary_id: i64,
    /// Id of the secondary inserted for new information, if any.
    pub inserted: Option<i64>,
}

/// Insert one secondary under `true_primary` if the observation carries an
/// email or phone number the cluster has not seen. A fully known observation
/// writes nothing.
pub fn reconcile(
    db: &ContactDb,
    obs: &Observation,
    cluster: &[DbContact],
    true_primary: &DbContact,
) -> Result<ReconcileOutcome, IdentifyError> {
    let has_new_email = obs
        .email()
        .is_some_and(|email| !cluster.iter().any(|c| c.email.as_deref() == Some(email)));
    let has_new_phone = obs.phone_number().is_some_and(|phone| {
        !cluster
            .iter()
            .any(|c| c.phone_number.as_deref() == Some(phone))
    });

    let inserted = if has_new_email || has_new_phone {
        let id = db.insert_contact(&NewContact::secondary(
            obs.email(),
            obs.phone_number(),
            true_primary.id,
        ))?;
        log::debug!(
            "Recorder: inserted secondary {} under primary {} (new email: {}, new phone: {})",
            id,
            true_primary.id,
            has_new_email,
            has_new_phone
        );
        Some(id)
    } else {
        log::debug!(
            "Recorder: observation already known to primary {}",
            true_primary.id
        );
        None
    };

    Ok(ReconcileOutcome {
        primary_id: true_primary.id,
        inserted,
    })
}
