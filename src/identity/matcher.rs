//! Finds every existing contact that shares a field with an observation.

use crate::db::{ContactDb, DbContact};
use crate::error::IdentifyError;
use crate::types::Observation;

/// Live contacts whose email or phone number equals the observation's.
/// Exact equality only; the observation is already trimmed.
pub fn find_matches(db: &ContactDb, obs: &Observation) -> Result<Vec<DbContact>, IdentifyError> {
    let matches = db.find_matches(obs.email(), obs.phone_number())?;
    log::debug!(
        "Matcher: {} contact(s) share a field with the observation",
        matches.len()
    );
    Ok(matches)
}
