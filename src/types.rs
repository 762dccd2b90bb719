//! Request and response shapes exchanged with the HTTP boundary.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::IdentifyError;

/// Body of `POST /identify`.
///
/// `phoneNumber` arrives as a string from most clients but some send a bare
/// number; both are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub phone_number: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Text(s)) => Some(s),
        Some(Raw::Int(n)) => Some(n.to_string()),
        Some(Raw::Float(f)) => Some(f.to_string()),
    })
}

/// A validated (email, phone) pair, trimmed, with empty values dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    email: Option<String>,
    phone_number: Option<String>,
}

impl Observation {
    /// Normalise raw inputs. Fails with `InvalidInput` when both are absent.
    pub fn new(email: Option<&str>, phone_number: Option<&str>) -> Result<Self, IdentifyError> {
        let email = clean(email);
        let phone_number = clean(phone_number);
        if email.is_none() && phone_number.is_none() {
            return Err(IdentifyError::InvalidInput);
        }
        Ok(Self {
            email,
            phone_number,
        })
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl TryFrom<&IdentifyRequest> for Observation {
    type Error = IdentifyError;

    fn try_from(req: &IdentifyRequest) -> Result<Self, Self::Error> {
        Observation::new(req.email.as_deref(), req.phone_number.as_deref())
    }
}

/// The consolidated view of one identity cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSummary {
    /// Serialized under the field name existing consumers already parse.
    #[serde(rename = "primaryContatctId")]
    pub primary_contact_id: i64,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<i64>,
}

/// Body returned by `POST /identify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifyResponse {
    pub contact: ContactSummary,
}

/// Result of the liveness probe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contacts: Option<i64>,
}
