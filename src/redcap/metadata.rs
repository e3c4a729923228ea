//! De-identification via the REDCap data dictionary.
//!
//! Each field in a project's metadata carries an `identifier` marker; `"y"`
//! means the field holds identifying information. De-identified syncs ask
//! REDCap for every other field by name instead of stripping the record
//! locally, so identifying values never leave the server.

use serde::Deserialize;

use crate::config::ProjectRef;
use crate::error::Result;

use super::client::{metadata_query, RedcapClient};

/// One entry of a project's data dictionary.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMetadata {
    pub field_name: String,
    #[serde(default)]
    pub identifier: String,
}

impl FieldMetadata {
    /// Whether REDCap flags this field as identifying.
    #[must_use]
    pub fn is_identifier(&self) -> bool {
        self.identifier == "y"
    }
}

/// Parse a `content=metadata` response body.
///
/// # Errors
///
/// Returns a JSON error if the body is not a list of field descriptors.
pub fn parse_metadata(body: &[u8]) -> Result<Vec<FieldMetadata>> {
    Ok(serde_json::from_slice(body)?)
}

/// Names of all fields not flagged as identifying, in dictionary order.
#[must_use]
pub fn non_identifying_fields(metadata: &[FieldMetadata]) -> Vec<String> {
    metadata
        .iter()
        .filter(|f| !f.is_identifier())
        .map(|f| f.field_name.clone())
        .collect()
}

/// Comma-joined `fields` value for a de-identified record query, or `None`
/// when every field is identifying.
///
/// REDCap treats an empty `fields` parameter as "all fields", so `None` must
/// never be turned into a query.
#[must_use]
pub fn fields_param(metadata: &[FieldMetadata]) -> Option<String> {
    let fields = non_identifying_fields(metadata);
    if fields.is_empty() {
        None
    } else {
        Some(fields.join(","))
    }
}

/// Fetch a project's dictionary and return the `fields` value for a
/// de-identified record query. See [`fields_param`].
///
/// # Errors
///
/// Returns fetch errors from the client, or a JSON error for a malformed
/// dictionary.
pub async fn deidentified_fields(
    client: &RedcapClient,
    project: &ProjectRef,
    context: &str,
) -> Result<Option<String>> {
    let body = client
        .post(&project.api_url, &metadata_query(&project.api_key), context)
        .await?;
    let metadata = parse_metadata(&body)?;
    Ok(fields_param(&metadata))
}
