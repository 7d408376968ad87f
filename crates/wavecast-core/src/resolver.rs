//! Audience resolution
//!
//! Turns an audience specification (a single number, a contact group, or
//! uploaded rows) into the frozen recipient set a campaign is created
//! with. Numbers are normalized to E.164; invalid and duplicate entries
//! are dropped and reported rather than failing the whole campaign.

use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;
use wavecast_common::types::PhoneNumber;
use wavecast_storage::models::NewRecipient;
use wavecast_storage::repository::ContactRepository;

/// How a campaign's audience is specified at creation time
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudienceSpec {
    /// One ad-hoc recipient
    Single {
        mobile_number: String,
        #[serde(default)]
        variables: Vec<String>,
    },
    /// Every member of a contact group
    Group { group_id: Uuid },
    /// Rows uploaded with the request, each carrying its own variables
    Uploaded { rows: Vec<UploadedRow> },
}

/// One uploaded audience row
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedRow {
    pub mobile_number: String,
    #[serde(default)]
    pub variables: Vec<String>,
}

/// The outcome of resolving an audience specification
#[derive(Debug, Clone, Default)]
pub struct ResolvedAudience {
    /// Accepted recipients, normalized and deduplicated
    pub recipients: Vec<NewRecipient>,
    /// Entries rejected by phone-number validation
    pub invalid: Vec<String>,
    /// Valid entries dropped because an earlier row had the same number
    pub duplicates: Vec<String>,
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Contact group not found: {0}")]
    GroupNotFound(Uuid),

    #[error("Audience resolved to zero recipients")]
    EmptyAudience,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Resolves audience specifications against the contact directory
#[derive(Clone)]
pub struct RecipientResolver {
    contacts: ContactRepository,
}

impl RecipientResolver {
    /// Create a new resolver over the contact directory
    pub fn new(contacts: ContactRepository) -> Self {
        Self { contacts }
    }

    /// Resolve a specification into a recipient set.
    ///
    /// An audience with zero accepted recipients is an error even when
    /// the input was non-empty, because such a campaign could never
    /// leave `pending`.
    pub async fn resolve(&self, spec: &AudienceSpec) -> Result<ResolvedAudience, ResolveError> {
        let resolved = match spec {
            AudienceSpec::Single {
                mobile_number,
                variables,
            } => resolve_rows(std::iter::once((mobile_number.as_str(), variables.clone()))),
            AudienceSpec::Uploaded { rows } => resolve_rows(
                rows.iter()
                    .map(|row| (row.mobile_number.as_str(), row.variables.clone())),
            ),
            AudienceSpec::Group { group_id } => {
                if !self.contacts.group_exists(*group_id).await? {
                    return Err(ResolveError::GroupNotFound(*group_id));
                }
                let members = self.contacts.group_members(*group_id).await?;
                resolve_rows(members.iter().map(|contact| {
                    (
                        contact.mobile_number.as_str(),
                        contact_variables(&contact.dynamic_variables),
                    )
                }))
            }
        };

        finish(resolved)
    }
}

/// Reject an audience with zero accepted recipients; such a campaign
/// could never leave `pending`.
fn finish(resolved: ResolvedAudience) -> Result<ResolvedAudience, ResolveError> {
    if resolved.recipients.is_empty() {
        return Err(ResolveError::EmptyAudience);
    }

    debug!(
        accepted = resolved.recipients.len(),
        invalid = resolved.invalid.len(),
        duplicates = resolved.duplicates.len(),
        "Audience resolved"
    );
    Ok(resolved)
}

/// Normalize, validate, and deduplicate rows. The first occurrence of a
/// number wins; later ones land in `duplicates`.
fn resolve_rows<'a>(rows: impl Iterator<Item = (&'a str, Vec<String>)>) -> ResolvedAudience {
    let mut resolved = ResolvedAudience::default();
    let mut seen: HashSet<String> = HashSet::new();

    for (raw, variables) in rows {
        let Some(number) = PhoneNumber::parse(raw) else {
            resolved.invalid.push(raw.to_string());
            continue;
        };

        if !seen.insert(number.as_str().to_string()) {
            resolved.duplicates.push(number.as_str().to_string());
            continue;
        }

        resolved.recipients.push(NewRecipient {
            mobile_number: number.as_str().to_string(),
            dynamic_variables: variables,
        });
    }

    resolved
}

fn contact_variables(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rows(input: &[(&str, &[&str])]) -> ResolvedAudience {
        resolve_rows(input.iter().map(|(number, vars)| {
            (*number, vars.iter().map(|v| v.to_string()).collect())
        }))
    }

    #[test]
    fn test_resolve_normalizes_numbers() {
        let resolved = rows(&[("+1 (555) 010-2345", &["Alice"])]);

        assert_eq!(resolved.recipients.len(), 1);
        assert_eq!(resolved.recipients[0].mobile_number, "+15550102345");
        assert_eq!(resolved.recipients[0].dynamic_variables, vec!["Alice"]);
        assert!(resolved.invalid.is_empty());
    }

    #[test]
    fn test_resolve_collects_invalid_entries() {
        let resolved = rows(&[
            ("+15550102345", &[]),
            ("not a number", &[]),
            ("12", &[]),
        ]);

        assert_eq!(resolved.recipients.len(), 1);
        assert_eq!(resolved.invalid, vec!["not a number", "12"]);
    }

    #[test]
    fn test_resolve_dedup_first_wins() {
        let resolved = rows(&[
            ("+15550102345", &["first"]),
            ("+1 555-010-2345", &["second"]),
            ("+15550109999", &[]),
        ]);

        assert_eq!(resolved.recipients.len(), 2);
        assert_eq!(resolved.recipients[0].dynamic_variables, vec!["first"]);
        assert_eq!(resolved.duplicates, vec!["+15550102345"]);
    }

    #[test]
    fn test_finish_rejects_zero_accepted_recipients() {
        // All rows fail validation, so nothing is left to send to
        let resolved = rows(&[("not a number", &[]), ("12", &[])]);
        assert_eq!(resolved.invalid.len(), 2);

        let result = finish(resolved);
        assert!(matches!(result, Err(ResolveError::EmptyAudience)));

        let result = finish(rows(&[]));
        assert!(matches!(result, Err(ResolveError::EmptyAudience)));
    }

    #[test]
    fn test_finish_keeps_accepted_recipients() {
        let resolved = finish(rows(&[("+15550102345", &[]), ("oops", &[])])).unwrap();
        assert_eq!(resolved.recipients.len(), 1);
        assert_eq!(resolved.invalid, vec!["oops"]);
    }

    #[test]
    fn test_contact_variables_coercion() {
        let value = serde_json::json!(["Bob", 7, null]);
        assert_eq!(contact_variables(&value), vec!["Bob", "7", ""]);
        assert!(contact_variables(&serde_json::json!({"a": 1})).is_empty());
    }
}
