//! Field resolution: open-vocabulary entities → fixed record fields.
//!
//! The recognition model labels entities in its own words ("Name of Patta
//! Holder", "GPS", "Village/Gram"), so the labels cannot be matched exactly.
//! Instead each target field owns a small set of lowercase keywords and an
//! entity feeds a field when its lowercased label contains any of them.
//!
//! This is a **best-effort heuristic**. A label that happens to contain
//! another field's keyword ("Status of name change") can be assigned to the
//! wrong field; there is no confidence score and no second opinion. The
//! structuring stage downstream gets a chance to correct obvious mistakes.
//!
//! ## Matching rules
//!
//! 1. Fields are evaluated in table order.
//! 2. For each field, the **first** entity in sequence order whose label
//!    contains any keyword wins. Later matches are discarded.
//! 3. An entity selected for one field is not offered to later fields.
//! 4. A field with no match is left absent.
//!
//! The default table puts `pattaHolderName` last because its `"name"`
//! keyword would otherwise swallow labels such as "village name".

use crate::schema::{Entity, FieldResolutionInput};
use tracing::debug;

/// Fields of [`FieldResolutionInput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetField {
    PattaHolderName,
    VillageName,
    Coordinates,
    ClaimStatus,
    OtherInformation,
}

impl TargetField {
    pub fn key(&self) -> &'static str {
        match self {
            TargetField::PattaHolderName => "pattaHolderName",
            TargetField::VillageName => "villageName",
            TargetField::Coordinates => "coordinates",
            TargetField::ClaimStatus => "claimStatus",
            TargetField::OtherInformation => "otherInformation",
        }
    }

    fn slot<'a>(&self, input: &'a mut FieldResolutionInput) -> &'a mut Option<String> {
        match self {
            TargetField::PattaHolderName => &mut input.patta_holder_name,
            TargetField::VillageName => &mut input.village_name,
            TargetField::Coordinates => &mut input.coordinates,
            TargetField::ClaimStatus => &mut input.claim_status,
            TargetField::OtherInformation => &mut input.other_information,
        }
    }
}

/// One row of the keyword table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordEntry {
    pub field: TargetField,
    /// Lowercase substrings; any one of them selects the entity.
    pub keywords: Vec<String>,
}

/// Ordered `{field, keywords}` table driving [`resolve_fields`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTable {
    entries: Vec<KeywordEntry>,
}

impl KeywordTable {
    /// Build a table from `(field, keywords)` rows, evaluated in the given order.
    ///
    /// Keywords are lowercased; empty keywords are dropped since they would
    /// match every label.
    pub fn new<I, K, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = (TargetField, K)>,
        K: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = rows
            .into_iter()
            .map(|(field, keywords)| KeywordEntry {
                field,
                keywords: keywords
                    .into_iter()
                    .map(|k| k.as_ref().trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[KeywordEntry] {
        &self.entries
    }

    /// Keywords registered for `field`, if it has a row.
    pub fn keywords_for(&self, field: TargetField) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.keywords.as_slice())
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        KeywordTable::new([
            (TargetField::Coordinates, vec!["coordinates", "gps"]),
            (TargetField::ClaimStatus, vec!["claim status", "status"]),
            (TargetField::VillageName, vec!["village"]),
            (TargetField::OtherInformation, vec!["other"]),
            (TargetField::PattaHolderName, vec!["patta holder", "name"]),
        ])
    }
}

/// Map entities onto the fixed fields using the default keyword table.
pub fn resolve(entities: &[Entity]) -> FieldResolutionInput {
    resolve_fields(entities, &KeywordTable::default())
}

/// Map entities onto the fixed fields using `table`.
///
/// Pure and deterministic: the same entities and table always give the
/// same result.
pub fn resolve_fields(entities: &[Entity], table: &KeywordTable) -> FieldResolutionInput {
    let labels: Vec<String> = entities.iter().map(|e| e.label.to_lowercase()).collect();
    let mut taken = vec![false; entities.len()];
    let mut out = FieldResolutionInput::default();

    for entry in table.entries() {
        let hit = labels.iter().enumerate().find(|(i, label)| {
            !taken[*i] && entry.keywords.iter().any(|k| label.contains(k.as_str()))
        });

        if let Some((i, _)) = hit {
            taken[i] = true;
            debug!(
                "Resolved {} from entity '{}'",
                entry.field.key(),
                entities[i].label
            );
            *entry.field.slot(&mut out) = Some(entities[i].value.clone());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(label: &str, value: &str) -> Entity {
        Entity::new(label, value)
    }

    #[test]
    fn village_and_holder_scenario() {
        let entities = [
            e("village name", "Rampur"),
            e("patta holder name", "Ram Singh"),
        ];
        let out = resolve(&entities);
        assert_eq!(
            out,
            FieldResolutionInput {
                patta_holder_name: Some("Ram Singh".into()),
                village_name: Some("Rampur".into()),
                ..Default::default()
            }
        );
    }

    #[test]
    fn empty_entities_leave_every_field_absent() {
        let out = resolve(&[]);
        assert!(out.is_empty());
        assert_eq!(serde_json::to_string(&out).unwrap(), "{}");
    }

    #[test]
    fn first_match_in_sequence_wins() {
        let entities = [e("Status", "Pending"), e("Claim Status", "Approved")];
        assert_eq!(resolve(&entities).claim_status.as_deref(), Some("Pending"));

        let entities = [e("Claim Status", "Approved"), e("Status", "Pending")];
        assert_eq!(resolve(&entities).claim_status.as_deref(), Some("Approved"));
    }

    #[test]
    fn ambiguous_label_goes_to_earlier_field() {
        // "status" is evaluated before "name", so the holder field misses it.
        let entities = [
            e("Name of Status Holder", "A"),
            e("Claim Status", "B"),
        ];
        let out = resolve(&entities);
        assert_eq!(out.claim_status.as_deref(), Some("A"));
        assert_eq!(out.patta_holder_name, None);
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        let entities = [
            e("GPS Location", "21.14N, 79.08E"),
            e("OTHER DETAILS", "Forest compartment 12"),
            e("Gram / Village", "Kondapur"),
            e("Beneficiary NAME", "Sita Devi"),
        ];
        let out = resolve(&entities);
        assert_eq!(out.coordinates.as_deref(), Some("21.14N, 79.08E"));
        assert_eq!(out.other_information.as_deref(), Some("Forest compartment 12"));
        assert_eq!(out.village_name.as_deref(), Some("Kondapur"));
        assert_eq!(out.patta_holder_name.as_deref(), Some("Sita Devi"));
        assert_eq!(out.claim_status, None);
    }

    #[test]
    fn unmatched_labels_are_ignored() {
        let entities = [e("Survey Number", "114/2"), e("Area", "2.5 ha")];
        assert!(resolve(&entities).is_empty());
    }

    #[test]
    fn resolution_is_deterministic() {
        let entities = [
            e("Claimant Name", "Ram Singh"),
            e("Village", "Rampur"),
            e("Status", "Approved"),
            e("Coordinates", "21.1, 79.0"),
        ];
        assert_eq!(resolve(&entities), resolve(&entities));
    }

    #[test]
    fn custom_table_order_changes_assignment() {
        let table = KeywordTable::new([
            (TargetField::PattaHolderName, vec!["name"]),
            (TargetField::VillageName, vec!["village"]),
        ]);
        let entities = [e("village name", "Rampur"), e("holder name", "Ram Singh")];
        let out = resolve_fields(&entities, &table);
        assert_eq!(out.patta_holder_name.as_deref(), Some("Rampur"));
        assert_eq!(out.village_name, None);
    }

    #[test]
    fn table_normalises_keywords() {
        let table = KeywordTable::new([(TargetField::Coordinates, vec!["  GPS ", ""])]);
        assert_eq!(
            table.keywords_for(TargetField::Coordinates),
            Some(&["gps".to_string()][..])
        );
        assert_eq!(table.keywords_for(TargetField::VillageName), None);
    }
}
