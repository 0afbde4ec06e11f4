use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::{CardHolder, FieldValue, HolderField, HolderFields};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: HolderField,
    pub old: FieldValue,
    pub new: FieldValue,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {}",
            self.field,
            shown(&self.old),
            shown(&self.new)
        )
    }
}

fn shown(value: &FieldValue) -> String {
    if value.is_empty() {
        "(empty)".to_string()
    } else {
        value.to_string()
    }
}

/// Changed fields only, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldDiff(Vec<FieldChange>);

impl FieldDiff {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.0.iter()
    }

    pub fn fields(&self) -> Vec<HolderField> {
        self.0.iter().map(|change| change.field).collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

/// Compare card fields with the holder's current values. A missing holder
/// compares as all-empty.
pub fn compute_diff<H: CardHolder>(holder: Option<&H>, fields: &HolderFields) -> FieldDiff {
    let changes = fields
        .iter()
        .filter_map(|(field, new)| {
            let old = holder
                .map(|holder| holder.field(field))
                .unwrap_or(FieldValue::Empty);
            (old != *new).then(|| FieldChange {
                field,
                old,
                new: new.clone(),
            })
        })
        .collect();
    FieldDiff(changes)
}
