//! Change detection between fetched and stored records

use crate::record::{Properties, StoredRecord, Tags};
use chrono::Utc;
use serde_json::Value;

/// Value equality with numeric comparison for numbers
///
/// `300` and `300.0` are the same TTL; JSON's structural equality would
/// say otherwise.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, a)| y.get(key).is_some_and(|b| values_equal(a, b)))
        }
        _ => a == b,
    }
}

/// Overwrite changed fields of `stored` with `properties` and `tags`
///
/// Fields that only exist on the stored side are kept. Tags are compared
/// as a whole and only when given. Returns whether anything changed.
pub fn apply_changes(
    stored: &mut StoredRecord,
    properties: &Properties,
    tags: Option<&Tags>,
) -> bool {
    let mut changed = false;

    for (key, value) in properties {
        let differs = stored
            .properties
            .get(key)
            .is_none_or(|current| !values_equal(current, value));
        if differs {
            stored.properties.insert(key.clone(), value.clone());
            changed = true;
        }
    }

    if let Some(tags) = tags {
        if stored.tags != *tags {
            stored.tags = tags.clone();
            changed = true;
        }
    }

    if changed {
        stored.updated_at = Utc::now();
    }
    changed
}

impl StoredRecord {
    /// Apply freshly fetched values; see [`apply_changes`]
    pub fn update(&mut self, properties: &Properties, tags: Option<&Tags>) -> bool {
        apply_changes(self, properties, tags)
    }
}
