//! By-name row mapping used by the `*_scan` helpers.
//!
//! Each row becomes a JSON object keyed by column name, which is then
//! deserialized into the target type. Field names therefore follow serde's
//! rules: rename with `#[serde(rename = "...")]`, make nullable columns
//! `Option<_>`, and columns without a matching field are ignored unless the
//! type opts into `deny_unknown_fields`.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

use crate::error::SqlEssentialsError;
use crate::types::RowValues;

/// Map one row into `T` by column name.
///
/// # Errors
/// Returns `ColumnMismatch` when the row and column list differ in length and
/// `MappingError` when deserialization fails.
pub fn map_row<T: DeserializeOwned>(
    columns: &[String],
    row: &[RowValues],
) -> Result<T, SqlEssentialsError> {
    if columns.len() != row.len() {
        return Err(SqlEssentialsError::ColumnMismatch {
            expected: columns.len(),
            actual: row.len(),
        });
    }
    let object: Map<String, JsonValue> = columns
        .iter()
        .zip(row)
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect();
    serde_json::from_value(JsonValue::Object(object))
        .map_err(|e| SqlEssentialsError::MappingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i64,
        #[serde(rename = "user_name")]
        name: String,
        email: Option<String>,
    }

    #[test]
    fn maps_columns_by_name() {
        let columns = vec!["user_name".to_string(), "id".to_string(), "email".to_string(), "extra".to_string()];
        let row = vec![
            RowValues::Text("alice".into()),
            RowValues::Int(3),
            RowValues::Null,
            RowValues::Float(0.5),
        ];
        let user: User = map_row(&columns, &row).unwrap();
        assert_eq!(
            user,
            User {
                id: 3,
                name: "alice".into(),
                email: None
            }
        );
    }

    #[test]
    fn missing_field_is_a_mapping_error() {
        let columns = vec!["id".to_string()];
        let err = map_row::<User>(&columns, &[RowValues::Int(1)]).unwrap_err();
        assert!(matches!(err, SqlEssentialsError::MappingError(_)));
    }
}
