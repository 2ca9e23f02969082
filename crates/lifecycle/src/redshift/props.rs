//! Typed table properties.
use snafu::prelude::*;

use crate::{naming, Result, ValidationSnafu};

/// `ResourceProperties` of a table event.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableProperties {
    pub cluster_name: String,
    pub database_name: String,
    /// Secret holding the credentials the Data API connects with.
    pub admin_user_arn: String,
    pub table_name: TableName,
    #[serde(default)]
    pub table_columns: Vec<Column>,
    #[serde(default)]
    pub dist_style: Option<DistStyle>,
    #[serde(default)]
    pub sort_style: SortStyle,
    #[serde(default)]
    pub table_comment: Option<String>,
    /// Match columns across updates by id rather than by name, which turns a
    /// name change into a rename.
    #[serde(default, deserialize_with = "crate::props::bool")]
    pub use_column_ids: bool,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableName {
    pub prefix: String,
    #[serde(default, deserialize_with = "crate::props::bool")]
    pub generate_suffix: bool,
}

impl TableName {
    /// The table name in the database, for a table of the stack `stack_id`.
    pub fn resolve(&self, stack_id: &str) -> String {
        if self.generate_suffix {
            naming::physical_name(
                &self.prefix,
                "",
                &naming::stack_suffix(stack_id),
                naming::MAX_TABLE_NAME_LEN,
            )
        } else {
            self.prefix.clone()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Stable identity of the column, used when `useColumnIds` is set.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub data_type: String,
    #[serde(default, deserialize_with = "crate::props::bool")]
    pub dist_key: bool,
    #[serde(default, deserialize_with = "crate::props::bool")]
    pub sort_key: bool,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Column {
    /// Whether `other` is the same column, possibly renamed.
    pub fn is_same(&self, other: &Column, use_column_ids: bool) -> bool {
        match (use_column_ids, self.id.as_ref()) {
            (true, Some(id)) => Some(id) == other.id.as_ref(),
            _ => self.name == other.name,
        }
    }
}

/// The single dist key column, if any.
///
/// ## Errors
/// Errs if more than one column is a dist key.
pub fn dist_key_column(columns: &[Column]) -> Result<Option<&Column>> {
    let mut keys = columns.iter().filter(|column| column.dist_key);
    let key = keys.next();
    ensure!(
        keys.next().is_none(),
        ValidationSnafu {
            msg: "Multiple dist key columns found"
        }
    );
    Ok(key)
}

pub fn sort_key_columns(columns: &[Column]) -> Vec<&Column> {
    columns.iter().filter(|column| column.sort_key).collect()
}

/// Whether two column lists hold the same columns, by name and data type.
pub fn columns_equal(a: &[&Column], b: &[&Column]) -> bool {
    a.len() == b.len()
        && a.iter().all(|x| {
            b.iter()
                .any(|y| x.name == y.name && x.data_type == y.data_type)
        })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DistStyle {
    Auto,
    Even,
    Key,
    All,
}

impl core::fmt::Display for DistStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DistStyle::Auto => "AUTO",
            DistStyle::Even => "EVEN",
            DistStyle::Key => "KEY",
            DistStyle::All => "ALL",
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortStyle {
    #[default]
    Auto,
    Compound,
    Interleaved,
}

impl core::fmt::Display for SortStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SortStyle::Auto => "AUTO",
            SortStyle::Compound => "COMPOUND",
            SortStyle::Interleaved => "INTERLEAVED",
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const STACK_ID: &str =
        "arn:aws:cloudformation:us-east-1:123456789012:stack/s/3a4b5c6d-0000-1111-2222-0123456789ab";

    #[test]
    fn decodes_string_flags() {
        let props: TableProperties = serde_json::from_value(serde_json::json!({
            "clusterName": "cluster",
            "databaseName": "db",
            "adminUserArn": "arn:aws:secretsmanager:us-east-1:1:secret:admin",
            "tableName": { "prefix": "events", "generateSuffix": "true" },
            "tableColumns": [
                { "name": "id", "dataType": "int", "distKey": "true", "sortKey": "false" },
                { "name": "at", "dataType": "timestamp", "sortKey": true, "encoding": "AZ64" }
            ],
            "distStyle": "KEY",
            "sortStyle": "COMPOUND",
            "useColumnIds": "false"
        }))
        .unwrap();
        assert!(props.table_name.generate_suffix);
        assert_eq!(Some(DistStyle::Key), props.dist_style);
        assert_eq!(SortStyle::Compound, props.sort_style);
        assert!(props.table_columns[0].dist_key);
        assert!(props.table_columns[1].sort_key);
        assert!(!props.use_column_ids);
    }

    #[test]
    fn table_name_suffix() {
        let name = TableName {
            prefix: "events".to_owned(),
            generate_suffix: true,
        };
        assert_eq!("events0123456789ab", name.resolve(STACK_ID));
        let name = TableName {
            generate_suffix: false,
            ..name
        };
        assert_eq!("events", name.resolve(STACK_ID));
    }

    #[test]
    fn long_prefix_keeps_the_suffix() {
        let name = TableName {
            prefix: "t".repeat(200),
            generate_suffix: true,
        };
        let resolved = name.resolve(STACK_ID);
        assert_eq!(naming::MAX_TABLE_NAME_LEN, resolved.len());
        assert!(resolved.ends_with("0123456789ab"));
    }

    fn column(name: &str, dist_key: bool) -> Column {
        Column {
            name: name.to_owned(),
            data_type: "int".to_owned(),
            dist_key,
            ..Default::default()
        }
    }

    #[test]
    fn at_most_one_dist_key() {
        let columns = vec![column("a", true), column("b", false)];
        assert_eq!("a", dist_key_column(&columns).unwrap().unwrap().name);
        let columns = vec![column("a", true), column("b", true)];
        let err = dist_key_column(&columns).unwrap_err();
        assert_eq!("Multiple dist key columns found", err.to_string());
    }

    #[test]
    fn column_equality_ignores_order() {
        let (a, b) = (column("a", false), column("b", false));
        assert!(columns_equal(&[&a, &b], &[&b, &a]));
        assert!(!columns_equal(&[&a], &[&a, &b]));
    }
}
