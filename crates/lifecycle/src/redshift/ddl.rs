//! SQL for creating, altering and dropping tables.
//!
//! Planning is pure: it turns properties into statements and never talks to
//! the database.
use super::props::{
    columns_equal, dist_key_column, sort_key_columns, Column, SortStyle, TableProperties,
};
use crate::Result;

/// How an update is applied to an existing table.
#[derive(Clone, Debug, PartialEq)]
pub enum TablePlan {
    /// The change cannot be made in place, a new table must be created.
    Replace,
    /// Statements that alter the table in place, in order. Empty when there
    /// is nothing to do.
    Alter(Vec<String>),
}

pub(crate) fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn quote_or_null(text: Option<&String>) -> String {
    text.map(|text| quote(text))
        .unwrap_or_else(|| "NULL".to_owned())
}

fn column_names(columns: &[&Column]) -> String {
    columns
        .iter()
        .map(|column| column.name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Statements creating `table` as described by `props`.
///
/// ## Errors
/// Errs if more than one column is a dist key.
pub fn create_statements(table: &str, props: &TableProperties) -> Result<Vec<String>> {
    let columns = props
        .table_columns
        .iter()
        .map(|column| {
            let mut definition = format!("{} {}", column.name, column.data_type);
            if let Some(encoding) = column.encoding.as_ref() {
                definition.push_str(&format!(" ENCODE {encoding}"));
            }
            definition
        })
        .collect::<Vec<_>>()
        .join(",");
    let mut create = format!("CREATE TABLE {table} ({columns})");
    if let Some(style) = props.dist_style {
        create.push_str(&format!(" DISTSTYLE {style}"));
    }
    if let Some(key) = dist_key_column(&props.table_columns)? {
        create.push_str(&format!(" DISTKEY({})", key.name));
    }
    let sort_keys = sort_key_columns(&props.table_columns);
    if !sort_keys.is_empty() {
        create.push_str(&format!(
            " {} SORTKEY({})",
            props.sort_style,
            column_names(&sort_keys)
        ));
    }

    let mut statements = vec![create];
    for column in props.table_columns.iter() {
        if let Some(comment) = column.comment.as_ref() {
            statements.push(format!(
                "COMMENT ON COLUMN {table}.{} IS {}",
                column.name,
                quote(comment)
            ));
        }
    }
    if let Some(comment) = props.table_comment.as_ref() {
        statements.push(format!("COMMENT ON TABLE {table} IS {}", quote(comment)));
    }
    Ok(statements)
}

/// Plans the update of `table` from `old` to `new`.
///
/// `rename_to` is the name the table should end up with, if it differs from
/// `table`.
///
/// ## Errors
/// Errs if either configuration has more than one dist key column.
pub fn plan_update(
    table: &str,
    rename_to: Option<&str>,
    old: &TableProperties,
    new: &TableProperties,
) -> Result<TablePlan> {
    if old.cluster_name != new.cluster_name || old.database_name != new.database_name {
        return Ok(TablePlan::Replace);
    }
    let use_ids = new.use_column_ids;
    let old_columns = &old.table_columns;
    let new_columns = &new.table_columns;
    let mut statements = vec![];

    for dropped in old_columns
        .iter()
        .filter(|old| !new_columns.iter().any(|new| old.is_same(new, use_ids)))
    {
        statements.push(format!("ALTER TABLE {table} DROP COLUMN {}", dropped.name));
    }
    for added in new_columns
        .iter()
        .filter(|new| !old_columns.iter().any(|old| old.is_same(new, use_ids)))
    {
        statements.push(format!(
            "ALTER TABLE {table} ADD {} {}",
            added.name, added.data_type
        ));
    }

    let encodings = new_columns
        .iter()
        .filter(|new| {
            old_columns
                .iter()
                .any(|old| old.name == new.name && old.encoding != new.encoding)
        })
        .map(|column| {
            format!(
                "ALTER COLUMN {} ENCODE {}",
                column.name,
                column.encoding.as_deref().unwrap_or("AUTO")
            )
        })
        .collect::<Vec<_>>();
    if !encodings.is_empty() {
        statements.push(format!("ALTER TABLE {table} {}", encodings.join(", ")));
    }

    for column in new_columns.iter().filter(|new| {
        old_columns
            .iter()
            .any(|old| old.name == new.name && old.comment != new.comment)
    }) {
        statements.push(format!(
            "COMMENT ON COLUMN {table}.{} IS {}",
            column.name,
            quote_or_null(column.comment.as_ref())
        ));
    }

    if use_ids {
        for column in new_columns.iter() {
            let renamed_from = old_columns.iter().find(|old| {
                old.id.is_some() && old.id == column.id && old.name != column.name
            });
            if let Some(old) = renamed_from {
                statements.push(format!(
                    "ALTER TABLE {table} RENAME COLUMN {} TO {}",
                    old.name, column.name
                ));
            }
        }
    }

    match (old.dist_style, new.dist_style) {
        (None, Some(_)) | (Some(_), None) => return Ok(TablePlan::Replace),
        (Some(old_style), Some(new_style)) if old_style != new_style => {
            statements.push(format!("ALTER TABLE {table} ALTER DISTSTYLE {new_style}"));
        }
        _ => {}
    }

    let old_key = dist_key_column(old_columns)?.map(|column| column.name.as_str());
    let new_key = dist_key_column(new_columns)?.map(|column| column.name.as_str());
    match (old_key, new_key) {
        (None, Some(key)) => {
            statements.push(format!(
                "ALTER TABLE {table} ALTER DISTSTYLE KEY DISTKEY {key}"
            ));
        }
        (Some(_), None) => {
            statements.push(format!("ALTER TABLE {table} ALTER DISTSTYLE AUTO"));
        }
        (Some(old_key), Some(key)) if old_key != key => {
            statements.push(format!("ALTER TABLE {table} ALTER DISTKEY {key}"));
        }
        _ => {}
    }

    let old_sort_keys = sort_key_columns(old_columns);
    let new_sort_keys = sort_key_columns(new_columns);
    if old.sort_style != new.sort_style || !columns_equal(&old_sort_keys, &new_sort_keys) {
        match new.sort_style {
            // interleaved sort keys cannot be altered
            SortStyle::Interleaved => return Ok(TablePlan::Replace),
            SortStyle::Compound => statements.push(format!(
                "ALTER TABLE {table} ALTER COMPOUND SORTKEY({})",
                column_names(&new_sort_keys)
            )),
            SortStyle::Auto => {
                statements.push(format!("ALTER TABLE {table} ALTER SORTKEY AUTO"));
            }
        }
    }

    if old.table_comment != new.table_comment {
        statements.push(format!(
            "COMMENT ON TABLE {table} IS {}",
            quote_or_null(new.table_comment.as_ref())
        ));
    }

    if let Some(new_name) = rename_to.filter(|new_name| *new_name != table) {
        statements.push(format!("ALTER TABLE {table} RENAME TO {new_name}"));
    }

    Ok(TablePlan::Alter(statements))
}
