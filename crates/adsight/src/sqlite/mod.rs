use std::path::Path;

use anyhow::{Context, Error, Result, bail};
use rusqlite::types::{ToSql, Value as SqlValue};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;

use crate::guardrail::AcceptedQuery;
use crate::models::{CellValue, Row};

pub const DEFAULT_ROW_CAP: usize = 1_000;

/// A named `:parameter` value bound when the accepted query runs.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParam {
    pub name: String,
    pub value: SqlValue,
}

impl QueryParam {
    pub fn new(name: impl Into<String>, value: SqlValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Parses `name=value`. Integers and reals bind as numbers, `null` as
    /// NULL, anything else as text.
    pub fn parse(raw: &str) -> Result<Self> {
        let Some((name, value)) = raw.split_once('=') else {
            bail!("query parameter must look like name=value: {raw}");
        };
        let name = name.trim().trim_start_matches(':');
        if name.is_empty()
            || !name
                .chars()
                .all(|character| character.is_ascii_alphanumeric() || character == '_')
        {
            bail!("query parameter name must be a plain identifier: {raw}");
        }

        Ok(Self::new(name, sql_value_from_text(value.trim())))
    }
}

fn sql_value_from_text(raw: &str) -> SqlValue {
    if raw.eq_ignore_ascii_case("null") {
        SqlValue::Null
    } else if let Ok(integer) = raw.parse::<i64>() {
        SqlValue::Integer(integer)
    } else if let Some(real) = raw.parse::<f64>().ok().filter(|real| real.is_finite()) {
        SqlValue::Real(real)
    } else {
        SqlValue::Text(raw.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub truncated: bool,
}

impl QueryRows {
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

pub fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        bail!("sqlite database does not exist: {}", path.display());
    }
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open sqlite database: {}", path.display()))
}

/// Opens `path` read-only and runs an already accepted query against it.
pub fn execute_read_only(
    path: &Path,
    query: &AcceptedQuery,
    params: &[QueryParam],
    row_cap: usize,
) -> Result<QueryRows> {
    let connection = open_read_only(path)?;
    execute_on_connection(&connection, query, params, row_cap)
}

pub fn execute_on_connection(
    connection: &Connection,
    query: &AcceptedQuery,
    params: &[QueryParam],
    row_cap: usize,
) -> Result<QueryRows> {
    let mut statement = connection
        .prepare(&query.sql)
        .map_err(|error| Error::new(error).context("failed to prepare query"))?;
    let columns = statement
        .column_names()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    let placeholders = (1..=statement.parameter_count())
        .map(|index| {
            statement
                .parameter_name(index)
                .map(|name| name.to_string())
                .with_context(|| format!("query uses a positional parameter at index {index}"))
        })
        .collect::<Result<Vec<_>>>()?;
    let bindings = bind_named_params(&placeholders, params)?;
    let named = bindings
        .iter()
        .map(|(placeholder, value)| (placeholder.as_str(), *value as &dyn ToSql))
        .collect::<Vec<_>>();

    let mut rows = statement
        .query(named.as_slice())
        .map_err(|error| Error::new(error).context("failed to execute query"))?;
    let mut result_rows = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows
        .next()
        .map_err(|error| Error::new(error).context("failed to fetch query row"))?
    {
        if result_rows.len() >= row_cap {
            truncated = true;
            break;
        }

        let mut record = Row::new();
        for (index, column) in columns.iter().enumerate() {
            let value = row
                .get::<usize, SqlValue>(index)
                .map_err(|error| Error::new(error).context("failed to decode query column"))?;
            record = record.with_column(column.clone(), cell_value_from_sql(value));
        }
        result_rows.push(record);
    }

    Ok(QueryRows {
        columns,
        rows: result_rows,
        truncated,
    })
}

/// Pairs every placeholder in the statement with a supplied value. Missing and
/// unused parameters are both errors.
fn bind_named_params<'a>(
    placeholders: &[String],
    params: &'a [QueryParam],
) -> Result<Vec<(String, &'a SqlValue)>> {
    let mut bindings = Vec::with_capacity(placeholders.len());
    for placeholder in placeholders {
        let bare = placeholder.trim_start_matches([':', '@', '$']);
        let Some(param) = params.iter().find(|param| param.name == bare) else {
            bail!("missing value for query parameter {placeholder}");
        };
        bindings.push((placeholder.clone(), &param.value));
    }

    if let Some(unused) = params.iter().find(|param| {
        !placeholders
            .iter()
            .any(|placeholder| placeholder.trim_start_matches([':', '@', '$']) == param.name)
    }) {
        bail!("query does not use parameter :{}", unused.name);
    }

    Ok(bindings)
}

fn cell_value_from_sql(value: SqlValue) -> CellValue {
    match value {
        SqlValue::Null => CellValue::Null,
        SqlValue::Integer(value) => CellValue::Number(value as f64),
        SqlValue::Real(value) => CellValue::Number(value),
        SqlValue::Text(value) => CellValue::Text(value),
        SqlValue::Blob(value) => CellValue::Text(encode_blob_hex(&value)),
    }
}

fn encode_blob_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push(HEX[(byte >> 4) as usize] as char);
        output.push(HEX[(byte & 0x0f) as usize] as char);
    }
    output
}
