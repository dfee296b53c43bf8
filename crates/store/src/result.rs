use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column definition in a tabular result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Backend type name (`long`, `keyword`, `double`, `date`, ...).
    #[serde(rename = "type")]
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self { name: name.into(), data_type: data_type.into() }
    }
}

/// Tabular result returned by every [`EventStore`](crate::EventStore).
///
/// Each row has one value per column, in `columns` order. SQL NULL is
/// `Value::Null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Zero-based index of a column by name (case-sensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Value at the given row and column name. `None` when either is out of range.
    pub fn get_value(&self, row: usize, col: &str) -> Option<&Value> {
        let col_idx = self.column_index(col)?;
        self.rows.get(row)?.get(col_idx)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return write!(f, "(empty result set)");
        }

        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.name.len()).collect();
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.chars().count());
                }
            }
        }

        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{:<width$}", col.name, width = widths[i])?;
        }
        writeln!(f)?;

        for (i, w) in widths.iter().enumerate() {
            if i > 0 {
                write!(f, "-+-")?;
            }
            write!(f, "{}", "-".repeat(*w))?;
        }
        writeln!(f)?;

        for row in &cells {
            for (i, cell) in row.iter().enumerate().take(widths.len()) {
                if i > 0 {
                    write!(f, " | ")?;
                }
                write!(f, "{:<width$}", cell, width = widths[i])?;
            }
            writeln!(f)?;
        }

        write!(f, "({} rows)", self.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> QueryResult {
        QueryResult::new(
            vec![Column::new("error_count", "long"), Column::new("service_name", "keyword")],
            vec![
                vec![json!(42), json!("payment-service")],
                vec![json!(11), Value::Null],
            ],
        )
    }

    #[test]
    fn lookup_by_column_name() {
        let r = sample();
        assert_eq!(r.row_count(), 2);
        assert_eq!(r.column_count(), 2);
        assert_eq!(r.column_index("service_name"), Some(1));
        assert_eq!(r.get_value(0, "service_name"), Some(&json!("payment-service")));
        assert_eq!(r.get_value(1, "service_name"), Some(&Value::Null));
        assert_eq!(r.get_value(5, "service_name"), None);
        assert_eq!(r.get_value(0, "nope"), None);
        assert_eq!(r.column_names(), vec!["error_count", "service_name"]);
    }

    #[test]
    fn display_renders_table() {
        let out = sample().to_string();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "error_count | service_name   ");
        assert!(lines[1].starts_with("------------+-"));
        assert!(lines[2].contains("payment-service"));
        assert!(lines[3].contains("NULL"));
        assert_eq!(lines[4], "(2 rows)");
    }

    #[test]
    fn empty_result_display() {
        assert_eq!(QueryResult::default().to_string(), "(empty result set)");
    }

    #[test]
    fn serializes_column_type_key() {
        let v = serde_json::to_value(Column::new("score", "double")).unwrap();
        assert_eq!(v, json!({ "name": "score", "type": "double" }));
    }
}
