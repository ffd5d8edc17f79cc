//! Hive-style partition paths.
//!
//! Output tables are laid out as `col=value/` directories. Values are
//! percent-escaped the way Hive and Spark escape them, and a null value is
//! written as [`HIVE_DEFAULT_PARTITION`]. An empty string keeps its own
//! `col=` directory so it reads back as an empty string, not as null.

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Int16Type, Int32Type, Int64Type};
use std::collections::HashMap;
use std::fmt;

/// Directory name used for a null partition value.
pub const HIVE_DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// A single partition column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartitionValue {
    Null,
    Int(i64),
    Str(String),
}

impl PartitionValue {
    /// Read the partition value at `row` of `array`.
    ///
    /// Returns `None` for array types that cannot be used as partition
    /// columns.
    pub fn from_array(array: &ArrayRef, row: usize) -> Option<Self> {
        if array.is_null(row) {
            return Some(PartitionValue::Null);
        }
        let value = match array.data_type() {
            DataType::Int16 => PartitionValue::Int(array.as_primitive::<Int16Type>().value(row).into()),
            DataType::Int32 => PartitionValue::Int(array.as_primitive::<Int32Type>().value(row).into()),
            DataType::Int64 => PartitionValue::Int(array.as_primitive::<Int64Type>().value(row)),
            DataType::Utf8 => PartitionValue::Str(array.as_string::<i32>().value(row).to_string()),
            DataType::LargeUtf8 => {
                PartitionValue::Str(array.as_string::<i64>().value(row).to_string())
            }
            _ => return None,
        };
        Some(value)
    }

    /// The escaped directory value for this partition value.
    pub fn to_path_segment(&self) -> String {
        match self {
            PartitionValue::Null => HIVE_DEFAULT_PARTITION.to_string(),
            PartitionValue::Int(v) => v.to_string(),
            PartitionValue::Str(s) => escape_path_name(s),
        }
    }
}

impl fmt::Display for PartitionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionValue::Null => f.write_str("null"),
            PartitionValue::Int(v) => write!(f, "{v}"),
            PartitionValue::Str(s) => f.write_str(s),
        }
    }
}

fn needs_escaping(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '{' | '[' | ']' | '^'
        )
}

/// Percent-escape characters that are unsafe in a partition directory name.
pub fn escape_path_name(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if needs_escaping(c) {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                escaped.push_str(&format!("%{byte:02X}"));
            }
        } else {
            escaped.push(c);
        }
    }
    escaped
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// Reverse [`escape_path_name`]. Malformed escapes are kept verbatim.
pub fn unescape_path_name(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2]));
            if let (Some(hi), Some(lo)) = hex {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Build the relative directory for a set of partition values.
///
/// ```
/// use starling_core::{PartitionValue, partition_path};
///
/// let path = partition_path(&[
///     ("year", PartitionValue::Int(2018)),
///     ("month", PartitionValue::Int(11)),
/// ]);
/// assert_eq!(path, "year=2018/month=11");
/// ```
pub fn partition_path(values: &[(&str, PartitionValue)]) -> String {
    values
        .iter()
        .map(|(column, value)| format!("{}={}", escape_path_name(column), value.to_path_segment()))
        .collect::<Vec<_>>()
        .join("/")
}

/// Extracts partition values from file paths below a table root.
///
/// Only directory segments are considered; the file name never contributes
/// a value. Null partitions come back as `None`.
#[derive(Debug, Clone)]
pub struct PartitionExtractor {
    columns: Vec<String>,
}

impl PartitionExtractor {
    /// Create an extractor for the given partition columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    /// The partition columns, in layout order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Extract the configured partition values from a relative file path.
    ///
    /// Columns whose directory is absent are missing from the returned map.
    pub fn extract(&self, path: &str) -> HashMap<String, Option<String>> {
        let mut segments: Vec<&str> = path.split('/').collect();
        segments.pop();

        segments
            .into_iter()
            .filter_map(|segment| segment.split_once('='))
            .map(|(key, value)| (unescape_path_name(key), value))
            .filter(|(key, _)| self.columns.contains(key))
            .map(|(key, value)| {
                let value = (value != HIVE_DEFAULT_PARTITION).then(|| unescape_path_name(value));
                (key, value)
            })
            .collect()
    }
}
