//! Heterogeneous column-oriented tables.
//!
//! A [`Table`] holds named columns of [`Value`]s. Each column is expected to
//! hold a single element type (checked by [`Table::validate`]), different
//! columns may hold different types. Rows are either all named or all
//! nameless; the first append decides.
//!
//! Column access is cheap: [`Table::column`] borrows the table's storage.
//! Row access copies: [`Table::row`] returns a snapshot.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "cols": [{"dtype": "int32", "val": [1, 65, 1]}, {"dtype": "string", "val": ["x", "y", "z"]}],
//!   "colNames": ["a", "B"],
//!   "rowNames": null,
//!   "namelessRows": true
//! }
//! ```
//!
//! `dtype` tags every column so numbers decode back to the exact type they
//! were sent as. A column without elements is tagged `empty`.

use crate::{Result, RlinkError};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};

/// A single table cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Isize(isize),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Usize(usize),
    F32(f32),
    F64(f64),
}

/// Rust types that can be stored in a [`Value`].
pub trait SimpleData: Sized {
    /// Canonical dtype name used on the wire.
    const DTYPE: &'static str;

    fn from_value(value: &Value) -> Option<Self>;

    fn into_value(self) -> Value;
}

macro_rules! simple_data {
    ($($ty:ty => $variant:ident, $dtype:literal;)*) => {
        $(
            impl SimpleData for $ty {
                const DTYPE: &'static str = $dtype;

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*

        impl Value {
            /// Canonical dtype name of this value.
            pub fn dtype(&self) -> &'static str {
                match self {
                    $(Value::$variant(_) => $dtype,)*
                }
            }
        }

        impl Serialize for Value {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                match self {
                    $(Value::$variant(v) => v.serialize(serializer),)*
                }
            }
        }

        /// Decode `val` as a homogeneous sequence of the type named by `dtype`.
        fn decode_typed(dtype: &str, val: JsonValue) -> Option<serde_json::Result<Vec<Value>>> {
            match dtype {
                $($dtype => Some(decode_as::<$ty>(val)),)*
                _ => None,
            }
        }
    };
}

simple_data! {
    String => String, "string";
    bool => Bool, "bool";
    i8 => I8, "int8";
    i16 => I16, "int16";
    i32 => I32, "int32";
    i64 => I64, "int64";
    isize => Isize, "int";
    u8 => U8, "uint8";
    u16 => U16, "uint16";
    u32 => U32, "uint32";
    u64 => U64, "uint64";
    usize => Usize, "uint";
    f32 => F32, "float32";
    f64 => F64, "float64";
}

/// Dtype tag of a column with no elements.
pub const EMPTY_DTYPE: &str = "empty";

fn decode_as<T: SimpleData + DeserializeOwned>(val: JsonValue) -> serde_json::Result<Vec<Value>> {
    let typed: Vec<T> = serde_json::from_value(val)?;
    Ok(typed.into_iter().map(SimpleData::into_value).collect())
}

fn decode_column(dtype: &str, val: JsonValue) -> std::result::Result<Vec<Value>, String> {
    match dtype {
        EMPTY_DTYPE => match val {
            JsonValue::Null => Ok(Vec::new()),
            JsonValue::Array(items) if items.is_empty() => Ok(Vec::new()),
            _ => Err("column tagged \"empty\" has values".to_string()),
        },
        // Older writers tag pointer-sized unsigned columns this way.
        "uintptr" => decode_as::<usize>(val).map_err(|e| e.to_string()),
        _ => match decode_typed(dtype, val) {
            Some(decoded) => decoded.map_err(|e| format!("invalid {} column: {}", dtype, e)),
            None => Err(format!("invalid data type {:?} for a table column", dtype)),
        },
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl Value {
    /// Whether this is an integer or floating point value.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Value::String(_) | Value::Bool(_))
    }

    /// Extract the value as `T`, failing if it holds another type.
    pub fn get<T: SimpleData>(&self) -> Result<T> {
        T::from_value(self).ok_or(RlinkError::TypeMismatch {
            expected: T::DTYPE,
            found: self.dtype(),
        })
    }

    /// False only for NaN and infinite floats, which have no JSON form.
    pub fn is_finite(&self) -> bool {
        match self {
            Value::F32(v) => v.is_finite(),
            Value::F64(v) => v.is_finite(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Build a `Vec<Value>` from anything convertible into [`Value`].
///
/// ```
/// let row = rlink::values![1, "x", false];
/// assert_eq!(row.len(), 3);
/// ```
#[macro_export]
macro_rules! values {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::table::Value::from($value)),*]
    };
}

#[derive(Debug, Clone, Default, PartialEq)]
enum RowNaming {
    /// No row appended yet; either mode may still be chosen.
    #[default]
    Unset,
    Named(Vec<String>),
    Nameless,
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(String::as_str)
        .find(|name| !seen.insert(*name))
}

fn find_row(
    names: Option<&[String]>,
    index: Option<&HashMap<String, usize>>,
    row_name: &str,
) -> Option<usize> {
    if let Some(&i) = index.and_then(|index| index.get(row_name)) {
        return Some(i);
    }
    names?.iter().position(|name| name == row_name)
}

/// Column-oriented table of [`Value`]s.
///
/// Tables are not synchronized; share them behind a lock if needed.
#[derive(Debug, Clone, Default)]
pub struct Table {
    col_names: Vec<String>,
    cols: Vec<Vec<Value>>,
    columns_set: bool,
    num_rows: usize,
    rows: RowNaming,
    row_index: Option<HashMap<String, usize>>,
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.col_names == other.col_names
            && self.cols == other.cols
            && self.num_rows == other.num_rows
            && self.rows == other.rows
    }
}

impl Table {
    /// Create a table with the given column names.
    pub fn new<I, S>(col_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Table::default();
        table.set_columns(col_names);
        table
    }

    /// Set the column names. May only be called once per table.
    ///
    /// # Panics
    ///
    /// Panics if columns were already set or a name repeats.
    pub fn set_columns<I, S>(&mut self, col_names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.columns_set {
            panic!("already set columns on this table");
        }
        let col_names: Vec<String> = col_names.into_iter().map(Into::into).collect();
        if let Some(dup) = first_duplicate(&col_names) {
            panic!("duplicate column name {:?}", dup);
        }
        self.cols = vec![Vec::new(); col_names.len()];
        self.col_names = col_names;
        self.columns_set = true;
    }

    /// Keep a row-name index so named row lookups skip the linear scan.
    ///
    /// Only rows appended after enabling are indexed; earlier rows are still
    /// found, through the scan. Disabling drops the index.
    pub fn fast_row_lookups(&mut self, enable: bool) {
        if !enable {
            self.row_index = None;
        } else if self.row_index.is_none() {
            self.row_index = Some(HashMap::new());
        }
    }

    /// Append a row named `name`.
    ///
    /// # Panics
    ///
    /// Panics if the table already has nameless rows or `values` does not
    /// have one value per column.
    pub fn append_named_row(&mut self, name: impl Into<String>, values: Vec<Value>) {
        if matches!(self.rows, RowNaming::Nameless) {
            panic!("cannot add named row: rows are nameless");
        }
        self.check_arity(&values);

        let name = name.into();
        if let Some(index) = self.row_index.as_mut() {
            index.entry(name.clone()).or_insert(self.num_rows);
        }
        match &mut self.rows {
            RowNaming::Named(names) => names.push(name),
            rows => *rows = RowNaming::Named(vec![name]),
        }
        self.push_values(values);
    }

    /// Append a row without a name.
    ///
    /// # Panics
    ///
    /// Panics if the table already has named rows or `values` does not have
    /// one value per column.
    pub fn append_unnamed_row(&mut self, values: Vec<Value>) {
        if matches!(self.rows, RowNaming::Named(_)) {
            panic!("cannot add nameless row: rows are named");
        }
        self.check_arity(&values);
        self.rows = RowNaming::Nameless;
        self.push_values(values);
    }

    fn check_arity(&self, values: &[Value]) {
        if self.cols.is_empty() {
            panic!("cannot append rows to a table without columns");
        }
        if values.len() != self.cols.len() {
            panic!(
                "incorrect number of values being appended: expected {}, got {}",
                self.cols.len(),
                values.len()
            );
        }
    }

    fn push_values(&mut self, values: Vec<Value>) {
        for (col, value) in self.cols.iter_mut().zip(values) {
            col.push(value);
        }
        self.num_rows += 1;
    }

    /// Check that every column holds a single element type and that every
    /// float is finite.
    pub fn validate(&self) -> Result<()> {
        for (ci, col) in self.cols.iter().enumerate() {
            if let Some(row) = col.iter().position(|v| !v.is_finite()) {
                return Err(RlinkError::Validation {
                    field: format!("column {:?}", self.col_names[ci]),
                    message: format!("row {} holds a non-finite float", row),
                });
            }
            let Some(first) = col.first() else {
                continue;
            };
            let expected = first.dtype();
            if let Some((row, value)) = col
                .iter()
                .enumerate()
                .skip(1)
                .find(|(_, v)| v.dtype() != expected)
            {
                return Err(RlinkError::ColumnType {
                    column: ci,
                    name: self.col_names[ci].clone(),
                    row,
                    expected,
                    found: value.dtype(),
                });
            }
        }
        Ok(())
    }

    pub fn col_names(&self) -> &[String] {
        &self.col_names
    }

    /// Row names, if the rows are named.
    pub fn row_names(&self) -> Option<&[String]> {
        match &self.rows {
            RowNaming::Named(names) => Some(names),
            _ => None,
        }
    }

    pub fn has_named_rows(&self) -> bool {
        matches!(self.rows, RowNaming::Named(_))
    }

    pub fn has_nameless_rows(&self) -> bool {
        matches!(self.rows, RowNaming::Nameless)
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Column `name`, without copying.
    ///
    /// # Panics
    ///
    /// Panics if there is no such column.
    pub fn column(&self, name: &str) -> Column<'_> {
        self.get_column(name)
            .unwrap_or_else(|| panic!("unable to find column {:?}", name))
    }

    /// Column `name`, or `None` if there is no such column.
    pub fn get_column(&self, name: &str) -> Option<Column<'_>> {
        let i = self.col_names.iter().position(|n| n == name)?;
        Some(self.column_at(i))
    }

    /// Column at position `i`, without copying.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    pub fn column_at(&self, i: usize) -> Column<'_> {
        Column {
            values: &self.cols[i],
            row_names: self.row_names(),
            row_index: self.row_index.as_ref(),
        }
    }

    /// Copy of the row named `name`.
    ///
    /// # Panics
    ///
    /// Panics if there is no such row.
    pub fn row(&self, name: &str) -> Row {
        let i = find_row(self.row_names(), self.row_index.as_ref(), name)
            .unwrap_or_else(|| panic!("unable to find row {:?}", name));
        self.row_at(i)
    }

    /// Copy of the row at position `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    pub fn row_at(&self, i: usize) -> Row {
        if i >= self.num_rows {
            panic!("row index {} out of range for {} rows", i, self.num_rows);
        }
        Row {
            col_names: self.col_names.clone(),
            values: self.cols.iter().map(|col| col[i].clone()).collect(),
        }
    }
}

/// Borrowed view of one column.
///
/// The view reads the table's storage directly; it always reflects the
/// table as it is when the view is used.
#[derive(Debug, Clone, Copy)]
pub struct Column<'a> {
    values: &'a [Value],
    row_names: Option<&'a [String]>,
    row_index: Option<&'a HashMap<String, usize>>,
}

impl<'a> Column<'a> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Dtype of the first element, or `empty`.
    pub fn dtype(&self) -> &'static str {
        self.values.first().map_or(EMPTY_DTYPE, Value::dtype)
    }

    /// Value at row position `i`. Panics if out of bounds.
    pub fn value(&self, i: usize) -> &'a Value {
        &self.values[i]
    }

    /// Value in the row named `row_name`. Panics if there is no such row.
    pub fn value_by_row(&self, row_name: &str) -> &'a Value {
        let i = find_row(self.row_names, self.row_index, row_name)
            .unwrap_or_else(|| panic!("unable to find row {:?}", row_name));
        &self.values[i]
    }

    /// Typed value at row position `i`.
    pub fn get_index<T: SimpleData>(&self, i: usize) -> Result<T> {
        self.value(i).get()
    }

    /// Typed value in the row named `row_name`.
    pub fn get<T: SimpleData>(&self, row_name: &str) -> Result<T> {
        self.value_by_row(row_name).get()
    }

    pub fn iter(&self) -> std::slice::Iter<'a, Value> {
        self.values.iter()
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

impl Serialize for Column<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

/// Snapshot of one row. Later changes to the table are not visible.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    col_names: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn col_names(&self) -> &[String] {
        &self.col_names
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value in column `col_name`. Panics if there is no such column.
    pub fn value(&self, col_name: &str) -> &Value {
        let i = self
            .col_names
            .iter()
            .position(|n| n == col_name)
            .unwrap_or_else(|| panic!("unable to find column {:?}", col_name));
        &self.values[i]
    }

    /// Value at column position `i`. Panics if out of bounds.
    pub fn value_at(&self, i: usize) -> &Value {
        &self.values[i]
    }

    /// Typed value in column `col_name`.
    pub fn get<T: SimpleData>(&self, col_name: &str) -> Result<T> {
        self.value(col_name).get()
    }

    /// Typed value at column position `i`.
    pub fn get_index<T: SimpleData>(&self, i: usize) -> Result<T> {
        self.value_at(i).get()
    }
}

// Wire representation

#[derive(Serialize)]
struct ColumnOut<'a> {
    dtype: &'static str,
    val: &'a [Value],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TableOut<'a> {
    cols: Vec<ColumnOut<'a>>,
    col_names: &'a [String],
    row_names: Option<&'a [String]>,
    nameless_rows: bool,
}

#[derive(Deserialize)]
struct ColumnIn {
    dtype: String,
    #[serde(default)]
    val: JsonValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableIn {
    cols: Vec<ColumnIn>,
    col_names: Vec<String>,
    #[serde(default)]
    row_names: Option<Vec<String>>,
    #[serde(default)]
    nameless_rows: bool,
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        TableOut {
            cols: self
                .cols
                .iter()
                .map(|col| ColumnOut {
                    dtype: col.first().map_or(EMPTY_DTYPE, Value::dtype),
                    val: col,
                })
                .collect(),
            col_names: &self.col_names,
            row_names: self.row_names(),
            nameless_rows: self.has_nameless_rows(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Table {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = TableIn::deserialize(deserializer)?;
        Table::from_wire(wire).map_err(D::Error::custom)
    }
}

impl Table {
    fn from_wire(wire: TableIn) -> std::result::Result<Self, String> {
        if wire.cols.len() != wire.col_names.len() {
            return Err(format!(
                "{} columns but {} column names",
                wire.cols.len(),
                wire.col_names.len()
            ));
        }
        if let Some(dup) = first_duplicate(&wire.col_names) {
            return Err(format!("duplicate column name {:?}", dup));
        }

        let mut cols = Vec::with_capacity(wire.cols.len());
        for (name, col) in wire.col_names.iter().zip(wire.cols) {
            let values =
                decode_column(&col.dtype, col.val).map_err(|e| format!("column {:?}: {}", name, e))?;
            cols.push(values);
        }

        let num_rows = cols.first().map_or(0, Vec::len);
        if let Some((name, col)) = wire
            .col_names
            .iter()
            .zip(&cols)
            .find(|(_, col)| col.len() != num_rows)
        {
            return Err(format!(
                "column {:?} has {} rows, expected {}",
                name,
                col.len(),
                num_rows
            ));
        }

        let rows = match (wire.nameless_rows, wire.row_names) {
            (true, Some(names)) if !names.is_empty() => {
                return Err("nameless table carries row names".to_string());
            }
            (true, _) => RowNaming::Nameless,
            (false, Some(names)) => {
                if names.len() != num_rows {
                    return Err(format!("{} row names for {} rows", names.len(), num_rows));
                }
                RowNaming::Named(names)
            }
            // Rows without a recorded mode are treated as nameless.
            (false, None) if num_rows > 0 => RowNaming::Nameless,
            (false, None) => RowNaming::Unset,
        };

        Ok(Table {
            columns_set: true,
            col_names: wire.col_names,
            cols,
            num_rows,
            rows,
            row_index: None,
        })
    }
}
