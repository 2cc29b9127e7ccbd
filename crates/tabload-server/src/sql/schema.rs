//! Target table descriptions
//!
//! Uploads load into a fixed schema. Each known table is described once as
//! a [`TableSchema`], which drives the column list of `COPY`/`INSERT`
//! statements, the [`ValuesShape`] of a bulk insert and the conversion of
//! CSV records into typed rows.

use thiserror::Error;

use super::values::{EscapeError, LiteralEscaper, Row, SqlValue, ValuesShape};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Float,
}

impl ColumnType {
    fn accepts(self, value: &SqlValue) -> bool {
        matches!(
            (self, value),
            (_, SqlValue::Null)
                | (ColumnType::Text, SqlValue::Text(_))
                | (ColumnType::Float, SqlValue::Float(_))
                | (ColumnType::Float, SqlValue::Int(_))
        )
    }

    fn name(self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Float => "double precision",
        }
    }
}

/// One target column; NOT NULL and foreign keys live in the migration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
}

impl ColumnDef {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RowError {
    #[error("expected {expected} fields, found {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("column '{column}' expects {expected}, got '{value}'")]
    InvalidValue {
        column: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("column '{column}' expects {expected}")]
    TypeMismatch {
        column: &'static str,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub schema: Option<&'static str>,
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
}

/// Iris measurements; `species` references [`SPECIES`]
pub const IRIS: TableSchema = TableSchema {
    schema: Some("public"),
    name: "iris",
    columns: &[
        ColumnDef::new("sepal_length", ColumnType::Float),
        ColumnDef::new("sepal_width", ColumnType::Float),
        ColumnDef::new("petal_length", ColumnType::Float),
        ColumnDef::new("petal_width", ColumnType::Float),
        ColumnDef::new("species", ColumnType::Text),
    ],
};

pub const SPECIES: TableSchema = TableSchema {
    schema: Some("public"),
    name: "species",
    columns: &[
        ColumnDef::new("name", ColumnType::Text),
        ColumnDef::new("genus", ColumnType::Text),
    ],
};

const KNOWN_TABLES: &[&TableSchema] = &[&IRIS, &SPECIES];

impl TableSchema {
    /// Find a known table by `name` or `schema.name`
    pub fn lookup(qualified: &str) -> Option<&'static TableSchema> {
        let (schema, name) = match qualified.split_once('.') {
            Some((schema, name)) => (Some(schema), name),
            None => (None, qualified),
        };

        KNOWN_TABLES.iter().copied().find(|table| {
            table.name == name && (schema.is_none() || schema == table.schema)
        })
    }

    pub fn shape(&self) -> ValuesShape {
        ValuesShape::new(self.columns.len())
    }

    pub fn display_name(&self) -> String {
        match self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.to_string(),
        }
    }

    pub fn qualified_name<E: LiteralEscaper + ?Sized>(&self, escaper: &E) -> Result<String, EscapeError> {
        let table = escaper.quote_identifier(self.name)?;
        match self.schema {
            Some(schema) => Ok(format!("{}.{}", escaper.quote_identifier(schema)?, table)),
            None => Ok(table),
        }
    }

    pub fn column_list<E: LiteralEscaper + ?Sized>(&self, escaper: &E) -> Result<String, EscapeError> {
        let quoted = self
            .columns
            .iter()
            .map(|column| escaper.quote_identifier(column.name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(quoted.join(","))
    }

    /// `INSERT INTO <table>(<columns>) VALUES`
    pub fn insert_prefix<E: LiteralEscaper + ?Sized>(&self, escaper: &E) -> Result<String, EscapeError> {
        Ok(format!(
            "INSERT INTO {}({}) VALUES",
            self.qualified_name(escaper)?,
            self.column_list(escaper)?
        ))
    }

    /// Convert one CSV record into a typed row
    ///
    /// Empty fields become `NULL`, quoted or not. Nullability is left to the
    /// database so a missing required value surfaces as a not-null violation.
    pub fn parse_record(&self, record: &csv::StringRecord) -> Result<Row, RowError> {
        if record.len() != self.columns.len() {
            return Err(RowError::FieldCount {
                expected: self.columns.len(),
                actual: record.len(),
            });
        }

        self.columns
            .iter()
            .zip(record.iter())
            .map(|(column, field)| parse_field(column, field))
            .collect()
    }

    /// Check arity and types of an already typed row; `NULL` passes
    pub fn check_row(&self, row: &[SqlValue]) -> Result<(), RowError> {
        if row.len() != self.columns.len() {
            return Err(RowError::FieldCount {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }

        for (column, value) in self.columns.iter().zip(row) {
            if !column.ty.accepts(value) {
                return Err(RowError::TypeMismatch {
                    column: column.name,
                    expected: column.ty.name(),
                });
            }
        }
        Ok(())
    }
}

fn parse_field(column: &ColumnDef, field: &str) -> Result<SqlValue, RowError> {
    if field.is_empty() {
        return Ok(SqlValue::Null);
    }

    let invalid = || RowError::InvalidValue {
        column: column.name,
        expected: column.ty.name(),
        value: field.to_string(),
    };

    match column.ty {
        ColumnType::Text => Ok(SqlValue::Text(field.to_string())),
        ColumnType::Float => field.trim().parse().map(SqlValue::Float).map_err(|_| invalid()),
    }
}

/// A strongly typed record for one target table
pub trait TableRow {
    fn schema() -> &'static TableSchema;

    /// Values in the schema's column order
    fn into_row(self) -> Row;
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrisRecord {
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
    pub species: String,
}

impl TableRow for IrisRecord {
    fn schema() -> &'static TableSchema {
        &IRIS
    }

    fn into_row(self) -> Row {
        vec![
            self.sepal_length.into(),
            self.sepal_width.into(),
            self.petal_length.into(),
            self.petal_width.into(),
            self.species.into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesRecord {
    pub name: String,
    pub genus: Option<String>,
}

impl TableRow for SpeciesRecord {
    fn schema() -> &'static TableSchema {
        &SPECIES
    }

    fn into_row(self) -> Row {
        vec![self.name.into(), self.genus.into()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::values::PgEscaper;

    fn record(fields: &[&str]) -> csv::StringRecord {
        csv::StringRecord::from(fields.to_vec())
    }

    #[test]
    fn test_lookup_known_tables() {
        assert_eq!(TableSchema::lookup("iris"), Some(&IRIS));
        assert_eq!(TableSchema::lookup("public.iris"), Some(&IRIS));
        assert_eq!(TableSchema::lookup("public.species"), Some(&SPECIES));
        assert_eq!(TableSchema::lookup("other.iris"), None);
        assert_eq!(TableSchema::lookup("users"), None);
    }

    #[test]
    fn test_insert_prefix() {
        assert_eq!(
            SPECIES.insert_prefix(&PgEscaper).unwrap(),
            r#"INSERT INTO "public"."species"("name","genus") VALUES"#
        );
    }

    #[test]
    fn test_species_matches_default_shape() {
        assert_eq!(SPECIES.shape(), ValuesShape::default());
        assert_eq!(IRIS.shape().arity(), 5);
    }

    #[test]
    fn test_parse_record_types() {
        let row = IRIS
            .parse_record(&record(&["5.1", " 3.5", "1.4", "0.2", "setosa"]))
            .unwrap();
        assert_eq!(
            row,
            vec![
                SqlValue::Float(5.1),
                SqlValue::Float(3.5),
                SqlValue::Float(1.4),
                SqlValue::Float(0.2),
                SqlValue::from("setosa"),
            ]
        );
    }

    #[test]
    fn test_parse_record_empty_field_is_null() {
        let row = IRIS
            .parse_record(&record(&["5.1", "3.5", "1.4", "0.2", ""]))
            .unwrap();
        assert_eq!(row[4], SqlValue::Null);
    }

    #[test]
    fn test_parse_record_rejects_bad_number() {
        let err = IRIS
            .parse_record(&record(&["wide", "3.5", "1.4", "0.2", "setosa"]))
            .unwrap_err();
        assert!(matches!(err, RowError::InvalidValue { column: "sepal_length", .. }));
    }

    #[test]
    fn test_parse_record_rejects_field_count() {
        let err = SPECIES.parse_record(&record(&["setosa"])).unwrap_err();
        assert_eq!(err, RowError::FieldCount { expected: 2, actual: 1 });
    }

    #[test]
    fn test_parse_record_quoted_empty_field_is_null() {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(&b"\"\",Iris\n"[..]);
        let record = reader.records().next().unwrap().unwrap();

        let row = SPECIES.parse_record(&record).unwrap();
        assert_eq!(row, vec![SqlValue::Null, SqlValue::from("Iris")]);
    }

    #[test]
    fn test_float_column_accepts_integers() {
        let row = vec![
            SqlValue::Int(5),
            SqlValue::Float(3.5),
            SqlValue::Float(1.4),
            SqlValue::Float(0.2),
            SqlValue::from("setosa"),
        ];
        assert!(IRIS.check_row(&row).is_ok());
    }

    #[test]
    fn test_check_row_leaves_nulls_to_database() {
        let row = SpeciesRecord {
            name: "setosa".to_string(),
            genus: None,
        }
        .into_row();
        assert!(SPECIES.check_row(&row).is_ok());
    }

    #[test]
    fn test_check_row_accepts_typed_record() {
        let row = IrisRecord {
            sepal_length: 5.1,
            sepal_width: 3.5,
            petal_length: 1.4,
            petal_width: 0.2,
            species: "setosa".to_string(),
        }
        .into_row();
        assert!(IrisRecord::schema().check_row(&row).is_ok());
    }

    #[test]
    fn test_check_row_type_mismatch() {
        let row = vec![SqlValue::Int(1), SqlValue::from("Iris")];
        assert_eq!(
            SPECIES.check_row(&row),
            Err(RowError::TypeMismatch {
                column: "name",
                expected: "text"
            })
        );
    }
}
