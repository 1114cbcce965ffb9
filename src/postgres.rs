//! PostgreSQL data source
//!
//! Streams a query result through a server-side cursor, fetching rows in
//! batches so memory stays flat regardless of result size.
//!
//! ```no_run
//! use excelstream_data::postgres::PostgresReader;
//! use excelstream_data::writer::ExcelDataWriter;
//! use postgres::{Client, NoTls};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = Client::connect("postgres://localhost/shop", NoTls)?;
//! let mut reader = PostgresReader::new(&mut client, "SELECT id, name, created_at FROM orders")?;
//!
//! let mut writer = ExcelDataWriter::create("orders.xlsx")?;
//! writer.write(&mut reader, Some("Orders"))?;
//! writer.close()?;
//! reader.finish()?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use ::postgres::types::Type;
use ::postgres::{Client, Row, Transaction};

use crate::data_reader::{DataReader, DataRecord};
use crate::error::{ExcelError, Result};
use crate::types::{CellValue, Column, ColumnType};

const CURSOR_NAME: &str = "excelstream_export";

/// Rows fetched per round trip unless configured otherwise
pub const DEFAULT_BATCH_SIZE: u32 = 500;

/// Forward-only reader over a PostgreSQL query
///
/// Supported column types: `bool`, `int2/4/8`, `float4/8`, text types,
/// `date`, `timestamp` and `timestamptz` (as UTC). Other types are read as
/// text when the driver allows it; cast `numeric` to `float8` or `text` in
/// the query.
pub struct PostgresReader<'a> {
    transaction: Transaction<'a>,
    columns: Vec<Column>,
    types: Vec<Type>,
    batch: std::vec::IntoIter<Row>,
    current: Option<Row>,
    batch_size: u32,
    exhausted: bool,
}

impl<'a> PostgresReader<'a> {
    pub fn new(client: &'a mut Client, query: &str) -> Result<Self> {
        Self::with_batch_size(client, query, DEFAULT_BATCH_SIZE)
    }

    /// Open a cursor over `query`, fetching `batch_size` rows per round trip
    pub fn with_batch_size(client: &'a mut Client, query: &str, batch_size: u32) -> Result<Self> {
        let mut transaction = client.transaction()?;

        let statement = transaction.prepare(query)?;
        let types: Vec<Type> = statement
            .columns()
            .iter()
            .map(|c| c.type_().clone())
            .collect();
        let columns = statement
            .columns()
            .iter()
            .map(|c| Column::new(c.name(), column_type(c.type_())))
            .collect();

        transaction.batch_execute(&format!(
            "DECLARE {} NO SCROLL CURSOR FOR {}",
            CURSOR_NAME, query
        ))?;
        log::debug!("opened cursor for query ({} columns)", types.len());

        Ok(PostgresReader {
            transaction,
            columns,
            types,
            batch: Vec::new().into_iter(),
            current: None,
            batch_size: batch_size.max(1),
            exhausted: false,
        })
    }

    /// Close the cursor and end the transaction
    pub fn finish(mut self) -> Result<()> {
        self.transaction
            .batch_execute(&format!("CLOSE {}", CURSOR_NAME))?;
        self.transaction.commit()?;
        Ok(())
    }

    fn fetch(&mut self) -> Result<()> {
        let rows = self.transaction.query(
            &format!("FETCH {} FROM {}", self.batch_size, CURSOR_NAME),
            &[],
        )?;
        log::debug!("fetched {} rows", rows.len());
        if rows.len() < self.batch_size as usize {
            self.exhausted = true;
        }
        self.batch = rows.into_iter();
        Ok(())
    }
}

impl DataRecord for PostgresReader<'_> {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn get_value(&self, ordinal: usize) -> Result<CellValue> {
        let ty = self.types.get(ordinal).ok_or_else(|| {
            ExcelError::InvalidDataSource(format!(
                "column ordinal {} out of range ({} columns)",
                ordinal,
                self.types.len()
            ))
        })?;
        let row = self.current.as_ref().ok_or_else(|| {
            ExcelError::InvalidDataSource("no current record; call read() first".to_string())
        })?;

        let value = match *ty {
            Type::BOOL => row.try_get::<_, Option<bool>>(ordinal)?.into(),
            Type::INT2 => row.try_get::<_, Option<i16>>(ordinal)?.map(i64::from).into(),
            Type::INT4 => row.try_get::<_, Option<i32>>(ordinal)?.map(i64::from).into(),
            Type::INT8 => row.try_get::<_, Option<i64>>(ordinal)?.into(),
            Type::FLOAT4 => row.try_get::<_, Option<f32>>(ordinal)?.map(f64::from).into(),
            Type::FLOAT8 => row.try_get::<_, Option<f64>>(ordinal)?.into(),
            Type::DATE => row.try_get::<_, Option<NaiveDate>>(ordinal)?.into(),
            Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(ordinal)?.into(),
            Type::TIMESTAMPTZ => row
                .try_get::<_, Option<DateTime<Utc>>>(ordinal)?
                .map(|dt| dt.naive_utc())
                .into(),
            _ => row.try_get::<_, Option<String>>(ordinal)?.into(),
        };
        Ok(value)
    }
}

impl DataReader for PostgresReader<'_> {
    fn read(&mut self) -> Result<bool> {
        if self.batch.len() == 0 && !self.exhausted {
            self.fetch()?;
        }
        self.current = self.batch.next();
        if self.current.is_none() {
            self.exhausted = true;
        }
        Ok(self.current.is_some())
    }
}

/// Cell type a PostgreSQL column maps to
pub fn column_type(ty: &Type) -> ColumnType {
    match *ty {
        Type::BOOL => ColumnType::Bool,
        Type::INT2 | Type::INT4 | Type::INT8 => ColumnType::Int,
        Type::FLOAT4 | Type::FLOAT8 => ColumnType::Float,
        Type::DATE => ColumnType::Date,
        Type::TIMESTAMP | Type::TIMESTAMPTZ => ColumnType::DateTime,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => ColumnType::String,
        _ => ColumnType::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_mapping() {
        assert_eq!(column_type(&Type::INT4), ColumnType::Int);
        assert_eq!(column_type(&Type::FLOAT8), ColumnType::Float);
        assert_eq!(column_type(&Type::VARCHAR), ColumnType::String);
        assert_eq!(column_type(&Type::TIMESTAMPTZ), ColumnType::DateTime);
        assert_eq!(column_type(&Type::DATE), ColumnType::Date);
        assert_eq!(column_type(&Type::NUMERIC), ColumnType::Unknown);
    }
}
