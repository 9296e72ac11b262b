use std::collections::VecDeque;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Failure while reading or writing a persisted row.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("missing column `{0}`")]
    MissingColumn(&'static str),

    #[error("could not decode column `{column}`: {source}")]
    Decode {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode column #{index}: {source}")]
    Encode {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown discriminator `{0}`")]
    UnknownDiscriminator(String),

    #[error("{0} unexpected trailing column(s)")]
    TrailingColumns(usize),
}

/// Sequential reader over a persisted row.
pub trait Scanner {
    /// Pop the next raw column, if any.
    fn next_column(&mut self) -> Option<Value>;

    /// Number of columns left.
    fn remaining(&self) -> usize;

    /// Decode the next column into `T`. `column` is only used for error reporting.
    fn scan<T: DeserializeOwned>(&mut self, column: &'static str) -> Result<T, ScanError> {
        let value = self
            .next_column()
            .ok_or(ScanError::MissingColumn(column))?;

        serde_json::from_value(value).map_err(|source| ScanError::Decode { column, source })
    }

    /// Ensure every column has been consumed.
    fn finish(&self) -> Result<(), ScanError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(ScanError::TrailingColumns(n)),
        }
    }
}

/// Row of JSON columns, consumed front to back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowScanner {
    columns: VecDeque<Value>,
}

impl RowScanner {
    pub fn new(columns: Vec<Value>) -> Self {
        Self {
            columns: columns.into(),
        }
    }
}

impl Scanner for RowScanner {
    fn next_column(&mut self) -> Option<Value> {
        self.columns.pop_front()
    }

    fn remaining(&self) -> usize {
        self.columns.len()
    }
}

/// Builds a row column by column, in hydration order.
#[derive(Debug, Default)]
pub struct RowBuilder {
    columns: Vec<Value>,
}

impl RowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, ScanError> {
        let index = self.columns.len();
        let value =
            serde_json::to_value(value).map_err(|source| ScanError::Encode { index, source })?;
        self.columns.push(value);
        Ok(self)
    }

    pub fn build(self) -> Vec<Value> {
        self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scans_columns_in_order() {
        let mut scanner = RowScanner::new(vec![json!("abc"), json!(3), json!(null)]);

        let id: String = scanner.scan("id").unwrap();
        let count: u32 = scanner.scan("count").unwrap();
        let maybe: Option<String> = scanner.scan("maybe").unwrap();

        assert_eq!(id, "abc");
        assert_eq!(count, 3);
        assert_eq!(maybe, None);
        assert!(scanner.finish().is_ok());
    }

    #[test]
    fn reports_missing_and_trailing_columns() {
        let mut scanner = RowScanner::new(vec![json!(1), json!(2)]);

        let _: u8 = scanner.scan("first").unwrap();
        assert!(matches!(
            scanner.finish(),
            Err(ScanError::TrailingColumns(1))
        ));

        let _: u8 = scanner.scan("second").unwrap();
        assert!(matches!(
            scanner.scan::<u8>("third"),
            Err(ScanError::MissingColumn("third"))
        ));
    }

    #[test]
    fn reports_decode_errors_with_the_column_name() {
        let mut scanner = RowScanner::new(vec![json!("not a number")]);

        match scanner.scan::<u64>("version") {
            Err(ScanError::Decode { column, .. }) => assert_eq!(column, "version"),
            other => panic!("Expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn builder_and_scanner_agree_on_order() {
        let row = RowBuilder::new()
            .push("target")
            .and_then(|b| b.push(&Some(42u16)))
            .unwrap()
            .build();

        let mut scanner = RowScanner::new(row);
        assert_eq!(scanner.scan::<String>("name").unwrap(), "target");
        assert_eq!(scanner.scan::<Option<u16>>("port").unwrap(), Some(42));
    }
}
