//! Conversions between stored tables and pipeline records.

use crate::model::{LabeledRecord, Record, Sentiment};
use crate::store::{
    INPUT_TEXT_COLUMN, LABEL_COLUMN, StoreError, TEXT_COLUMN, TIMESTAMP_COLUMN, Table,
};
use crate::util::time::{format_timestamp, parse_timestamp};

/// Extracts posts from a raw input table.
///
/// Rows whose text is blank are dropped; the timestamp column is optional.
///
/// # Errors
/// Returns [`StoreError::MissingColumn`] when the text column is absent.
pub fn records_from_input(key: &str, table: &Table) -> Result<Vec<Record>, StoreError> {
    let text_idx = table.require_column(key, INPUT_TEXT_COLUMN)?;
    let ts_idx = table.column_index(TIMESTAMP_COLUMN);

    Ok(table
        .rows()
        .iter()
        .filter(|row| !row[text_idx].trim().is_empty())
        .map(|row| {
            let timestamp = ts_idx.and_then(|idx| parse_timestamp(&row[idx]));
            Record::new(row[text_idx].clone(), timestamp)
        })
        .collect())
}

/// Rebuilds labeled records from a results or partition table.
///
/// # Errors
/// Returns [`StoreError::MissingColumn`] when the text, label or timestamp column is absent.
pub fn labeled_from_table(key: &str, table: &Table) -> Result<Vec<LabeledRecord>, StoreError> {
    let ts_idx = table.require_column(key, TIMESTAMP_COLUMN)?;
    let text_idx = table.require_column(key, TEXT_COLUMN)?;
    let label_idx = table.require_column(key, LABEL_COLUMN)?;

    Ok(table
        .rows()
        .iter()
        .map(|row| {
            LabeledRecord::new(
                Record::new(row[text_idx].clone(), parse_timestamp(&row[ts_idx])),
                Sentiment::parse_or_fallback(&row[label_idx]),
            )
        })
        .collect())
}

pub fn labeled_to_table<'a, I>(records: I) -> Table
where
    I: IntoIterator<Item = &'a LabeledRecord>,
{
    let mut table = Table::new([TEXT_COLUMN, LABEL_COLUMN, TIMESTAMP_COLUMN]);
    for record in records {
        table.push_row([
            record.text().to_string(),
            record.label.as_str().to_string(),
            format_timestamp(record.timestamp()),
        ]);
    }
    table
}
