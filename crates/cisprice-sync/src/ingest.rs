//! Row ingestion: one loaded sheet into one open store session.

use cisprice_adapters::{ColumnMap, Sheet};
use cisprice_core::{
    normalize_decimal, CellValue, ImportTally, PriceRecord, RowOutcome, SkipReason,
};
use cisprice_storage::{PriceSession, StoreError};
use tracing::{error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub skip_leading_rows: usize,
    pub sample_rows: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            skip_leading_rows: 1,
            sample_rows: 5,
        }
    }
}

/// 1-based physical row number of a data row, with the header on row 1.
pub fn sheet_row_number(data_index: usize) -> usize {
    data_index + 2
}

/// Ingest one row. Only connection-level store errors come back as `Err`;
/// everything else that goes wrong is a skipped row.
pub async fn ingest_row(
    session: &mut dyn PriceSession,
    row: &[CellValue],
    columns: &ColumnMap,
    date: &str,
) -> Result<(RowOutcome, Option<PriceRecord>), StoreError> {
    let part_cell = Sheet::cell(row, &columns.part_number);
    if let CellValue::Error(value) = part_cell {
        return Ok((RowOutcome::Skipped(SkipReason::ErrorCell(value.clone())), None));
    }
    if part_cell.is_blank() {
        return Ok((RowOutcome::Skipped(SkipReason::BlankPartNumber), None));
    }

    let record = PriceRecord {
        part_number: part_cell.as_text().trim().to_string(),
        cost_usd: normalize_decimal(Sheet::cell(row, &columns.cost)),
        date: date.to_string(),
    };

    match session.upsert(&record).await {
        Ok(kind) => Ok((kind.into(), Some(record))),
        Err(err) if err.is_connection() => Err(err),
        Err(err) => Ok((RowOutcome::Skipped(SkipReason::Store(err.to_string())), Some(record))),
    }
}

/// Ingest every data row of `sheet` into `session`, returning the file's tally.
///
/// The first `skip_leading_rows` rows below the header are discarded unread.
/// A connection-level store error aborts the file; the caller rolls back.
pub async fn ingest_sheet(
    session: &mut dyn PriceSession,
    sheet: &Sheet,
    columns: &ColumnMap,
    date: &str,
    options: IngestOptions,
) -> Result<ImportTally, StoreError> {
    let mut tally = ImportTally::default();

    for (data_index, row) in sheet
        .rows()
        .iter()
        .enumerate()
        .skip(options.skip_leading_rows)
    {
        let row_number = sheet_row_number(data_index);
        let (outcome, record) = match ingest_row(session, row, columns, date)
            .instrument(info_span!("row", row = row_number))
            .await
        {
            Ok(result) => result,
            Err(err) => {
                error!(row = row_number, error = %err, "store connection lost mid-file");
                return Err(err);
            }
        };

        if data_index < options.sample_rows {
            if let Some(record) = &record {
                info!(
                    row = row_number,
                    part_number = %record.part_number,
                    raw_cost = %Sheet::cell(row, &columns.cost),
                    cost = %record.cost_usd,
                    "sample row"
                );
            }
        }

        match &outcome {
            RowOutcome::Skipped(SkipReason::BlankPartNumber) => {}
            RowOutcome::Skipped(reason) => {
                warn!(
                    row = row_number,
                    part_number = record.as_ref().map(|r| r.part_number.as_str()).unwrap_or(""),
                    reason = %reason,
                    "row skipped"
                );
            }
            RowOutcome::Inserted | RowOutcome::Updated => {}
        }
        tally.record(&outcome);
    }

    Ok(tally)
}
