//! Columnar export of fit results (Arrow/Parquet)
//!
//! One row per [`FitResult`]. Parameters the fitted model does not have are
//! null, so exponential and PSP fits can share one table.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use tracing::debug;

use crate::fit::FitResult;
use crate::Result;

const PARAM_COLUMNS: [&str; 5] = ["yoffset", "amp", "tau", "rise_time", "decay_tau"];

/// Schema of the exported fit table.
#[must_use]
pub fn fit_results_schema() -> SchemaRef {
    let mut fields = vec![
        Field::new("method", DataType::Utf8, false),
        Field::new("model", DataType::Utf8, false),
    ];
    fields.extend(PARAM_COLUMNS.iter().map(|name| Field::new(*name, DataType::Float64, true)));
    fields.extend([
        Field::new("error", DataType::Float64, true),
        Field::new("iterations", DataType::UInt64, true),
        Field::new("success", DataType::Boolean, false),
        Field::new("fit_time_s", DataType::Float64, false),
    ]);
    Arc::new(Schema::new(fields))
}

/// Convert fit results into a single record batch.
///
/// # Errors
///
/// `Error::Arrow` if the columns do not match the schema.
pub fn fit_results_to_batch(results: &[FitResult]) -> Result<RecordBatch> {
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(results.iter().map(FitResult::method))),
        Arc::new(StringArray::from_iter_values(results.iter().map(|r| r.model().name()))),
    ];
    for name in PARAM_COLUMNS {
        columns.push(Arc::new(Float64Array::from(
            results.iter().map(|r| r.param(name)).collect::<Vec<_>>(),
        )));
    }
    columns.push(Arc::new(Float64Array::from(
        results.iter().map(FitResult::error).collect::<Vec<_>>(),
    )));
    columns.push(Arc::new(UInt64Array::from(
        results
            .iter()
            .map(|r| r.iterations().and_then(|n| u64::try_from(n).ok()))
            .collect::<Vec<_>>(),
    )));
    columns.push(Arc::new(BooleanArray::from(
        results.iter().map(FitResult::success).collect::<Vec<_>>(),
    )));
    columns.push(Arc::new(Float64Array::from(
        results
            .iter()
            .map(|r| r.fit_time().as_secs_f64())
            .collect::<Vec<_>>(),
    )));

    Ok(RecordBatch::try_new(fit_results_schema(), columns)?)
}

/// Write a record batch to a Parquet file, replacing any existing file.
///
/// # Errors
///
/// `Error::Io` if the file cannot be created, `Error::Parquet` if encoding fails.
pub fn write_parquet<P: AsRef<Path>>(batch: &RecordBatch, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    debug!(
        rows = batch.num_rows(),
        path = %path.as_ref().display(),
        "Wrote fit results"
    );
    Ok(())
}
