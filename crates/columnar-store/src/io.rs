use std::fs::File;
use std::path::Path;

use analysis_core::{AnalysisError, Bar, IntervalLabel, Quote};
use chrono_tz::Tz;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::batch::{bars_to_batch, batch_to_bars, batch_to_quotes, quotes_to_batch};
use crate::schema::{bar_schema, quote_schema};

fn io_err(e: impl std::fmt::Display, path: &Path) -> AnalysisError {
    AnalysisError::Io(std::io::Error::other(format!("{}: {e}", path.display())))
}

pub fn read_partition_bars(path: &Path, interval: IntervalLabel, tz: Tz) -> Result<Vec<Bar>, AnalysisError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).map_err(|e| io_err(e, path))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| io_err(e, path))?
        .build()
        .map_err(|e| io_err(e, path))?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| io_err(e, path))?;
        out.extend(batch_to_bars(&batch, interval, tz)?);
    }
    Ok(out)
}

pub fn read_partition_quotes(path: &Path, tz: Tz) -> Result<Vec<Quote>, AnalysisError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).map_err(|e| io_err(e, path))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| io_err(e, path))?
        .build()
        .map_err(|e| io_err(e, path))?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| io_err(e, path))?;
        out.extend(batch_to_quotes(&batch, tz)?);
    }
    Ok(out)
}

pub fn write_partition_bars(path: &Path, bars: &[Bar], tz: Tz) -> Result<(), AnalysisError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(e, path))?;
    }
    let batch = bars_to_batch(bars, tz)?;
    let file = File::create(path).map_err(|e| io_err(e, path))?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, bar_schema(tz), Some(props)).map_err(|e| io_err(e, path))?;
    writer.write(&batch).map_err(|e| io_err(e, path))?;
    writer.close().map_err(|e| io_err(e, path))?;
    Ok(())
}

pub fn write_partition_quotes(path: &Path, quotes: &[Quote], tz: Tz) -> Result<(), AnalysisError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(e, path))?;
    }
    let batch = quotes_to_batch(quotes, tz)?;
    let file = File::create(path).map_err(|e| io_err(e, path))?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, quote_schema(tz), Some(props)).map_err(|e| io_err(e, path))?;
    writer.write(&batch).map_err(|e| io_err(e, path))?;
    writer.close().map_err(|e| io_err(e, path))?;
    Ok(())
}
