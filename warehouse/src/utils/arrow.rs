use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use common::Result;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::properties::WriterProperties;

pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Encodes a single batch as an in-memory parquet file, ready to hand to
/// the storage layer.
pub fn write_parquet_bytes(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let props = WriterProperties::builder().build();

    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;

    Ok(buf)
}

pub fn read_parquet_batches(data: Vec<u8>) -> Result<Vec<RecordBatch>> {
    read_parquet_batches_sized(data, DEFAULT_BATCH_SIZE)
}

pub fn read_parquet_batches_sized(data: Vec<u8>, batch_size: usize) -> Result<Vec<RecordBatch>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(data))?
        .with_batch_size(batch_size)
        .build()?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }

    Ok(batches)
}
