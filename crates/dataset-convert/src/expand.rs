//! Dimensionality expansion: append zero-filled base dimensions to the
//! action and observation.state vectors of every data file.
//!
//! The robot's base was physically stationary in the source recordings,
//! so zero is the exact value for the new dimensions. The append is
//! position-preserving: original dimension order and values are never
//! touched.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Float32Builder, ListArray, ListBuilder,
    RecordBatch,
};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::{debug, info};

use crate::error::{ConvertError, Result};

/// Columns that receive the zero-filled append.
pub const VECTOR_COLUMNS: [&str; 2] = ["action", "observation.state"];

/// Expand every parquet file under `data_dir` in place, appending `pad`
/// zero dimensions to the action and observation.state columns.
///
/// `expected_dim` guards against double expansion: a file whose vectors
/// are not exactly that wide is rejected, not silently re-padded.
pub fn expand_data_dir(data_dir: &Path, pad: usize, expected_dim: usize) -> Result<usize> {
    let files = collect_parquet_files(data_dir)?;
    info!(files = files.len(), pad, "expanding vector dimensions");
    for file in &files {
        expand_parquet_file(file, pad, expected_dim)?;
        debug!(file = %file.display(), "expanded");
    }
    Ok(files.len())
}

/// Rewrite one parquet file with expanded vector columns.
///
/// The transformed content is written next to the original and moved
/// over it only once the write succeeded, so a failure cannot leave a
/// truncated data file behind.
pub fn expand_parquet_file(path: &Path, pad: usize, expected_dim: usize) -> Result<()> {
    let file = File::open(path).map_err(|err| ConvertError::io(err, path))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(expand_batch(&batch?, pad, expected_dim, path)?);
    }

    let tmp_path = path.with_extension("parquet.tmp");
    {
        let tmp = File::create(&tmp_path).map_err(|err| ConvertError::io(err, &tmp_path))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let schema = batches
            .first()
            .map(|batch| batch.schema())
            .ok_or_else(|| {
                ConvertError::io(
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "empty parquet file"),
                    path,
                )
            })?;
        let mut writer = ArrowWriter::try_new(tmp, schema, Some(props))?;
        for batch in &batches {
            writer.write(batch)?;
        }
        writer.close()?;
    }
    std::fs::rename(&tmp_path, path).map_err(|err| ConvertError::io(err, path))?;
    Ok(())
}

fn expand_batch(
    batch: &RecordBatch,
    pad: usize,
    expected_dim: usize,
    path: &Path,
) -> Result<RecordBatch> {
    let mut columns: Vec<(String, ArrayRef)> = Vec::with_capacity(batch.num_columns());
    for (field, column) in batch.schema().fields().iter().zip(batch.columns()) {
        let column = if VECTOR_COLUMNS.contains(&field.name().as_str()) {
            expand_vector_column(column, pad, expected_dim, field.name(), path)?
        } else {
            column.clone()
        };
        columns.push((field.name().clone(), column));
    }
    Ok(RecordBatch::try_from_iter(columns)?)
}

/// Append `pad` zeros to every row of a float32 vector column.
///
/// Data files in the wild store the vectors either as fixed-size lists
/// or as plain lists; both are handled, and both come back out as the
/// same kind they went in as.
fn expand_vector_column(
    array: &ArrayRef,
    pad: usize,
    expected_dim: usize,
    column: &str,
    path: &Path,
) -> Result<ArrayRef> {
    match array.data_type() {
        DataType::FixedSizeList(field, size) => {
            let old_dim = usize::try_from(*size).unwrap_or(0);
            check_dim(old_dim, expected_dim, path)?;
            let list = downcast::<FixedSizeListArray>(array, column, path)?;

            let new_dim = old_dim + pad;
            let mut flat = Vec::with_capacity(list.len() * new_dim);
            for row in 0..list.len() {
                let values = list.value(row);
                let values = downcast::<Float32Array>(&values, column, path)?;
                for index in 0..old_dim {
                    flat.push(values.value(index));
                }
                flat.extend(std::iter::repeat(0.0f32).take(pad));
            }

            let values = Float32Array::from(flat);
            let item = Arc::new(arrow::datatypes::Field::new(
                field.name(),
                DataType::Float32,
                field.is_nullable(),
            ));
            Ok(Arc::new(FixedSizeListArray::new(
                item,
                new_dim as i32,
                Arc::new(values),
                None,
            )))
        }
        DataType::List(_) => {
            let list = downcast::<ListArray>(array, column, path)?;
            let mut builder = ListBuilder::new(Float32Builder::new());
            for row in 0..list.len() {
                let values = list.value(row);
                let values = downcast::<Float32Array>(&values, column, path)?;
                check_dim(values.len(), expected_dim, path)?;
                for index in 0..values.len() {
                    builder.values().append_value(values.value(index));
                }
                for _ in 0..pad {
                    builder.values().append_value(0.0);
                }
                builder.append(true);
            }
            Ok(Arc::new(builder.finish()))
        }
        other => Err(ConvertError::UnsupportedColumn {
            column: column.to_string(),
            path: path.to_owned(),
            dtype: format!("{other:?}"),
        }),
    }
}

fn check_dim(found: usize, expected: usize, path: &Path) -> Result<()> {
    if found != expected {
        return Err(ConvertError::WrongSourceDim {
            path: path.to_owned(),
            expected,
            found,
        });
    }
    Ok(())
}

fn downcast<'a, T: 'static>(array: &'a dyn Array, column: &str, path: &Path) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ConvertError::UnsupportedColumn {
            column: column.to_string(),
            path: path.to_owned(),
            dtype: format!("{:?}", array.data_type()),
        })
}

/// All parquet files under a directory, sorted for deterministic order.
pub fn collect_parquet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries =
            std::fs::read_dir(&current).map_err(|err| ConvertError::io(err, &current))?;
        for entry in entries {
            let entry = entry.map_err(|err| ConvertError::io(err, &current))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "parquet") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::Field;

    fn vector_batch(rows: usize, dim: usize) -> RecordBatch {
        let flat: Vec<f32> = (0..rows * dim).map(|v| v as f32 * 0.01).collect();
        let item = Arc::new(Field::new("item", DataType::Float32, false));
        let action = FixedSizeListArray::new(
            item.clone(),
            dim as i32,
            Arc::new(Float32Array::from(flat.clone())),
            None,
        );
        let state =
            FixedSizeListArray::new(item, dim as i32, Arc::new(Float32Array::from(flat)), None);
        let frame_index = Int64Array::from((0..rows as i64).collect::<Vec<_>>());
        RecordBatch::try_from_iter(vec![
            ("action", Arc::new(action) as ArrayRef),
            ("observation.state", Arc::new(state) as ArrayRef),
            ("frame_index", Arc::new(frame_index) as ArrayRef),
        ])
        .unwrap()
    }

    fn write_parquet(path: &Path, batch: &RecordBatch) {
        let file = File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
        writer.write(batch).unwrap();
        writer.close().unwrap();
    }

    fn read_parquet(path: &Path) -> RecordBatch {
        let file = File::open(path).unwrap();
        let mut reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        reader.next().unwrap().unwrap()
    }

    #[test]
    fn expansion_appends_exact_zeros() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode_000000.parquet");
        let original = vector_batch(4, 12);
        write_parquet(&path, &original);

        expand_parquet_file(&path, 3, 12).unwrap();
        let expanded = read_parquet(&path);

        let action = expanded
            .column_by_name("action")
            .unwrap()
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .unwrap()
            .clone();
        assert_eq!(action.value_length(), 15);

        let original_action = original
            .column_by_name("action")
            .unwrap()
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .unwrap()
            .clone();

        for row in 0..4 {
            let new_row = action.value(row);
            let new_row = new_row.as_any().downcast_ref::<Float32Array>().unwrap();
            let old_row = original_action.value(row);
            let old_row = old_row.as_any().downcast_ref::<Float32Array>().unwrap();
            // concat(original, zeros(3)), dimension-wise equality
            for index in 0..12 {
                assert_eq!(new_row.value(index), old_row.value(index));
            }
            for index in 12..15 {
                assert_eq!(new_row.value(index), 0.0);
            }
        }
    }

    #[test]
    fn non_vector_columns_are_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode_000000.parquet");
        write_parquet(&path, &vector_batch(3, 12));
        expand_parquet_file(&path, 3, 12).unwrap();
        let expanded = read_parquet(&path);
        let frame_index = expanded
            .column_by_name("frame_index")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .clone();
        assert_eq!(frame_index.values(), &[0, 1, 2]);
    }

    #[test]
    fn already_expanded_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode_000000.parquet");
        write_parquet(&path, &vector_batch(2, 15));
        let err = expand_parquet_file(&path, 3, 12).unwrap_err();
        assert!(matches!(err, ConvertError::WrongSourceDim { found: 15, .. }));
        // And the original file must be intact.
        let batch = read_parquet(&path);
        let action = batch
            .column_by_name("action")
            .unwrap()
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .unwrap()
            .clone();
        assert_eq!(action.value_length(), 15);
    }

    #[test]
    fn list_encoded_vectors_are_supported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode_000000.parquet");

        let mut action = ListBuilder::new(Float32Builder::new());
        let mut state = ListBuilder::new(Float32Builder::new());
        for _ in 0..2 {
            for index in 0..12 {
                action.values().append_value(index as f32);
                state.values().append_value(index as f32);
            }
            action.append(true);
            state.append(true);
        }
        let batch = RecordBatch::try_from_iter(vec![
            ("action", Arc::new(action.finish()) as ArrayRef),
            ("observation.state", Arc::new(state.finish()) as ArrayRef),
        ])
        .unwrap();
        write_parquet(&path, &batch);

        expand_parquet_file(&path, 3, 12).unwrap();
        let expanded = read_parquet(&path);
        let action = expanded
            .column_by_name("action")
            .unwrap()
            .as_any()
            .downcast_ref::<ListArray>()
            .unwrap()
            .clone();
        let row = action.value(0);
        let row = row.as_any().downcast_ref::<Float32Array>().unwrap().clone();
        assert_eq!(row.len(), 15);
        assert_eq!(row.value(14), 0.0);
    }

    #[test]
    fn collect_walks_nested_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = dir.path().join("chunk-000");
        std::fs::create_dir_all(&chunk).unwrap();
        write_parquet(&chunk.join("episode_000001.parquet"), &vector_batch(1, 12));
        write_parquet(&chunk.join("episode_000000.parquet"), &vector_batch(1, 12));
        let files = collect_parquet_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("episode_000000.parquet"));
    }
}
