use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use harvester_core::error::AppError;
use harvester_core::models::{RecipeRecord, TSV_HEADERS};
use harvester_core::traits::RecordSink;

/// Buffered TSV writer with an optional JSONL mirror.
///
/// Records accumulate in memory until `flush_threshold` is reached. A flush
/// takes the buffer out under a short lock and writes it on the blocking
/// pool; concurrent flushes are serialized so batches never interleave.
#[derive(Clone)]
pub struct ResultWriter {
    output: PathBuf,
    jsonl: Option<PathBuf>,
    flush_threshold: usize,
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    buffer: Mutex<Vec<RecipeRecord>>,
    io_lock: tokio::sync::Mutex<()>,
}

impl ResultWriter {
    pub fn new(output: impl Into<PathBuf>, flush_threshold: usize) -> Self {
        Self {
            output: output.into(),
            jsonl: None,
            flush_threshold: flush_threshold.max(1),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Mirror every flushed batch to `path`, one JSON object per line.
    pub fn with_jsonl(mut self, path: Option<PathBuf>) -> Self {
        self.jsonl = path;
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Records waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.lock_buffer().len()
    }

    fn lock_buffer(&self) -> std::sync::MutexGuard<'_, Vec<RecipeRecord>> {
        self.shared
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_buffer(&self) -> Vec<RecipeRecord> {
        std::mem::take(&mut *self.lock_buffer())
    }

    /// Put a failed batch back in front of anything appended meanwhile.
    fn restore(&self, mut batch: Vec<RecipeRecord>) {
        let mut buffer = self.lock_buffer();
        batch.append(&mut buffer);
        *buffer = batch;
    }
}

impl RecordSink for ResultWriter {
    async fn append(&self, record: RecipeRecord) -> Result<(), AppError> {
        let full = {
            let mut buffer = self.lock_buffer();
            buffer.push(record);
            buffer.len() >= self.flush_threshold
        };
        if full {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), AppError> {
        let _io = self.shared.io_lock.lock().await;
        let batch = self.take_buffer();
        if batch.is_empty() {
            return Ok(());
        }

        let output = self.output.clone();
        let jsonl = self.jsonl.clone();
        let count = batch.len();
        let result = tokio::task::spawn_blocking(move || {
            let written = write_batch(&output, jsonl.as_deref(), &batch);
            (batch, written)
        })
        .await;

        match result {
            Ok((_, Ok(()))) => {
                tracing::debug!(count, path = %self.output.display(), "Flushed records");
                Ok(())
            }
            Ok((batch, Err(e))) => {
                tracing::error!(
                    error = %e,
                    count,
                    "Failed to flush records; keeping them buffered"
                );
                self.restore(batch);
                Err(e)
            }
            Err(e) => Err(AppError::Generic(format!("Writer task failed: {e}"))),
        }
    }
}

fn write_batch(
    output: &Path,
    jsonl: Option<&Path>,
    batch: &[RecipeRecord],
) -> Result<(), AppError> {
    append_tsv(output, batch)?;
    if let Some(path) = jsonl {
        append_jsonl(path, batch)?;
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn csv_err(e: csv::Error) -> AppError {
    AppError::IoError(std::io::Error::other(e))
}

fn append_tsv(path: &Path, batch: &[RecipeRecord]) -> Result<(), AppError> {
    ensure_parent(path)?;
    let is_new = !path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    // Cells are whitespace-collapsed, so no quoting is ever needed.
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .has_headers(false)
        .from_writer(file);

    if is_new {
        writer.write_record(TSV_HEADERS).map_err(csv_err)?;
    }
    for record in batch {
        writer.write_record(record.to_row()).map_err(csv_err)?;
    }
    writer.flush()?;
    Ok(())
}

fn append_jsonl(path: &Path, batch: &[RecipeRecord]) -> Result<(), AppError> {
    ensure_parent(path)?;
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut out = BufWriter::new(file);
    for record in batch {
        serde_json::to_writer(&mut out, &record.to_json())?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
