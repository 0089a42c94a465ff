// Streaming gzip store of encoded arrays

use super::codec::{EncodingMode, StoredRecord};
use crate::encoding::{CallStackArray, CallStackMetadata};
use crate::error::{CallStackError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Compressed record stream
pub const DATA_FILE: &str = "callstack_arrays.dat";
/// Header written on `close_write`
pub const HEADER_FILE: &str = "callstack_arrays.metadata.json";

/// Everything needed to read the record stream back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHeader {
    pub record_count: usize,
    pub metadata: CallStackMetadata,
    pub encoding_mode: EncodingMode,
}

struct WriteState {
    stream: GzEncoder<BufWriter<File>>,
    metadata: CallStackMetadata,
    mode: EncodingMode,
    count: usize,
}

struct ReadState {
    stream: GzDecoder<BufReader<File>>,
    mode: EncodingMode,
    remaining: usize,
}

/// Append-only store of [`CallStackArray`] records in one directory
///
/// At most one of the write and read streams is open. `init_*` on an open
/// stream and `close_*` on a closed one do nothing.
pub struct ArrayStore {
    dir: PathBuf,
    writer: Option<WriteState>,
    reader: Option<ReadState>,
    header: Option<StoreHeader>,
}

impl ArrayStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            writer: None,
            reader: None,
            header: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn data_path(&self) -> PathBuf {
        self.dir.join(DATA_FILE)
    }

    pub fn header_path(&self) -> PathBuf {
        self.dir.join(HEADER_FILE)
    }

    /// Both artifacts are present on disk
    pub fn exists(&self) -> bool {
        self.data_path().exists() && self.header_path().exists()
    }

    pub fn is_writing(&self) -> bool {
        self.writer.is_some()
    }

    pub fn is_reading(&self) -> bool {
        self.reader.is_some()
    }

    /// Record count from the last header written or loaded
    pub fn record_count(&self) -> Option<usize> {
        self.header.as_ref().map(|h| h.record_count)
    }

    pub fn metadata(&self) -> Option<&CallStackMetadata> {
        self.header.as_ref().map(|h| &h.metadata)
    }

    pub fn encoding_mode(&self) -> Option<EncodingMode> {
        self.header.as_ref().map(|h| h.encoding_mode)
    }

    /// Read the header artifact without opening the record stream
    pub fn load_header(&self) -> Result<StoreHeader> {
        let path = self.header_path();
        if !path.exists() {
            return Err(CallStackError::MissingArtifact(path));
        }
        let contents = fs::read_to_string(&path)?;
        serde_json::from_str(&contents)
            .map_err(|e| CallStackError::Header(format!("{}: {}", path.display(), e)))
    }

    /// Open a fresh record stream, truncating any previous one
    ///
    /// The previous header is removed up front, so an interrupted write never
    /// leaves a store that [`exists`](Self::exists).
    pub fn init_write(&mut self, metadata: &CallStackMetadata, mode: EncodingMode) -> Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }
        if self.reader.is_some() {
            return Err(CallStackError::Inconsistent(
                "cannot write while the read stream is open".to_string(),
            ));
        }

        fs::create_dir_all(&self.dir)?;
        remove_if_present(&self.header_path())?;
        self.header = None;
        let file = File::create(self.data_path())?;
        self.writer = Some(WriteState {
            stream: GzEncoder::new(BufWriter::new(file), Compression::default()),
            metadata: metadata.clone(),
            mode,
            count: 0,
        });
        tracing::debug!(dir = %self.dir.display(), %mode, "Array store opened for writing");
        Ok(())
    }

    /// Append one record
    ///
    /// A failed write closes the stream without a header.
    pub fn write(&mut self, array: &CallStackArray) -> Result<()> {
        let mut state = self
            .writer
            .take()
            .ok_or(CallStackError::NotInitialized("write"))?;

        let record = StoredRecord::from_array(array, state.mode);
        rmp_serde::encode::write(&mut state.stream, &record)?;
        state.count += 1;
        tracing::trace!(
            address = array.address(),
            timestamp = array.timestamp(),
            "Record written"
        );

        self.writer = Some(state);
        Ok(())
    }

    /// Flush the record stream and write the header
    pub fn close_write(&mut self) -> Result<()> {
        let Some(state) = self.writer.take() else {
            return Ok(());
        };

        let mut inner = state.stream.finish()?;
        inner.flush()?;

        let header = StoreHeader {
            record_count: state.count,
            metadata: state.metadata,
            encoding_mode: state.mode,
        };
        let json = serde_json::to_string_pretty(&header)
            .map_err(|e| CallStackError::Header(e.to_string()))?;
        fs::write(self.header_path(), json)?;

        tracing::debug!(records = header.record_count, "Array store closed for writing");
        self.header = Some(header);
        Ok(())
    }

    /// Load the header and position the stream at the first record
    pub fn init_read(&mut self) -> Result<()> {
        if self.reader.is_some() {
            return Ok(());
        }
        if self.writer.is_some() {
            return Err(CallStackError::Inconsistent(
                "cannot read while the write stream is open".to_string(),
            ));
        }

        let header = self.load_header()?;
        let data_path = self.data_path();
        if !data_path.exists() {
            return Err(CallStackError::MissingArtifact(data_path));
        }
        let file = File::open(&data_path)?;

        self.reader = Some(ReadState {
            stream: GzDecoder::new(BufReader::new(file)),
            mode: header.encoding_mode,
            remaining: header.record_count,
        });
        tracing::debug!(records = header.record_count, "Array store opened for reading");
        self.header = Some(header);
        Ok(())
    }

    /// Records remain according to the header count
    pub fn has_next(&self) -> bool {
        self.reader.as_ref().is_some_and(|r| r.remaining > 0)
    }

    /// Decode the next record, or `None` once the header count is exhausted
    ///
    /// # Errors
    ///
    /// `Inconsistent` when the stream ends before the header count is reached,
    /// `Decode` on a corrupt record. Both close the read stream.
    pub fn read(&mut self) -> Result<Option<CallStackArray>> {
        let state = self
            .reader
            .as_mut()
            .ok_or(CallStackError::NotInitialized("read"))?;
        if state.remaining == 0 {
            return Ok(None);
        }

        let mode = state.mode;
        let remaining = state.remaining;
        let decoded: std::result::Result<StoredRecord, rmp_serde::decode::Error> =
            rmp_serde::decode::from_read(&mut state.stream);

        let result = match decoded {
            Ok(record) => {
                state.remaining -= 1;
                record.into_array(mode)
            }
            Err(rmp_serde::decode::Error::InvalidMarkerRead(ref e))
                if e.kind() == io::ErrorKind::UnexpectedEof =>
            {
                Err(CallStackError::Inconsistent(format!(
                    "record stream ended with {} records still expected",
                    remaining
                )))
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(array) => Ok(Some(array)),
            Err(e) => {
                tracing::warn!("Closing read stream after failure: {}", e);
                self.reader = None;
                Err(e)
            }
        }
    }

    pub fn close_read(&mut self) {
        self.reader = None;
    }

    /// Restart whichever stream is open from the beginning
    ///
    /// A write stream is truncated; records written so far are discarded.
    pub fn reset(&mut self) -> Result<()> {
        if let Some(state) = self.writer.take() {
            drop(state.stream);
            return self.init_write(&state.metadata, state.mode);
        }
        if self.reader.is_some() {
            self.close_read();
            return self.init_read();
        }
        Ok(())
    }

    /// Close both streams and delete the artifacts
    pub fn dispose(&mut self) -> Result<()> {
        self.writer = None;
        self.reader = None;
        self.header = None;
        for path in [self.data_path(), self.header_path()] {
            remove_if_present(&path)?;
        }
        tracing::debug!(dir = %self.dir.display(), "Array store disposed");
        Ok(())
    }

    /// Drain the open read stream
    pub fn records(&mut self) -> Records<'_> {
        Records {
            store: self,
            failed: false,
        }
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Iterator over the remaining records of an open read stream
pub struct Records<'a> {
    store: &'a mut ArrayStore,
    failed: bool,
}

impl Iterator for Records<'_> {
    type Item = Result<CallStackArray>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.store.has_next() {
            return None;
        }
        match self.store.read() {
            Ok(Some(array)) => Some(Ok(array)),
            Ok(None) => {
                self.failed = true;
                Some(Err(CallStackError::Inconsistent(
                    "record expected but none was read".to_string(),
                )))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
