use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::codec::{read_frame, EntityCodec, Serializer};
use crate::error::{Result, StoreError};
use crate::types::{Identity, Record};

pub const WAL_FILE_NAME: &str = "regions.wal";

/// One logged region mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalEntry {
    Put(Record),
    Delete { region: String, key: Identity },
    DropRegion(String),
}

pub struct WriteAheadLog {
    file: BufWriter<File>,
    path: PathBuf,
    codec: EntityCodec,
    sync_on_write: bool,
}

impl WriteAheadLog {
    pub fn open(dir: &Path, codec: EntityCodec, sync_on_write: bool) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(WAL_FILE_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            file: BufWriter::new(file),
            path,
            codec,
            sync_on_write,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends and flushes one entry. Also fsyncs when `sync_on_write` is set.
    pub fn append(&mut self, entry: &WalEntry) -> Result<()> {
        let codec = self.codec;
        self.append_with(&codec, entry)
    }

    /// Appends using a region-specific codec. Replay reads any codec.
    ///
    /// JSON cannot carry every value (non-finite floats come back as `null`),
    /// so JSON frames are decoded and compared before they are written. An
    /// entry that would not replay as itself is rejected with `Validation`.
    pub fn append_with(&mut self, codec: &EntityCodec, entry: &WalEntry) -> Result<()> {
        let frame = codec.encode(entry)?;
        if codec.serializer() == Serializer::Json {
            let decoded = codec.decode::<WalEntry>(&frame).ok();
            if decoded.as_ref() != Some(entry) {
                return Err(StoreError::validation(
                    "entry does not survive a JSON round trip",
                ));
            }
        }
        self.file.write_all(&frame)?;
        self.file.flush()?;
        if self.sync_on_write {
            self.file.get_ref().sync_data()?;
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }

    /// Reads every intact entry. A torn or corrupt tail ends the replay; a
    /// frame whose checksum holds but whose payload does not decode is
    /// skipped on its own.
    pub fn replay(&self) -> Result<Vec<WalEntry>> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut skipped = 0usize;

        loop {
            let frame = match EntityCodec::read_next(&mut reader) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "discarding torn WAL tail");
                    break;
                }
            };
            if let Err(e) = read_frame(&frame) {
                warn!(path = %self.path.display(), error = %e, "discarding corrupt WAL tail");
                break;
            }
            match self.codec.decode::<WalEntry>(&frame) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    skipped += 1;
                    warn!(path = %self.path.display(), error = %e, "skipping undecodable WAL entry");
                }
            }
        }

        debug!(entries = entries.len(), skipped, "replayed WAL");
        Ok(entries)
    }

    /// Replaces the log with one `Put` per live record.
    pub fn compact<'a>(&mut self, live: impl IntoIterator<Item = &'a Record>) -> Result<usize> {
        let tmp_path = self.path.with_extension("wal.tmp");
        let mut written = 0;
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for record in live {
                let frame = self.codec.encode(&WalEntry::Put(record.clone()))?;
                tmp.write_all(&frame)?;
                written += 1;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }

        self.file.flush()?;
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.file = BufWriter::new(file);
        Ok(written)
    }
}
