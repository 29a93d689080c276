//! An on-disk, append-only, bitcask-style ordered engine.
//!
//! Grounded on the teacher's `kv::storage::log_cask::LogCask` and
//! `kv::storage::log::Log`: key/value pairs are appended to a single log
//! file, and a `BTreeMap` keydir in memory maps each live key to its most
//! recent position in the file. Deletes append a tombstone. The log is
//! replayed on open to rebuild the keydir; an incomplete entry at the end
//! of the file (a crash mid-write) is treated as the boundary of valid data
//! and the file is truncated to it.
//!
//! Compaction is not implemented: the distilled spec scopes the storage
//! engine's own internals out, and nothing in the document store above
//! this module depends on it. See DESIGN.md.

use crate::engine::{Engine, ScanItem};
use crate::error::CResult;
use fs4::FileExt;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::RangeBounds;
use std::path::{Path, PathBuf};

/// Maps a live key to its `(value_pos, value_len)` in the log file.
type KeyDir = BTreeMap<Vec<u8>, (u64, u32)>;

/// The append-only log file itself. Entry layout:
///
/// - key length as big-endian `u32`
/// - value length as big-endian `i32`, or `-1` for a tombstone
/// - key bytes
/// - value bytes (absent for tombstones)
struct Log {
    path: PathBuf,
    file: File,
}

impl Log {
    fn open(path: PathBuf) -> CResult<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = std::fs::OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        file.try_lock_exclusive()?;
        Ok(Self { path, file })
    }

    /// Replays the log from the start, rebuilding the keydir. Truncates a
    /// trailing incomplete entry rather than failing to open.
    fn build_keydir(&mut self) -> CResult<KeyDir> {
        let mut keydir = KeyDir::new();
        let file_len = self.file.metadata()?.len();
        let mut reader = BufReader::new(&mut self.file);
        let mut pos = reader.seek(SeekFrom::Start(0))?;

        while pos < file_len {
            match Self::read_entry_header(&mut reader, pos, file_len) {
                Ok((key, value_pos, Some(value_len))) => {
                    keydir.insert(key, (value_pos, value_len));
                    pos = value_pos + value_len as u64;
                }
                Ok((key, value_pos, None)) => {
                    keydir.remove(&key);
                    pos = value_pos;
                }
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::warn!(offset = pos, "truncating incomplete log entry");
                    self.file.set_len(pos)?;
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(keydir)
    }

    fn read_entry_header(
        reader: &mut BufReader<&mut File>,
        pos: u64,
        file_len: u64,
    ) -> std::io::Result<(Vec<u8>, u64, Option<u32>)> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let key_len = u32::from_be_bytes(len_buf);
        reader.read_exact(&mut len_buf)?;
        let value_len = match i32::from_be_bytes(len_buf) {
            l if l >= 0 => Some(l as u32),
            _ => None,
        };
        let value_pos = pos + 4 + 4 + key_len as u64;

        let mut key = vec![0; key_len as usize];
        reader.read_exact(&mut key)?;

        if let Some(len) = value_len {
            if value_pos + len as u64 > file_len {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "value extends beyond end of file",
                ));
            }
            reader.seek_relative(len as i64)?;
        }
        Ok((key, value_pos, value_len))
    }

    fn read_value(&mut self, value_pos: u64, value_len: u32) -> CResult<Vec<u8>> {
        let mut value = vec![0; value_len as usize];
        self.file.seek(SeekFrom::Start(value_pos))?;
        self.file.read_exact(&mut value)?;
        Ok(value)
    }

    /// Appends an entry (`value = None` for a tombstone) and returns the
    /// position and length of the *value* within the file.
    fn write_entry(&mut self, key: &[u8], value: Option<&[u8]>) -> CResult<(u64, u32)> {
        let key_len = key.len() as u32;
        let value_len = value.map_or(-1, |v| v.len() as i32);
        let pos = self.file.seek(SeekFrom::End(0))?;
        let header_len = 4 + 4 + key_len as u64;

        let mut writer = BufWriter::new(&mut self.file);
        writer.write_all(&key_len.to_be_bytes())?;
        writer.write_all(&value_len.to_be_bytes())?;
        writer.write_all(key)?;
        if let Some(value) = value {
            writer.write_all(value)?;
        }
        writer.flush()?;

        let value_pos = pos + header_len;
        Ok((value_pos, value.map_or(0, |v| v.len() as u32)))
    }
}

pub struct LogEngine {
    log: Log,
    keydir: KeyDir,
}

impl LogEngine {
    pub fn open(path: impl AsRef<Path>) -> CResult<Self> {
        let mut log = Log::open(path.as_ref().to_path_buf())?;
        let keydir = log.build_keydir()?;
        Ok(Self { log, keydir })
    }
}

impl Engine for LogEngine {
    type ScanIterator<'a> = LogScanIterator<'a>;

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()> {
        let (value_pos, value_len) = self.log.write_entry(key, Some(&value))?;
        self.keydir.insert(key.to_vec(), (value_pos, value_len));
        Ok(())
    }

    fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        match self.keydir.get(key) {
            Some((pos, len)) => Ok(Some(self.log.read_value(*pos, *len)?)),
            None => Ok(None),
        }
    }

    fn delete(&mut self, key: &[u8]) -> CResult<()> {
        self.log.write_entry(key, None)?;
        self.keydir.remove(key);
        Ok(())
    }

    fn scan(&mut self, range: impl RangeBounds<Vec<u8>>) -> Self::ScanIterator<'_> {
        LogScanIterator { inner: self.keydir.range(range), log: &mut self.log }
    }

    fn flush(&mut self) -> CResult<()> {
        Ok(self.log.file.sync_all()?)
    }
}

impl Drop for LogEngine {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            tracing::error!(error = %err, "failed to flush log engine on drop");
        }
    }
}

pub struct LogScanIterator<'a> {
    inner: std::collections::btree_map::Range<'a, Vec<u8>, (u64, u32)>,
    log: &'a mut Log,
}

impl<'a> LogScanIterator<'a> {
    fn map(&mut self, item: (&Vec<u8>, &(u64, u32))) -> ScanItem {
        let (key, (pos, len)) = item;
        Ok((key.clone(), self.log.read_value(*pos, *len)?))
    }
}

impl<'a> Iterator for LogScanIterator<'a> {
    type Item = ScanItem;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|item| self.map(item))
    }
}

impl<'a> DoubleEndedIterator for LogScanIterator<'a> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|item| self.map(item))
    }
}
