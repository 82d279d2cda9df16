//! The `Log` contract and its concrete byte-framed file implementation.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::record::Operation;
use crate::value::Idx;

/// The append-only, durable collaborator records are written to. Indices
/// are opaque; callers must not assume they are small consecutive
/// integers.
pub trait Log {
    /// Durably append `op`, returning its index.
    fn append(&mut self, op: &Operation) -> Result<Idx>;
    /// Retrieve the record at `idx`.
    fn get(&self, idx: Idx) -> Result<Operation>;
    /// The last record in the log and its index. Fails if the log is empty.
    fn top(&self) -> Result<(Idx, Operation)>;
    /// The index the next `append` will receive.
    fn next_idx(&self) -> Result<Idx>;
    /// Every record in append order, each paired with its index. Used by
    /// the raw `history` view, which (unlike `linear_history`) shows every
    /// record ever written, including undo/redo/rollback noise.
    fn entries(&self) -> Result<Vec<(Idx, Operation)>>;
}

const HEADER_PREFIX: &[u8] = b"json+len=";
const FOOTER_PREFIX: &[u8] = b"json-len=";
const HEX_LEN: usize = 16;
const HEADER_LEN: u64 = (HEADER_PREFIX.len() + HEX_LEN + PAD + 1) as u64; // 81
const FOOTER_LEN: u64 = (1 + FOOTER_PREFIX.len() + HEX_LEN + PAD + 1) as u64; // 82
const PAD: usize = 55;

fn encode_len(len: usize) -> String {
    format!("{:016x}", len)
}

fn decode_len(field: &[u8]) -> Result<usize> {
    let s = std::str::from_utf8(field)
        .map_err(|e| Error::Corruption(format!("non-utf8 length field: {}", e)))?;
    usize::from_str_radix(s, 16)
        .map_err(|e| Error::Corruption(format!("bad hex length field '{}': {}", s, e)))
}

fn build_header(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN as usize);
    out.extend_from_slice(HEADER_PREFIX);
    out.extend_from_slice(encode_len(len).as_bytes());
    out.extend(std::iter::repeat(b' ').take(PAD));
    out.push(b'\n');
    out
}

fn build_footer(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(FOOTER_LEN as usize);
    out.push(b'\n');
    out.extend_from_slice(FOOTER_PREFIX);
    out.extend_from_slice(encode_len(len).as_bytes());
    out.extend(std::iter::repeat(b' ').take(PAD));
    out.push(b'\n');
    out
}

/// A log backed by one append-only file. Each record is framed by an
/// 81-byte header and an 82-byte footer, both carrying the JSON body's
/// length; the footer lets `top()` find the last record by seeking
/// backward from end-of-file without scanning the whole log.
pub struct FileLog {
    path: PathBuf,
    file: File,
}

impl FileLog {
    /// Open (or create, if absent) a log file at `path`. A freshly created
    /// log is empty; callers must append the `commit-init` record
    /// themselves (see `OpLog::init`).
    pub fn open(path: impl Into<PathBuf>) -> Result<FileLog> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        Ok(FileLog { path, file })
    }

    /// Path this log is backed by.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_at(file: &mut File, start: u64, body_len: usize) -> Result<Operation> {
        file.seek(SeekFrom::Start(start))?;

        let mut header = vec![0u8; HEADER_LEN as usize];
        file.read_exact(&mut header)?;
        if &header[..HEADER_PREFIX.len()] != HEADER_PREFIX {
            return Err(Error::Corruption(format!(
                "bad header magic at offset {}",
                start
            )));
        }
        let header_len = decode_len(&header[HEADER_PREFIX.len()..HEADER_PREFIX.len() + HEX_LEN])?;

        let mut body = vec![0u8; header_len];
        file.read_exact(&mut body)?;

        let mut footer = vec![0u8; FOOTER_LEN as usize];
        file.read_exact(&mut footer)?;
        if &footer[1..1 + FOOTER_PREFIX.len()] != FOOTER_PREFIX {
            return Err(Error::Corruption(format!(
                "bad footer magic at offset {}",
                start
            )));
        }
        let footer_len = decode_len(&footer[1 + FOOTER_PREFIX.len()..1 + FOOTER_PREFIX.len() + HEX_LEN])?;
        if footer_len != header_len {
            return Err(Error::Corruption(format!(
                "header/footer length mismatch at offset {}: {} vs {}",
                start, header_len, footer_len
            )));
        }
        if body_len != 0 && body_len != header_len {
            return Err(Error::Corruption(format!(
                "declared body length {} does not match expected {}",
                header_len, body_len
            )));
        }

        let op: Operation = serde_json::from_slice(&body)?;
        Ok(op)
    }
}

impl Log for FileLog {
    fn append(&mut self, op: &Operation) -> Result<Idx> {
        let idx = self.file.seek(SeekFrom::End(0))?;
        let body = serde_json::to_vec(op)?;
        let mut record = build_header(body.len());
        record.extend_from_slice(&body);
        record.extend_from_slice(&build_footer(body.len()));
        self.file.write_all(&record)?;
        self.file.sync_data()?;
        Ok(idx)
    }

    fn get(&self, idx: Idx) -> Result<Operation> {
        let mut file = self.file.try_clone()?;
        Self::read_at(&mut file, idx, 0)
    }

    fn top(&self) -> Result<(Idx, Operation)> {
        let mut file = self.file.try_clone()?;
        let file_len = file.seek(SeekFrom::End(0))?;
        if file_len == 0 {
            return Err(Error::Corruption("log is empty".to_string()));
        }
        if file_len < FOOTER_LEN {
            return Err(Error::Corruption("log shorter than one footer".to_string()));
        }

        file.seek(SeekFrom::Start(file_len - FOOTER_LEN))?;
        let mut footer = vec![0u8; FOOTER_LEN as usize];
        file.read_exact(&mut footer)?;
        if &footer[1..1 + FOOTER_PREFIX.len()] != FOOTER_PREFIX {
            return Err(Error::Corruption("bad footer magic at tip".to_string()));
        }
        let body_len =
            decode_len(&footer[1 + FOOTER_PREFIX.len()..1 + FOOTER_PREFIX.len() + HEX_LEN])?;

        let record_len = HEADER_LEN + body_len as u64 + FOOTER_LEN;
        if record_len > file_len {
            return Err(Error::Corruption(
                "record length from footer exceeds file size".to_string(),
            ));
        }
        let start = file_len - record_len;
        let op = Self::read_at(&mut file, start, body_len)?;
        Ok((start, op))
    }

    fn next_idx(&self) -> Result<Idx> {
        let mut file = self.file.try_clone()?;
        Ok(file.seek(SeekFrom::End(0))?)
    }

    fn entries(&self) -> Result<Vec<(Idx, Operation)>> {
        let mut file = self.file.try_clone()?;
        let file_len = file.seek(SeekFrom::End(0))?;
        let mut out = Vec::new();
        let mut offset = 0u64;
        while offset < file_len {
            file.seek(SeekFrom::Start(offset))?;
            let mut header = vec![0u8; HEADER_LEN as usize];
            file.read_exact(&mut header)?;
            let body_len = decode_len(&header[HEADER_PREFIX.len()..HEADER_PREFIX.len() + HEX_LEN])?;
            let op = Self::read_at(&mut file, offset, body_len)?;
            out.push((offset, op));
            offset += HEADER_LEN + body_len as u64 + FOOTER_LEN;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let mut log = FileLog::open(dir.path().join("log")).unwrap();
        let op = Operation::init();
        let idx = log.append(&op).unwrap();
        assert_eq!(idx, 0);
        let back = log.get(idx).unwrap();
        assert_eq!(back.kind, op.kind);
        assert_eq!(back.n, op.n);
    }

    #[test]
    fn top_finds_last_record_after_several_appends() {
        let dir = tempdir().unwrap();
        let mut log = FileLog::open(dir.path().join("log")).unwrap();
        log.append(&Operation::init()).unwrap();

        let mut second = Operation::init();
        second.n = 1;
        second.description = "second".to_string();
        let idx2 = log.append(&second).unwrap();

        let (top_idx, top) = log.top().unwrap();
        assert_eq!(top_idx, idx2);
        assert_eq!(top.description, "second");
    }

    #[test]
    fn next_idx_matches_file_length() {
        let dir = tempdir().unwrap();
        let mut log = FileLog::open(dir.path().join("log")).unwrap();
        assert_eq!(log.next_idx().unwrap(), 0);
        log.append(&Operation::init()).unwrap();
        let after = log.next_idx().unwrap();
        assert!(after > 0);
        assert_eq!(after, log.file.metadata().unwrap().len());
    }

    #[test]
    fn reopening_an_existing_log_preserves_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        {
            let mut log = FileLog::open(&path).unwrap();
            log.append(&Operation::init()).unwrap();
        }
        let log = FileLog::open(&path).unwrap();
        let (idx, op) = log.top().unwrap();
        assert_eq!(idx, 0);
        assert_eq!(op.kind, crate::record::OpKind::CommitInit);
    }

    #[test]
    fn entries_enumerates_every_record_in_order() {
        let dir = tempdir().unwrap();
        let mut log = FileLog::open(dir.path().join("log")).unwrap();
        log.append(&Operation::init()).unwrap();
        let mut second = Operation::init();
        second.n = 1;
        second.description = "second".to_string();
        log.append(&second).unwrap();

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1.description, "init");
        assert_eq!(entries[1].1.description, "second");
    }

    #[test]
    fn corrupted_header_magic_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        {
            let mut log = FileLog::open(&path).unwrap();
            log.append(&Operation::init()).unwrap();
        }
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] = b'x';
        std::fs::write(&path, bytes).unwrap();

        let log = FileLog::open(&path).unwrap();
        let err = log.get(0).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }
}
