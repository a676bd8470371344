//! File-backed topics.
//!
//! Each topic is an append-only JSON-lines file under the bus directory,
//! one record per line. A record's offset is its position among the
//! non-blank lines (0-based). Appends are fsynced before the offset is
//! handed back.
//!
//! Opening a topic indexes the byte position of every record. A torn
//! record at the end of the file, left by a crash mid-append, is cut off.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use graphsync_core::{BusMessage, Headers, OutboundMessage};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{BoxFuture, BusError, Publisher, Result, TopicSource};

/// On-disk record.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    offset: u64,
    headers: Headers,
    body: String,
}

/// One topic log.
#[derive(Debug)]
pub struct FileTopic {
    name: String,
    path: PathBuf,
    file: File,
    /// Byte position of each record; index is the offset.
    starts: Vec<u64>,
    /// Length of the intact part of the file.
    len: u64,
}

impl FileTopic {
    /// Open or create the log for `name` under `dir`.
    pub fn open(dir: &Path, name: &str) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.log", sanitize_topic(name)));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let (starts, len) = index_records(&path, name)?;

        let on_disk = file.metadata()?.len();
        if on_disk > len {
            tracing::warn!(
                topic = %name,
                path = %path.display(),
                dropped_bytes = on_disk - len,
                "Truncating torn record at end of topic"
            );
            file.set_len(len)?;
            file.sync_all()?;
        }

        tracing::debug!(topic = %name, path = %path.display(), next_offset = starts.len(), "Topic opened");
        Ok(Self {
            name: name.to_string(),
            path,
            file,
            starts,
            len,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn end_offset(&self) -> u64 {
        self.starts.len() as u64
    }

    pub fn append(&mut self, headers: Headers, body: Vec<u8>) -> Result<u64> {
        let body = String::from_utf8(body).map_err(|_| BusError::NonUtf8Body {
            topic: self.name.clone(),
        })?;
        let offset = self.end_offset();
        let mut line = serde_json::to_vec(&Record {
            offset,
            headers,
            body,
        })?;
        line.push(b'\n');

        if let Err(e) = self.write_durably(&line) {
            // Drop whatever part of the record reached the file.
            if let Err(trunc) = self.file.set_len(self.len) {
                tracing::error!(topic = %self.name, error = %trunc, "Failed to cut back partial append");
            }
            return Err(e.into());
        }
        self.starts.push(self.len);
        self.len += line.len() as u64;
        Ok(offset)
    }

    fn write_durably(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line)?;
        self.file.flush()?;
        self.file.sync_data()
    }

    pub fn read_from(&self, from: u64, max: usize) -> Result<Vec<BusMessage>> {
        let Some(&start) = self.starts.get(from as usize) else {
            return Ok(Vec::new());
        };
        let wanted = max.min(self.starts.len() - from as usize);

        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(start))?;

        let mut messages = Vec::with_capacity(wanted);
        let mut line = String::new();
        while messages.len() < wanted {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            let offset = from + messages.len() as u64;
            let record: Record = serde_json::from_str(&line).map_err(|e| BusError::Corrupt {
                topic: self.name.clone(),
                offset,
                message: e.to_string(),
            })?;
            messages.push(BusMessage {
                topic: self.name.clone(),
                offset: record.offset,
                headers: record.headers,
                body: record.body.into_bytes(),
            });
        }
        Ok(messages)
    }
}

/// Record start positions and the length of the intact prefix.
///
/// Blank lines are skipped. A final line that is unterminated or does not
/// parse ends the intact prefix; an unparsable line anywhere else is
/// corruption.
fn index_records(path: &Path, topic: &str) -> Result<(Vec<u64>, u64)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut starts = Vec::new();
    let mut pos = 0u64;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 || buf.last() != Some(&b'\n') {
            break;
        }
        if buf.iter().all(u8::is_ascii_whitespace) {
            pos += n as u64;
            continue;
        }
        if let Err(e) = serde_json::from_slice::<Record>(&buf) {
            if reader.fill_buf()?.is_empty() {
                break;
            }
            return Err(BusError::Corrupt {
                topic: topic.to_string(),
                offset: starts.len() as u64,
                message: e.to_string(),
            });
        }
        starts.push(pos);
        pos += n as u64;
    }
    Ok((starts, pos))
}

fn sanitize_topic(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

/// A directory of file-backed topics.
#[derive(Debug)]
pub struct FileBus {
    dir: PathBuf,
    topics: Mutex<HashMap<String, FileTopic>>,
}

impl FileBus {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::info!(dir = %dir.display(), "File bus opened");
        Ok(Self {
            dir,
            topics: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn with_topic<T>(&self, topic: &str, f: impl FnOnce(&mut FileTopic) -> Result<T>) -> Result<T> {
        let mut topics = self.topics.lock();
        if !topics.contains_key(topic) {
            let opened = FileTopic::open(&self.dir, topic)?;
            topics.insert(topic.to_string(), opened);
        }
        match topics.get_mut(topic) {
            Some(log) => f(log),
            None => Err(BusError::Unavailable(format!("topic {topic} not open"))),
        }
    }

    pub fn append(&self, message: OutboundMessage) -> Result<u64> {
        let offset = self.with_topic(&message.topic, |log| {
            log.append(message.headers, message.body)
        })?;
        tracing::debug!(topic = %message.topic, offset, "Message appended");
        Ok(offset)
    }
}

impl Publisher for FileBus {
    fn publish<'a>(&'a self, message: OutboundMessage) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move { self.append(message) })
    }
}

impl TopicSource for FileBus {
    fn fetch(&self, topic: &str, from: u64, max: usize) -> Result<Vec<BusMessage>> {
        self.with_topic(topic, |log| log.read_from(from, max))
    }

    fn end_offset(&self, topic: &str) -> Result<u64> {
        self.with_topic(topic, |log| Ok(log.end_offset()))
    }
}
