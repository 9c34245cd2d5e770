//! Block record and replay
//!
//! Every produced block is appended to the log as one JSON line:
//!
//! ```text
//! {"height":1,"time":1700000000000000000,"txs":["AAEC…"],"appHash":"q83v…"}
//! {"height":2,"time":1700000001000000000,"txs":[],"appHash":"…"}
//! {"height":3,"time":1700000002000000000,"txs":["…"],"appHash":""}   ← crash tail
//! ```
//!
//! Byte strings are base64. A record with an empty `appHash` was flushed while
//! its block was still executing, so its effects were never hash-verified.
//! Only one such tail per crash is expected.

use crate::driver::block_hash;
use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use consensus::{Application, RequestBeginBlock, RequestDeliverTx, RequestEndBlock};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// One block of the replay log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    /// Block height
    pub height: u64,
    /// Block time (unix nanoseconds)
    pub time: i64,
    /// Raw transactions in delivery order
    #[serde(with = "b64::list")]
    pub txs: Vec<Vec<u8>>,
    /// Commit hash, empty for an interrupted block
    #[serde(with = "b64::bytes", default)]
    pub app_hash: Vec<u8>,
}

impl BlockRecord {
    /// Open a record for a block
    pub fn new(height: u64, time: DateTime<Utc>) -> Self {
        Self {
            height,
            time: time.timestamp_nanos_opt().unwrap_or(i64::MAX),
            txs: Vec::new(),
            app_hash: Vec::new(),
        }
    }

    /// Block time
    pub fn block_time(&self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.time)
    }
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    pub mod bytes {
        use super::*;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &[u8], s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(&STANDARD.encode(value))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
            // A null hash is the same as an empty one
            match Option::<String>::deserialize(d)? {
                Some(s) => STANDARD.decode(s).map_err(serde::de::Error::custom),
                None => Ok(Vec::new()),
            }
        }
    }

    pub mod list {
        use super::*;
        use serde::ser::SerializeSeq;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
            let mut seq = s.serialize_seq(Some(value.len()))?;
            for item in value {
                seq.serialize_element(&STANDARD.encode(item))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<u8>>, D::Error> {
            Option::<Vec<String>>::deserialize(d)?
                .unwrap_or_default()
                .into_iter()
                .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
                .collect()
        }
    }
}

/// Outcome of a replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replayed {
    /// Last re-driven height
    pub height: u64,
    /// Time of that block
    pub time: DateTime<Utc>,
    /// Number of re-driven blocks
    pub blocks: u64,
}

/// Appends block records to the log and re-drives them on startup
#[derive(Debug)]
pub struct Replayer {
    path: PathBuf,
    file: Option<File>,
    current: Option<BlockRecord>,
}

impl Replayer {
    /// Open the log at `path`.
    ///
    /// With `replay` unset the log is truncated: a fresh recording never
    /// extends stale history. With `replay` set it is opened for appending.
    pub fn open(path: impl AsRef<Path>, replay: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        if replay {
            options.read(true).append(true).create(true);
        } else {
            options.write(true).create(true).truncate(true);
        }
        let file = options.open(&path)?;

        info!(path = %path.display(), replay, "opened replay log");
        Ok(Self {
            path,
            file: Some(file),
            current: None,
        })
    }

    /// Log location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a block is being recorded
    pub fn in_flight(&self) -> bool {
        self.current.is_some()
    }

    /// Start recording a block
    pub fn begin_block(&mut self, height: u64, time: DateTime<Utc>) {
        self.current = Some(BlockRecord::new(height, time));
    }

    /// Record a delivered transaction
    pub fn deliver_tx(&mut self, tx: &[u8]) {
        if let Some(record) = self.current.as_mut() {
            record.txs.push(tx.to_vec());
        }
    }

    /// Seal the current block with its commit hash and append it
    pub fn commit(&mut self, app_hash: &[u8]) -> Result<()> {
        match self.current.take() {
            Some(mut record) => {
                record.app_hash = app_hash.to_vec();
                self.write(&record)
            }
            None => Ok(()),
        }
    }

    fn write(&mut self, record: &BlockRecord) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    /// Append the in-flight block, if any, with an empty hash
    pub fn flush_tail(&mut self) -> Result<()> {
        if let Some(record) = self.current.take() {
            warn!(height = record.height, txs = record.txs.len(), "flushing interrupted block");
            self.write(&record)?;
        }
        Ok(())
    }

    /// Flush the tail and release the log
    pub fn close(&mut self) -> Result<()> {
        self.flush_tail()?;
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Re-drive the logged blocks from `next_height` on.
    ///
    /// Records below `next_height` are already part of the application state
    /// and are skipped. Each re-driven block must reproduce its recorded hash.
    /// Returns the last re-driven block, or `None` when nothing was replayed.
    pub fn replay_chain(
        &mut self,
        app: &dyn Application,
        next_height: u64,
        chain_id: &str,
    ) -> Result<Option<Replayed>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut last_seen = 0u64;
        let mut replayed: Option<Replayed> = None;

        info!(path = %self.path.display(), next_height, "replaying chain");

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: BlockRecord = serde_json::from_str(&line)?;
            last_seen = last_seen.max(record.height);

            if record.height < next_height {
                continue;
            }

            let time = record.block_time();
            app.begin_block(RequestBeginBlock {
                height: record.height,
                time,
                hash: block_hash(record.height, time),
                chain_id: chain_id.to_string(),
            });
            for tx in &record.txs {
                app.deliver_tx(RequestDeliverTx { tx: tx.clone() });
            }
            app.end_block(RequestEndBlock {
                height: record.height,
            });
            let commit = app.commit();

            if record.app_hash.is_empty() {
                warn!(
                    height = record.height,
                    "replayed interrupted block without recorded hash"
                );
            } else if record.app_hash != commit.data {
                error!(height = record.height, "state divergence during replay");
                return Err(Error::StateDivergence {
                    height: record.height,
                    expected: hex::encode(&record.app_hash),
                    actual: hex::encode(&commit.data),
                });
            }

            replayed = Some(Replayed {
                height: record.height,
                time,
                blocks: replayed.map_or(1, |r| r.blocks + 1),
            });
        }

        if last_seen + 1 < next_height {
            return Err(Error::InsufficientReplayData {
                last: last_seen,
                required: next_height - 1,
            });
        }

        match &replayed {
            Some(r) => info!(height = r.height, blocks = r.blocks, "replay finished"),
            None => info!("nothing to replay"),
        }
        Ok(replayed)
    }
}

impl Drop for Replayer {
    fn drop(&mut self) {
        if let Err(e) = self.flush_tail() {
            error!(error = %e, "failed to flush replay log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_record_format() {
        let mut record = BlockRecord::new(3, time(1));
        record.txs.push(vec![0, 1, 2]);
        record.app_hash = vec![0xab, 0xcd];

        let line = serde_json::to_string(&record).unwrap();
        assert_eq!(
            line,
            r#"{"height":3,"time":1000000000,"txs":["AAEC"],"appHash":"q80="}"#
        );
        assert_eq!(serde_json::from_str::<BlockRecord>(&line).unwrap(), record);
    }

    #[test]
    fn test_null_fields_decode_as_empty() {
        let record: BlockRecord =
            serde_json::from_str(r#"{"height":1,"time":0,"txs":null,"appHash":null}"#).unwrap();
        assert!(record.txs.is_empty());
        assert!(record.app_hash.is_empty());
    }

    #[test]
    fn test_commit_appends_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.ndjson");

        let mut replayer = Replayer::open(&path, false).unwrap();
        replayer.begin_block(1, time(1));
        replayer.deliver_tx(b"tx");
        assert!(replayer.in_flight());
        replayer.commit(b"hash").unwrap();
        assert!(!replayer.in_flight());
        replayer.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        let record: BlockRecord = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(record.txs, vec![b"tx".to_vec()]);
        assert_eq!(record.app_hash, b"hash".to_vec());
    }

    #[test]
    fn test_record_only_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.ndjson");
        std::fs::write(&path, "stale\n").unwrap();

        Replayer::open(&path, false).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().is_empty());

        std::fs::write(&path, "kept\n").unwrap();
        Replayer::open(&path, true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "kept\n");
    }

    #[test]
    fn test_drop_flushes_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.ndjson");

        {
            let mut replayer = Replayer::open(&path, false).unwrap();
            replayer.begin_block(7, time(7));
            replayer.deliver_tx(b"a");
        }

        let record: BlockRecord =
            serde_json::from_str(std::fs::read_to_string(&path).unwrap().trim()).unwrap();
        assert_eq!(record.height, 7);
        assert!(record.app_hash.is_empty());
    }
}
