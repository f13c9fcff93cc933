use common::{DbError, DbResult};

use crate::module::LogModule;

/// Fixed-size framing fields that precede every entry's payload on disk.
pub const LOG_HEADER_SIZE: usize = 8 + 4 + 1;
/// Trailing checksum, covering the header and payload.
pub const LOG_TRAILER_SIZE: usize = 4;
/// Upper bound on a single entry's total framed size.
pub const MAX_LOG_ENTRY_SIZE: usize = 4 * 1024 * 1024;
/// Upper bound on a single entry's payload, header and trailer excluded.
pub const MAX_LOG_PAYLOAD_SIZE: usize = MAX_LOG_ENTRY_SIZE - LOG_HEADER_SIZE - LOG_TRAILER_SIZE;

/// A single record in the write-ahead log: an LSN, the module that produced
/// it, and an opaque payload only that module knows how to interpret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub lsn: u64,
    pub module: LogModule,
    pub payload: Vec<u8>,
}

impl LogEntry {
    pub fn new(lsn: u64, module: LogModule, payload: Vec<u8>) -> DbResult<Self> {
        if payload.len() > MAX_LOG_PAYLOAD_SIZE {
            return Err(DbError::Wal(format!(
                "log entry payload of {} bytes exceeds the {} byte limit",
                payload.len(),
                MAX_LOG_PAYLOAD_SIZE
            )));
        }
        Ok(Self { lsn, module, payload })
    }

    /// Serialize into the on-disk framed representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(LOG_HEADER_SIZE + self.payload.len() + LOG_TRAILER_SIZE);
        buf.extend_from_slice(&self.lsn.to_le_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.push(self.module.id());
        buf.extend_from_slice(&self.payload);
        let checksum = crc32fast::hash(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Decode one frame from the front of `bytes`, returning the entry and
    /// the number of bytes consumed. Returns `Ok(None)` when `bytes` holds
    /// fewer bytes than a complete frame (a torn final entry left behind by
    /// an unclean shutdown, which recovery should stop at, not reject).
    pub fn decode(bytes: &[u8]) -> DbResult<Option<(Self, usize)>> {
        if bytes.len() < LOG_HEADER_SIZE {
            return Ok(None);
        }
        let lsn = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let size = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let module_id = bytes[12];
        let total = LOG_HEADER_SIZE + size + LOG_TRAILER_SIZE;
        if bytes.len() < total {
            return Ok(None);
        }
        let module = LogModule::from_id(module_id)
            .ok_or_else(|| DbError::Wal(format!("unknown log module id {module_id}")))?;
        let payload = bytes[LOG_HEADER_SIZE..LOG_HEADER_SIZE + size].to_vec();
        let stored_checksum =
            u32::from_le_bytes(bytes[LOG_HEADER_SIZE + size..total].try_into().unwrap());
        let actual_checksum = crc32fast::hash(&bytes[..LOG_HEADER_SIZE + size]);
        if stored_checksum != actual_checksum {
            return Err(DbError::Wal(format!(
                "log entry at lsn {lsn} failed checksum verification"
            )));
        }
        Ok(Some((Self { lsn, module, payload }, total)))
    }
}
