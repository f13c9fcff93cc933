//! The index header page: root pointer and key-shape metadata, stored as
//! page 1 of every index file (page 0 is the buffer-pool file's own
//! allocation bitmap header).

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_to_vec};
use common::{DbError, DbResult, PageId};
use serde::{Deserialize, Serialize};
use storage::Page;
use types::SqlType;

pub const HEADER_PAGE_NUM: u64 = 1;

fn bincode_config() -> impl Config {
    config::legacy()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexHeader {
    pub root_page_num: u64,
    pub key_type: SqlType,
    pub key_len: u32,
    pub internal_max_size: u16,
    pub leaf_max_size: u16,
}

impl IndexHeader {
    pub fn encode(&self) -> DbResult<Vec<u8>> {
        encode_to_vec(self, bincode_config())
            .map_err(|e| DbError::Storage(format!("failed to encode index header: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> DbResult<Self> {
        let (header, _): (Self, usize) = decode_from_slice(bytes, bincode_config())
            .map_err(|e| DbError::Storage(format!("failed to decode index header: {e}")))?;
        Ok(header)
    }

    pub fn root_page_id(&self) -> PageId {
        PageId(self.root_page_num)
    }
}

pub fn read_header(page: &Page) -> DbResult<IndexHeader> {
    IndexHeader::decode(page.payload())
}

pub fn write_header(page: &mut Page, header: &IndexHeader) -> DbResult<()> {
    let bytes = header.encode()?;
    page.payload_mut()[..bytes.len()].copy_from_slice(&bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = IndexHeader {
            root_page_num: 2,
            key_type: SqlType::Int,
            key_len: 0,
            internal_max_size: 64,
            leaf_max_size: 64,
        };
        let bytes = header.encode().unwrap();
        let back = IndexHeader::decode(&bytes).unwrap();
        assert_eq!(back.root_page_num, 2);
        assert_eq!(back.root_page_id(), PageId(2));
    }
}
