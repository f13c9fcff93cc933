//! Fixed-size pages: the unit of I/O between the buffer pool and disk.
//!
//! A page carries a small fixed header (page number, LSN, checksum) ahead of
//! its payload. The header lets recovery tell which log records a page has
//! already absorbed (`lsn`) and lets the double-write buffer detect a torn
//! write (`checksum`) without understanding what the payload holds.

use common::PageId;

/// Total on-disk size of a page, header included.
pub const PAGE_SIZE: usize = 8192;

const PAGE_NUM_OFFSET: usize = 0;
const LSN_OFFSET: usize = 4;
const CHECKSUM_OFFSET: usize = 12;

/// Size of the fixed header every page carries ahead of its payload.
pub const PAGE_HEADER_SIZE: usize = 16;

/// Number of payload bytes available to the record manager or B+tree once
/// the fixed header is accounted for.
pub const PAGE_PAYLOAD_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

/// A single fixed-size page, as held resident by a buffer-pool frame or
/// staged in the double-write buffer.
#[derive(Clone)]
pub struct Page {
    pub id: PageId,
    data: Box<[u8]>,
}

impl Page {
    /// Build a zeroed page stamped with the given id.
    pub fn new(id: PageId) -> Self {
        let mut page = Self {
            id,
            data: vec![0u8; PAGE_SIZE].into_boxed_slice(),
        };
        page.data[PAGE_NUM_OFFSET..PAGE_NUM_OFFSET + 4]
            .copy_from_slice(&(id.0 as u32).to_le_bytes());
        page
    }

    /// Wrap raw bytes read from disk into a `Page`. `id` is supplied by the
    /// caller (derived from the page's offset in its file) rather than
    /// trusted from the header, since a torn or stale write could disagree.
    pub fn from_bytes(id: PageId, data: [u8; PAGE_SIZE]) -> Self {
        Self {
            id,
            data: Box::new(data),
        }
    }

    pub fn lsn(&self) -> u64 {
        u64::from_le_bytes(self.data[LSN_OFFSET..LSN_OFFSET + 8].try_into().unwrap())
    }

    pub fn set_lsn(&mut self, lsn: u64) {
        self.data[LSN_OFFSET..LSN_OFFSET + 8].copy_from_slice(&lsn.to_le_bytes());
    }

    pub fn checksum(&self) -> u32 {
        u32::from_le_bytes(
            self.data[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    /// Recompute and store the checksum over the payload region. Must be
    /// called before a page is handed to the double-write buffer or flushed
    /// to its home location.
    pub fn recompute_checksum(&mut self) {
        let sum = crc32fast::hash(&self.data[PAGE_HEADER_SIZE..]);
        self.data[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&sum.to_le_bytes());
    }

    /// Returns whether the stored checksum matches the payload's actual
    /// contents. A mismatch means the page was torn by a crash mid-write.
    pub fn verify_checksum(&self) -> bool {
        crc32fast::hash(&self.data[PAGE_HEADER_SIZE..]) == self.checksum()
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[PAGE_HEADER_SIZE..]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data[PAGE_HEADER_SIZE..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.id)
            .field("lsn", &self.lsn())
            .field("checksum", &self.checksum())
            .finish()
    }
}
