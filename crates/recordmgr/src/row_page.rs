//! Row-format page: a bitmap slot directory followed by fixed-length slots.
//!
//! Layout within [`storage::Page::payload`]: `{record_size: u32, slot_count:
//! u16, allocated_count: u16, bitmap: ceil(slot_count/8) bytes, slots...}`.

use common::{DbError, DbResult};
use storage::Page;

const HEADER_LEN: usize = 8;

fn bitmap_len(slot_count: u16) -> usize {
    (slot_count as usize).div_ceil(8)
}

fn slots_offset(slot_count: u16) -> usize {
    HEADER_LEN + bitmap_len(slot_count)
}

/// Greatest slot count that fits alongside its own bitmap and header.
fn max_slots_for(payload_len: usize, record_size: usize) -> u16 {
    let mut n = (payload_len.saturating_sub(HEADER_LEN)) / record_size.max(1);
    while n > 0 && HEADER_LEN + bitmap_len(n as u16) + n * record_size > payload_len {
        n -= 1;
    }
    n.min(u16::MAX as usize) as u16
}

pub struct RowPage;

impl RowPage {
    pub fn init(page: &mut Page, record_size: usize) -> DbResult<()> {
        if record_size == 0 {
            return Err(DbError::Storage("row page record size must be > 0".into()));
        }
        let slot_count = max_slots_for(page.payload().len(), record_size);
        if slot_count == 0 {
            return Err(DbError::Storage(
                "record size too large to fit any slot on a page".into(),
            ));
        }
        let payload = page.payload_mut();
        payload.fill(0);
        payload[0..4].copy_from_slice(&(record_size as u32).to_le_bytes());
        payload[4..6].copy_from_slice(&slot_count.to_le_bytes());
        payload[6..8].copy_from_slice(&0u16.to_le_bytes());
        Ok(())
    }

    pub fn record_size(page: &Page) -> usize {
        u32::from_le_bytes(page.payload()[0..4].try_into().unwrap()) as usize
    }

    pub fn slot_count(page: &Page) -> u16 {
        u16::from_le_bytes(page.payload()[4..6].try_into().unwrap())
    }

    fn allocated_count(page: &Page) -> u16 {
        u16::from_le_bytes(page.payload()[6..8].try_into().unwrap())
    }

    fn set_allocated_count(page: &mut Page, count: u16) {
        page.payload_mut()[6..8].copy_from_slice(&count.to_le_bytes());
    }

    pub fn is_full(page: &Page) -> bool {
        Self::allocated_count(page) >= Self::slot_count(page)
    }

    fn bit_is_set(page: &Page, slot: u16) -> bool {
        let byte = page.payload()[HEADER_LEN + (slot as usize) / 8];
        byte & (1 << (slot % 8)) != 0
    }

    fn set_bit(page: &mut Page, slot: u16, value: bool) {
        let idx = HEADER_LEN + (slot as usize) / 8;
        let mask = 1u8 << (slot % 8);
        let byte = &mut page.payload_mut()[idx];
        if value {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }

    fn slot_range(page: &Page, slot: u16) -> std::ops::Range<usize> {
        let record_size = Self::record_size(page);
        let start = slots_offset(Self::slot_count(page)) + slot as usize * record_size;
        start..start + record_size
    }

    /// Find a free slot, mark it occupied, and write `bytes`. Does not log;
    /// callers are responsible for WAL ordering.
    pub fn insert(page: &mut Page, bytes: &[u8]) -> DbResult<u16> {
        let record_size = Self::record_size(page);
        if bytes.len() != record_size {
            return Err(DbError::Storage(format!(
                "record is {} bytes, page slots are {record_size} bytes",
                bytes.len()
            )));
        }
        let slot_count = Self::slot_count(page);
        let free_slot = (0..slot_count).find(|&s| !Self::bit_is_set(page, s));
        let slot = free_slot.ok_or_else(|| DbError::Storage("row page is full".into()))?;
        let range = Self::slot_range(page, slot);
        page.payload_mut()[range].copy_from_slice(bytes);
        Self::set_bit(page, slot, true);
        Self::set_allocated_count(page, Self::allocated_count(page) + 1);
        Ok(slot)
    }

    /// Write `bytes` directly into `slot`, marking it occupied regardless of
    /// its prior state. Used by replay, which must apply entries
    /// idempotently at an exact slot.
    pub fn insert_at(page: &mut Page, slot: u16, bytes: &[u8]) -> DbResult<()> {
        let record_size = Self::record_size(page);
        if bytes.len() != record_size {
            return Err(DbError::Storage(format!(
                "record is {} bytes, page slots are {record_size} bytes",
                bytes.len()
            )));
        }
        let was_set = Self::bit_is_set(page, slot);
        let range = Self::slot_range(page, slot);
        page.payload_mut()[range].copy_from_slice(bytes);
        Self::set_bit(page, slot, true);
        if !was_set {
            Self::set_allocated_count(page, Self::allocated_count(page) + 1);
        }
        Ok(())
    }

    pub fn delete(page: &mut Page, slot: u16) -> DbResult<()> {
        if !Self::bit_is_set(page, slot) {
            return Err(DbError::RecordNotExist);
        }
        Self::set_bit(page, slot, false);
        Self::set_allocated_count(page, Self::allocated_count(page) - 1);
        Ok(())
    }

    pub fn update(page: &mut Page, slot: u16, bytes: &[u8]) -> DbResult<()> {
        if !Self::bit_is_set(page, slot) {
            return Err(DbError::RecordNotExist);
        }
        let record_size = Self::record_size(page);
        if bytes.len() != record_size {
            return Err(DbError::Storage(format!(
                "record is {} bytes, page slots are {record_size} bytes",
                bytes.len()
            )));
        }
        let range = Self::slot_range(page, slot);
        page.payload_mut()[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn get(page: &Page, slot: u16) -> DbResult<Vec<u8>> {
        if !Self::bit_is_set(page, slot) {
            return Err(DbError::RecordNotExist);
        }
        Ok(page.payload()[Self::slot_range(page, slot)].to_vec())
    }

    pub fn occupied_slots(page: &Page) -> Vec<u16> {
        (0..Self::slot_count(page))
            .filter(|&s| Self::bit_is_set(page, s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PageId;

    #[test]
    fn init_sizes_slots_to_fit_the_page() {
        let mut page = Page::new(PageId(1));
        RowPage::init(&mut page, 32).unwrap();
        assert!(RowPage::slot_count(&page) > 0);
        assert!(!RowPage::is_full(&page));
    }

    #[test]
    fn insert_get_delete_round_trip() {
        let mut page = Page::new(PageId(1));
        RowPage::init(&mut page, 8).unwrap();

        let slot = RowPage::insert(&mut page, &42u64.to_le_bytes()).unwrap();
        assert_eq!(RowPage::get(&page, slot).unwrap(), 42u64.to_le_bytes());

        RowPage::delete(&mut page, slot).unwrap();
        assert!(RowPage::get(&page, slot).is_err());
    }

    #[test]
    fn update_overwrites_in_place() {
        let mut page = Page::new(PageId(1));
        RowPage::init(&mut page, 8).unwrap();
        let slot = RowPage::insert(&mut page, &1u64.to_le_bytes()).unwrap();
        RowPage::update(&mut page, slot, &2u64.to_le_bytes()).unwrap();
        assert_eq!(RowPage::get(&page, slot).unwrap(), 2u64.to_le_bytes());
    }

    #[test]
    fn occupied_slots_skip_deleted_entries() {
        let mut page = Page::new(PageId(1));
        RowPage::init(&mut page, 8).unwrap();
        let s0 = RowPage::insert(&mut page, &1u64.to_le_bytes()).unwrap();
        let s1 = RowPage::insert(&mut page, &2u64.to_le_bytes()).unwrap();
        RowPage::delete(&mut page, s0).unwrap();
        assert_eq!(RowPage::occupied_slots(&page), vec![s1]);
    }

    #[test]
    fn insert_fails_once_the_page_is_full() {
        let mut page = Page::new(PageId(1));
        RowPage::init(&mut page, 8).unwrap();
        let total = RowPage::slot_count(&page);
        for _ in 0..total {
            RowPage::insert(&mut page, &0u64.to_le_bytes()).unwrap();
        }
        assert!(RowPage::is_full(&page));
        assert!(RowPage::insert(&mut page, &0u64.to_le_bytes()).is_err());
    }
}
