//! PAX (partition-attributes-across) page: column-major layout within one
//! page. Each field occupies a contiguous `slot_count * field_width` region;
//! a single slot bitmap (not per-column) tracks occupancy, same as row pages.
//!
//! Layout within [`storage::Page::payload`]: `{slot_count: u16,
//! allocated_count: u16, field_count: u16, field_widths: [u16; field_count],
//! bitmap: ceil(slot_count/8) bytes, column_0, column_1, ...}`.

use common::{DbError, DbResult};
use storage::Page;

const FIXED_HEADER_LEN: usize = 6;

fn field_widths(page: &Page) -> Vec<usize> {
    let field_count = field_count(page);
    let base = FIXED_HEADER_LEN;
    (0..field_count)
        .map(|i| {
            let off = base + i * 2;
            u16::from_le_bytes(page.payload()[off..off + 2].try_into().unwrap()) as usize
        })
        .collect()
}

fn field_count(page: &Page) -> usize {
    u16::from_le_bytes(page.payload()[4..6].try_into().unwrap()) as usize
}

fn bitmap_len(slot_count: u16) -> usize {
    (slot_count as usize).div_ceil(8)
}

fn header_len(field_count: usize) -> usize {
    FIXED_HEADER_LEN + field_count * 2
}

fn bitmap_offset(field_count: usize) -> usize {
    header_len(field_count)
}

fn columns_offset(field_count: usize, slot_count: u16) -> usize {
    bitmap_offset(field_count) + bitmap_len(slot_count)
}

fn max_slots_for(payload_len: usize, widths: &[usize]) -> u16 {
    let fixed = header_len(widths.len());
    let row_width: usize = widths.iter().sum();
    if row_width == 0 {
        return 0;
    }
    let mut n = (payload_len.saturating_sub(fixed)) / row_width.max(1);
    while n > 0 && fixed + bitmap_len(n as u16) + n * row_width > payload_len {
        n -= 1;
    }
    n.min(u16::MAX as usize) as u16
}

pub struct PaxPage;

impl PaxPage {
    pub fn init(page: &mut Page, widths: &[usize]) -> DbResult<()> {
        if widths.is_empty() {
            return Err(DbError::Storage("pax page needs at least one field".into()));
        }
        if widths.len() > u16::MAX as usize {
            return Err(DbError::Storage("too many fields for a pax page".into()));
        }
        let slot_count = max_slots_for(page.payload().len(), widths);
        if slot_count == 0 {
            return Err(DbError::Storage(
                "fields too wide to fit any slot on a pax page".into(),
            ));
        }
        let payload = page.payload_mut();
        payload.fill(0);
        payload[0..2].copy_from_slice(&slot_count.to_le_bytes());
        payload[2..4].copy_from_slice(&0u16.to_le_bytes());
        payload[4..6].copy_from_slice(&(widths.len() as u16).to_le_bytes());
        for (i, &w) in widths.iter().enumerate() {
            let off = FIXED_HEADER_LEN + i * 2;
            payload[off..off + 2].copy_from_slice(&(w as u16).to_le_bytes());
        }
        Ok(())
    }

    pub fn slot_count(page: &Page) -> u16 {
        u16::from_le_bytes(page.payload()[0..2].try_into().unwrap())
    }

    fn allocated_count(page: &Page) -> u16 {
        u16::from_le_bytes(page.payload()[2..4].try_into().unwrap())
    }

    fn set_allocated_count(page: &mut Page, count: u16) {
        page.payload_mut()[2..4].copy_from_slice(&count.to_le_bytes());
    }

    pub fn is_full(page: &Page) -> bool {
        Self::allocated_count(page) >= Self::slot_count(page)
    }

    fn bit_is_set(page: &Page, field_count: usize, slot: u16) -> bool {
        let byte = page.payload()[bitmap_offset(field_count) + slot as usize / 8];
        byte & (1 << (slot % 8)) != 0
    }

    fn set_bit(page: &mut Page, field_count: usize, slot: u16, value: bool) {
        let idx = bitmap_offset(field_count) + slot as usize / 8;
        let mask = 1u8 << (slot % 8);
        let byte = &mut page.payload_mut()[idx];
        if value {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }

    fn field_range(page: &Page, field_idx: usize, slot: u16) -> std::ops::Range<usize> {
        let fc = field_count(page);
        let widths = field_widths(page);
        let slot_count = Self::slot_count(page);
        let col_start = columns_offset(fc, slot_count)
            + widths[..field_idx].iter().sum::<usize>() * slot_count as usize;
        let start = col_start + slot as usize * widths[field_idx];
        start..start + widths[field_idx]
    }

    /// Insert one row (a byte slice per field, in field order) into the
    /// first free slot. Does not log.
    pub fn insert(page: &mut Page, fields: &[Vec<u8>]) -> DbResult<u16> {
        let fc = field_count(page);
        if fields.len() != fc {
            return Err(DbError::Storage(format!(
                "expected {fc} fields, got {}",
                fields.len()
            )));
        }
        let slot_count = Self::slot_count(page);
        let slot = (0..slot_count)
            .find(|&s| !Self::bit_is_set(page, fc, s))
            .ok_or_else(|| DbError::Storage("pax page is full".into()))?;
        for (i, bytes) in fields.iter().enumerate() {
            let range = Self::field_range(page, i, slot);
            if bytes.len() != range.len() {
                return Err(DbError::Storage(format!(
                    "field {i} is {} bytes, column width is {}",
                    bytes.len(),
                    range.len()
                )));
            }
            page.payload_mut()[range].copy_from_slice(bytes);
        }
        Self::set_bit(page, fc, slot, true);
        Self::set_allocated_count(page, Self::allocated_count(page) + 1);
        Ok(slot)
    }

    /// Write `fields` directly into `slot`, marking it occupied regardless
    /// of its prior state. Used by replay.
    pub fn insert_at(page: &mut Page, slot: u16, fields: &[Vec<u8>]) -> DbResult<()> {
        let fc = field_count(page);
        if fields.len() != fc {
            return Err(DbError::Storage(format!(
                "expected {fc} fields, got {}",
                fields.len()
            )));
        }
        let was_set = Self::bit_is_set(page, fc, slot);
        for (i, bytes) in fields.iter().enumerate() {
            let range = Self::field_range(page, i, slot);
            if bytes.len() != range.len() {
                return Err(DbError::Storage(format!(
                    "field {i} is {} bytes, column width is {}",
                    bytes.len(),
                    range.len()
                )));
            }
            page.payload_mut()[range].copy_from_slice(bytes);
        }
        Self::set_bit(page, fc, slot, true);
        if !was_set {
            Self::set_allocated_count(page, Self::allocated_count(page) + 1);
        }
        Ok(())
    }

    pub fn delete(page: &mut Page, slot: u16) -> DbResult<()> {
        let fc = field_count(page);
        if !Self::bit_is_set(page, fc, slot) {
            return Err(DbError::RecordNotExist);
        }
        Self::set_bit(page, fc, slot, false);
        Self::set_allocated_count(page, Self::allocated_count(page) - 1);
        Ok(())
    }

    pub fn get_row(page: &Page, slot: u16) -> DbResult<Vec<Vec<u8>>> {
        let fc = field_count(page);
        if !Self::bit_is_set(page, fc, slot) {
            return Err(DbError::RecordNotExist);
        }
        Ok((0..fc)
            .map(|i| page.payload()[Self::field_range(page, i, slot)].to_vec())
            .collect())
    }

    pub fn update(page: &mut Page, slot: u16, fields: &[Vec<u8>]) -> DbResult<()> {
        let fc = field_count(page);
        if !Self::bit_is_set(page, fc, slot) {
            return Err(DbError::RecordNotExist);
        }
        for (i, bytes) in fields.iter().enumerate() {
            let range = Self::field_range(page, i, slot);
            page.payload_mut()[range].copy_from_slice(bytes);
        }
        Ok(())
    }

    pub fn occupied_slots(page: &Page) -> Vec<u16> {
        let fc = field_count(page);
        (0..Self::slot_count(page))
            .filter(|&s| Self::bit_is_set(page, fc, s))
            .collect()
    }

    /// The full contiguous byte region for one column, covering every slot
    /// (including unoccupied ones) — callers filter with [`PaxPage::occupied_slots`].
    pub fn column_chunk<'a>(page: &'a Page, field_idx: usize) -> &'a [u8] {
        let fc = field_count(page);
        let widths = field_widths(page);
        let slot_count = Self::slot_count(page);
        let col_start = columns_offset(fc, slot_count)
            + widths[..field_idx].iter().sum::<usize>() * slot_count as usize;
        &page.payload()[col_start..col_start + widths[field_idx] * slot_count as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PageId;

    fn sample_page() -> Page {
        let mut page = Page::new(PageId(1));
        PaxPage::init(&mut page, &[9, 17]).unwrap();
        page
    }

    #[test]
    fn insert_get_delete_round_trip() {
        let mut page = sample_page();
        let slot = PaxPage::insert(&mut page, &[vec![0; 9], vec![1; 17]]).unwrap();
        let row = PaxPage::get_row(&page, slot).unwrap();
        assert_eq!(row[0], vec![0; 9]);
        assert_eq!(row[1], vec![1; 17]);

        PaxPage::delete(&mut page, slot).unwrap();
        assert!(PaxPage::get_row(&page, slot).is_err());
    }

    #[test]
    fn column_chunk_is_contiguous_across_slots() {
        let mut page = sample_page();
        let total_slots = PaxPage::slot_count(&page);
        for i in 0..total_slots.min(3) {
            let mut field0 = vec![0u8; 9];
            field0[0] = i as u8 + 1;
            PaxPage::insert(&mut page, &[field0, vec![0; 17]]).unwrap();
        }
        let chunk = PaxPage::column_chunk(&page, 0);
        assert_eq!(chunk.len(), 9 * total_slots as usize);
        assert_eq!(chunk[0], 1);
        assert_eq!(chunk[9], 2);
    }

    #[test]
    fn occupied_slots_skip_deleted_entries() {
        let mut page = sample_page();
        let s0 = PaxPage::insert(&mut page, &[vec![0; 9], vec![0; 17]]).unwrap();
        let s1 = PaxPage::insert(&mut page, &[vec![0; 9], vec![0; 17]]).unwrap();
        PaxPage::delete(&mut page, s0).unwrap();
        assert_eq!(PaxPage::occupied_slots(&page), vec![s1]);
    }
}
