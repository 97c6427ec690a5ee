//! Template library views: search hits and occupancy pages

use std::fmt;

use byteorder::{BigEndian, ByteOrder};

use fprust_core::constants::{INDEX_PAGE_BYTES, INDEX_PAGE_SLOTS};

use crate::error::{Error, Result};

/// Library slot that matched a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchMatch {
    /// Matching slot
    pub slot: u16,

    /// Match score reported by the sensor
    pub score: u16,
}

impl SearchMatch {
    /// Parse the `[slot:2][score:2]` payload of a Search acknowledgement
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < 4 {
            return Err(Error::Parse(format!(
                "search result needs 4 bytes, got {}",
                payload.len()
            )));
        }

        Ok(Self {
            slot: BigEndian::read_u16(&payload[0..2]),
            score: BigEndian::read_u16(&payload[2..4]),
        })
    }
}

impl fmt::Display for SearchMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {} (score {})", self.slot, self.score)
    }
}

/// Occupancy bitmap for one 256-slot page of the library
///
/// Bit `i` of byte `j` set means slot `page * 256 + j * 8 + i` holds a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexTable {
    /// Page number
    pub page: u8,

    bits: [u8; INDEX_PAGE_BYTES],
}

impl IndexTable {
    /// Parse the 32-byte payload of a ReadIndexTable acknowledgement
    pub fn parse(page: u8, payload: &[u8]) -> Result<Self> {
        let bits: [u8; INDEX_PAGE_BYTES] = payload
            .get(..INDEX_PAGE_BYTES)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                Error::Parse(format!(
                    "index table needs {} bytes, got {}",
                    INDEX_PAGE_BYTES,
                    payload.len()
                ))
            })?;

        Ok(Self { page, bits })
    }

    /// First slot covered by this page
    pub fn first_slot(&self) -> u16 {
        u16::from(self.page) * INDEX_PAGE_SLOTS
    }

    /// Check whether `slot` is in use; slots on other pages report `false`
    pub fn is_occupied(&self, slot: u16) -> bool {
        let Some(offset) = slot.checked_sub(self.first_slot()) else {
            return false;
        };
        if offset >= INDEX_PAGE_SLOTS {
            return false;
        }

        let byte = self.bits[usize::from(offset / 8)];
        byte & (1 << (offset % 8)) != 0
    }

    /// Occupied slots in ascending order
    pub fn occupied(&self) -> impl Iterator<Item = u16> + '_ {
        let first = self.first_slot();
        (0..INDEX_PAGE_SLOTS)
            .filter(move |&offset| self.is_occupied(first + offset))
            .map(move |offset| first + offset)
    }

    /// Number of occupied slots on this page
    pub fn count(&self) -> u32 {
        self.bits.iter().map(|b| b.count_ones()).sum()
    }

    /// Lowest free slot on this page below `capacity`
    pub fn first_free(&self, capacity: u16) -> Option<u16> {
        let first = self.first_slot();
        (0..INDEX_PAGE_SLOTS)
            .map(|offset| first + offset)
            .take_while(|&slot| slot < capacity)
            .find(|&slot| !self.is_occupied(slot))
    }
}
