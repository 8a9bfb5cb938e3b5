//! Shadow-bitmap store (C1): three bitmaps summarizing what the walk
//! actually found, built incrementally during the traversal and compared
//! against on-disk metadata by the global reconciler (C9).

use std::collections::HashMap;

use crate::fault::{Domain, FaultCode, FaultLog};
use crate::layout::SegType;

fn bit_vec(len: usize) -> Vec<u8> {
    vec![0u8; len.div_ceil(8)]
}

fn test_bit(bits: &[u8], i: usize) -> bool {
    bits[i / 8] & (1 << (i % 8)) != 0
}

fn set_bit(bits: &mut [u8], i: usize) {
    bits[i / 8] |= 1 << (i % 8);
}

fn clear_bit(bits: &mut [u8], i: usize) {
    bits[i / 8] &= !(1 << (i % 8));
}

pub struct ShadowBitmaps {
    blocks_per_seg: u32,
    main_blkaddr: u32,
    main_bitmap: Vec<u8>,
    nat_bitmap: Vec<u8>,
    /// Loaded once from SIT; read-only reference for the walk.
    sit_bitmap: Vec<u8>,
    main_block_count: usize,
    nat_entry_count: usize,
    /// The type the walk has observed for each segment so far, used to
    /// detect a disagreement on the node-vs-data axis and to drive C10's
    /// rewrite of the SIT type field.
    observed_seg_type: HashMap<u32, SegType>,
}

impl ShadowBitmaps {
    pub fn new(blocks_per_seg: u32, main_blkaddr: u32, main_block_count: usize, nat_entry_count: usize) -> Self {
        ShadowBitmaps {
            blocks_per_seg,
            main_blkaddr,
            main_bitmap: bit_vec(main_block_count),
            nat_bitmap: bit_vec(nat_entry_count),
            sit_bitmap: bit_vec(main_block_count),
            main_block_count,
            nat_entry_count,
            observed_seg_type: HashMap::new(),
        }
    }

    /// Seeds the NAT shadow bitmap: every nid known to NAT starts "set"
    /// (unreached); the walk clears bits as it reaches each nid.
    pub fn seed_nat(&mut self, known_nids: impl IntoIterator<Item = u32>) {
        for nid in known_nids {
            if (nid as usize) < self.nat_entry_count {
                set_bit(&mut self.nat_bitmap, nid as usize);
            }
        }
    }

    /// Seeds the SIT reference bitmap for segment `segno` from its
    /// `cur_valid_map`, as loaded by the (out-of-scope) SIT loader.
    pub fn seed_sit_segment(&mut self, segno: u32, valid_map: &[u8]) {
        let base = segno as usize * self.blocks_per_seg as usize;
        for i in 0..self.blocks_per_seg as usize {
            if base + i >= self.main_block_count {
                break;
            }
            if test_bit(valid_map, i) {
                set_bit(&mut self.sit_bitmap, base + i);
            }
        }
    }

    fn offset(&self, blkaddr: u32) -> usize {
        (blkaddr - self.main_blkaddr) as usize
    }

    fn segno(&self, blkaddr: u32) -> u32 {
        self.offset(blkaddr) as u32 / self.blocks_per_seg
    }

    pub fn test_sit(&self, blkaddr: u32) -> bool {
        test_bit(&self.sit_bitmap, self.offset(blkaddr))
    }

    pub fn test_main(&self, blkaddr: u32) -> bool {
        test_bit(&self.main_bitmap, self.offset(blkaddr))
    }

    /// Records that `blkaddr` was visited with the expected segment type
    /// `expected`. Returns `true` if this is the first visit (caller should
    /// proceed), `false` if the block was already visited (duplicate fault
    /// already recorded by the caller).
    pub fn set_main(&mut self, blkaddr: u32, expected: SegType, faults: &mut FaultLog) -> bool {
        let segno = self.segno(blkaddr);
        let recorded = self.observed_seg_type.get(&segno).copied();
        match recorded {
            None => {
                self.observed_seg_type.insert(segno, expected);
            }
            Some(SegType::NoCheck) => {
                faults.record(Domain::Meta, FaultCode::SitTypeIsError, segno);
                self.observed_seg_type.insert(segno, expected);
            }
            Some(existing) if !existing.same_axis(expected) => {
                faults.record(Domain::Meta, FaultCode::SitTypeIsError, segno);
                self.observed_seg_type.insert(segno, expected);
            }
            _ => {}
        }
        let off = self.offset(blkaddr);
        let was_set = test_bit(&self.main_bitmap, off);
        if !was_set {
            set_bit(&mut self.main_bitmap, off);
        }
        !was_set
    }

    pub fn clear_nat(&mut self, nid: u32) {
        if (nid as usize) < self.nat_entry_count {
            clear_bit(&mut self.nat_bitmap, nid as usize);
        }
    }

    pub fn nat_still_set(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.nat_entry_count as u32).filter(|&n| test_bit(&self.nat_bitmap, n as usize))
    }

    pub fn nat_is_clean(&self) -> bool {
        self.nat_bitmap.iter().all(|&b| b == 0)
    }

    pub fn main_equals_sit(&self) -> bool {
        self.main_bitmap == self.sit_bitmap
    }

    pub fn valid_block_count(&self) -> u64 {
        self.main_bitmap.iter().map(|b| b.count_ones() as u64).sum()
    }

    pub fn observed_type(&self, segno: u32) -> SegType {
        self.observed_seg_type.get(&segno).copied().unwrap_or(SegType::NoCheck)
    }
}
