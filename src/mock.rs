//! In-memory `Device`/`Metadata` mocks used by every component's inline
//! unit tests, in place of real block-device I/O. Grounded on the same
//! spirit as `fdisk/src/disk.rs`'s `#[cfg(test)] mod test` — exercise the
//! logic without touching a real file.

#![cfg(test)]

use std::collections::HashMap;

use crate::collab::{Device, Metadata, NodeInfo, SegEntry, SumOwnership, Summary, SummaryBlock};
use crate::layout::{RawBlock, SegType, Superblock};

pub struct MockDevice {
    pub blocks: HashMap<u64, RawBlock>,
}

impl Device for MockDevice {
    fn read_block(&mut self, buf: &mut RawBlock, blk: u64) -> std::io::Result<()> {
        *buf = self.blocks.get(&blk).copied().unwrap_or_else(crate::layout::zeroed_block);
        Ok(())
    }

    fn write_block(&mut self, buf: &RawBlock, blk: u64) -> std::io::Result<()> {
        self.blocks.insert(blk, *buf);
        Ok(())
    }
}

pub struct MockMetadata {
    pub node_info: HashMap<u32, NodeInfo>,
    pub seg_entries: HashMap<u32, SegEntry>,
    pub sum_blocks: HashMap<u32, SummaryBlock>,
    pub valid_nat_entry_count: u32,
    pub nullified: Vec<u32>,
    blocks_per_seg: u32,
}

impl Metadata for MockMetadata {
    fn get_node_info(&self, nid: u32) -> Option<NodeInfo> {
        self.node_info.get(&nid).copied()
    }

    fn get_sum_block(&mut self, segno: u32) -> (SummaryBlock, SumOwnership) {
        let block = self.sum_blocks.entry(segno).or_insert_with(|| SummaryBlock {
            entry_type: SegType::NoCheck,
            entries: vec![
                Summary {
                    nid: 0,
                    version: 0,
                    ofs_in_node: 0
                };
                self.blocks_per_seg as usize
            ],
        });
        (block.clone(), SumOwnership::Owned)
    }

    fn get_seg_entry(&self, segno: u32) -> SegEntry {
        self.seg_entries.get(&segno).cloned().unwrap_or(SegEntry {
            seg_type: SegType::NoCheck,
            orig_type: SegType::NoCheck,
            valid_blocks: 0,
            cur_valid_map: vec![0u8; self.blocks_per_seg.div_ceil(8) as usize],
        })
    }

    fn valid_nat_entry_count(&self) -> u32 {
        self.valid_nat_entry_count
    }

    fn move_curseg_info(&mut self, _main_blkaddr: u64) {}
    fn write_curseg_info(&mut self) {}
    fn rewrite_sit_area_bitmap(&mut self) {}

    fn nullify_nat_entry(&mut self, nid: u32) {
        self.nullified.push(nid);
    }

    fn clear_extra_flag(&mut self, _flag: u32) {}
}

pub struct MockWorld {
    pub device: MockDevice,
    pub meta: MockMetadata,
    blocks_per_seg: u32,
    segment_count: u32,
}

impl MockWorld {
    pub fn new(blocks_per_seg: u32, segment_count: u32) -> Self {
        MockWorld {
            device: MockDevice { blocks: HashMap::new() },
            meta: MockMetadata {
                node_info: HashMap::new(),
                seg_entries: HashMap::new(),
                sum_blocks: HashMap::new(),
                valid_nat_entry_count: 0,
                nullified: Vec::new(),
                blocks_per_seg,
            },
            blocks_per_seg,
            segment_count,
        }
    }

    pub fn superblock(&self) -> Superblock {
        Superblock {
            blocks_per_seg: self.blocks_per_seg,
            log_blocks_per_seg: self.blocks_per_seg.ilog2(),
            segment_count: self.segment_count,
            main_blkaddr: 1000,
            nat_blkaddr: 10,
            sit_blkaddr: 20,
            ssa_blkaddr: 500,
            cp_blkaddr: 1,
            cp_payload: 0,
            root_ino: 3,
        }
    }

    pub fn seg_type(&mut self, segno: u32, t: SegType) {
        let entry = self.meta.seg_entries.entry(segno).or_insert(SegEntry {
            seg_type: t,
            orig_type: t,
            valid_blocks: 0,
            cur_valid_map: vec![0u8; self.blocks_per_seg.div_ceil(8) as usize],
        });
        entry.seg_type = t;
        let sum = self.meta.sum_blocks.entry(segno).or_insert_with(|| SummaryBlock {
            entry_type: t,
            entries: vec![
                Summary {
                    nid: 0,
                    version: 0,
                    ofs_in_node: 0
                };
                self.blocks_per_seg as usize
            ],
        });
        sum.entry_type = t;
    }

    pub fn summary_entry(&mut self, segno: u32, idx: usize, s: Summary) {
        let sum = self.meta.sum_blocks.entry(segno).or_insert_with(|| SummaryBlock {
            entry_type: SegType::NoCheck,
            entries: vec![
                Summary {
                    nid: 0,
                    version: 0,
                    ofs_in_node: 0
                };
                self.blocks_per_seg as usize
            ],
        });
        sum.entries[idx] = s;
    }

    pub fn set_node_info(&mut self, nid: u32, info: NodeInfo) {
        self.meta.node_info.insert(nid, info);
    }

    pub fn write_raw(&mut self, blkaddr: u64, buf: &RawBlock) {
        self.device.blocks.insert(blkaddr, *buf);
    }

    pub fn mark_sit_valid(&mut self, segno: u32, offset: usize) {
        let entry = self.meta.seg_entries.entry(segno).or_insert(SegEntry {
            seg_type: SegType::NoCheck,
            orig_type: SegType::NoCheck,
            valid_blocks: 0,
            cur_valid_map: vec![0u8; self.blocks_per_seg.div_ceil(8) as usize],
        });
        entry.cur_valid_map[offset / 8] |= 1 << (offset % 8);
        entry.valid_blocks += 1;
    }
}
