//! External collaborators (spec §6): block device I/O and metadata lookups
//! the core consults but does not itself load from disk. A production
//! integration supplies these; `image.rs` ships a concrete implementation
//! so the crate is runnable end to end.

use std::io;

use crate::layout::{RawBlock, SegType};

/// Raw 4 KiB block I/O, addressed by absolute block number.
pub trait Device {
    fn read_block(&mut self, buf: &mut RawBlock, blk: u64) -> io::Result<()>;
    fn write_block(&mut self, buf: &RawBlock, blk: u64) -> io::Result<()>;
    /// Best-effort readahead hint; callers never depend on its effect.
    fn reada_block(&mut self, _blk: u64) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeInfo {
    pub ino: u32,
    pub blk_addr: u32,
    pub version: u8,
}

#[derive(Debug, Clone)]
pub struct SegEntry {
    pub seg_type: SegType,
    pub orig_type: SegType,
    pub valid_blocks: u16,
    /// Bit `i` set means block `i` of the segment is marked valid by SIT.
    pub cur_valid_map: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct Summary {
    pub nid: u32,
    pub version: u8,
    pub ofs_in_node: u16,
}

#[derive(Debug, Clone)]
pub struct SummaryBlock {
    pub entry_type: SegType,
    pub entries: Vec<Summary>,
}

/// Whether a `SummaryBlock` returned by `get_sum_block` was freshly
/// allocated by the collaborator (and so must be written back through it)
/// or borrowed from a long-lived curseg cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SumOwnership {
    Owned,
    Borrowed,
}

/// Already-parsed accessors over NAT/SIT/CP state. Loading these tables
/// from disk (`build_nat_area_bitmap`, `build_sit_area_bitmap`, and the
/// segment-manager cursor writers) is out of this core's scope; the core
/// only consumes the accessors and, for repair, calls the mutating ones.
pub trait Metadata {
    fn get_node_info(&self, nid: u32) -> Option<NodeInfo>;
    fn get_sum_block(&mut self, segno: u32) -> (SummaryBlock, SumOwnership);
    fn get_seg_entry(&self, segno: u32) -> SegEntry;

    /// Total number of nat entries considered valid while the NAT/SIT
    /// tables were loaded (used by the global reconciler, C9).
    fn valid_nat_entry_count(&self) -> u32;

    fn move_curseg_info(&mut self, main_blkaddr: u64);
    fn write_curseg_info(&mut self);
    fn rewrite_sit_area_bitmap(&mut self);
    fn nullify_nat_entry(&mut self, nid: u32);
    fn clear_extra_flag(&mut self, flag: u32);
}
