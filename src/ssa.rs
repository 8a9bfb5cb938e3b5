//! SSA validator (C2): confirms each visited block's summary entry matches
//! the reference that led the walker to it, patching the summary under
//! fix-on or failing the block otherwise.
//!
//! `is_valid_ssa_node_blk`'s return polarity is the inverted one named by
//! spec §9's open question (the original's "0 means valid" contract): here
//! that contract is made explicit as a two-variant enum instead of a raw
//! integer, so callers can't silently misread it.

use crate::collab::{Device, Metadata, SumOwnership, Summary};
use crate::config::Config;
use crate::fault::{Domain, FaultCode, FaultLog};
use crate::layout::{RawBlock, SegType, Superblock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsaCheck {
    Valid,
    Invalid,
}

impl SsaCheck {
    pub fn is_valid(self) -> bool {
        self == SsaCheck::Valid
    }
}

/// Validates and, under fix-on, repairs the SSA entry for a node block.
pub fn is_valid_ssa_node_blk(
    sb: &Superblock,
    meta: &mut dyn Metadata,
    device: &mut dyn Device,
    cfg: &Config,
    faults: &mut FaultLog,
    nid: u32,
    blkaddr: u32,
) -> SsaCheck {
    let segno = sb.segno_of(blkaddr);
    let offset = sb.offset_in_seg(blkaddr) as usize;
    let (mut sum_block, ownership) = meta.get_sum_block(segno);

    if !sum_block.entry_type.is_node() {
        if sum_block.entry_type.same_axis(SegType::HotNode) {
            // Benign hot/warm/cold sub-class disagreement; nothing to fix.
        } else {
            faults.record(Domain::Ssa, FaultCode::InvalidSumNodeBlock, blkaddr);
            if cfg.may_write() {
                sum_block.entry_type = SegType::WarmNode;
            } else {
                return SsaCheck::Invalid;
            }
        }
    }

    let Some(entry) = sum_block.entries.get(offset) else {
        faults.record(Domain::Ssa, FaultCode::InvalidSumNodeBlock, blkaddr);
        return SsaCheck::Invalid;
    };

    if entry.nid != nid {
        faults.record(Domain::Ssa, FaultCode::InvalidSumNodeBlock, blkaddr);
        if !cfg.may_write() {
            return SsaCheck::Invalid;
        }
        sum_block.entries[offset].nid = nid;
        write_back(sb, device, segno, &sum_block, ownership, cfg);
    } else if ownership == SumOwnership::Owned && cfg.may_write() {
        write_back(sb, device, segno, &sum_block, ownership, cfg);
    }

    SsaCheck::Valid
}

/// Validates and, under fix-on, repairs the SSA entry for a data block.
///
/// When the recorded triple is wrong but a second indirection through NAT
/// shows it actually points at a valid summary belonging to some other
/// live block, the summary is left untouched and the walker is told to
/// simply drop this index rather than forge a summary over live data.
pub fn is_valid_ssa_data_blk(
    sb: &Superblock,
    meta: &mut dyn Metadata,
    device: &mut dyn Device,
    cfg: &Config,
    faults: &mut FaultLog,
    parent_nid: u32,
    idx_in_node: u16,
    version: u8,
    blkaddr: u32,
) -> SsaCheck {
    let segno = sb.segno_of(blkaddr);
    let offset = sb.offset_in_seg(blkaddr) as usize;
    let (mut sum_block, ownership) = meta.get_sum_block(segno);

    if !sum_block.entry_type.is_data() {
        faults.record(Domain::Ssa, FaultCode::InvalidSumDataBlock, blkaddr);
        if !cfg.may_write() {
            return SsaCheck::Invalid;
        }
        sum_block.entry_type = SegType::WarmData;
    }

    let Some(entry) = sum_block.entries.get(offset).copied() else {
        faults.record(Domain::Ssa, FaultCode::InvalidSumDataBlock, blkaddr);
        return SsaCheck::Invalid;
    };

    let matches = entry.nid == parent_nid && entry.ofs_in_node == idx_in_node && entry.version == version;
    if matches {
        return SsaCheck::Valid;
    }

    faults.record(Domain::Ssa, FaultCode::InvalidSumDataBlock, blkaddr);
    if points_at_other_live_block(meta, &entry) {
        return SsaCheck::Invalid;
    }
    if !cfg.may_write() {
        return SsaCheck::Invalid;
    }
    sum_block.entries[offset] = Summary {
        nid: parent_nid,
        version,
        ofs_in_node: idx_in_node,
    };
    write_back(sb, device, segno, &sum_block, ownership, cfg);
    SsaCheck::Valid
}

fn points_at_other_live_block(meta: &dyn Metadata, entry: &Summary) -> bool {
    meta.get_node_info(entry.nid).is_some()
}

fn write_back(
    sb: &Superblock,
    device: &mut dyn Device,
    segno: u32,
    sum_block: &crate::collab::SummaryBlock,
    _ownership: SumOwnership,
    cfg: &Config,
) {
    if !cfg.may_write() {
        return;
    }
    let mut buf: RawBlock = crate::layout::zeroed_block();
    write_summary_block(&mut buf, sum_block);
    let _ = device.write_block(&buf, sb.sum_blkaddr(segno) as u64);
}

fn write_summary_block(buf: &mut RawBlock, sum_block: &crate::collab::SummaryBlock) {
    buf[0] = match sum_block.entry_type {
        SegType::HotNode => 1,
        SegType::WarmNode => 2,
        SegType::ColdNode => 3,
        SegType::HotData => 4,
        SegType::WarmData => 5,
        SegType::ColdData => 6,
        SegType::NoCheck => 0,
    };
    let mut p = 4usize;
    for s in &sum_block.entries {
        if p + 8 > buf.len() {
            break;
        }
        buf[p..p + 4].copy_from_slice(&s.nid.to_le_bytes());
        buf[p + 4] = s.version;
        buf[p + 5..p + 7].copy_from_slice(&s.ofs_in_node.to_le_bytes());
        p += 8;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mock::MockWorld;

    #[test]
    fn node_summary_mismatch_is_fixed_under_fix_on() {
        let mut world = MockWorld::new(4, 4);
        world.seg_type(0, SegType::HotNode);
        world.summary_entry(0, 0, Summary { nid: 999, version: 0, ofs_in_node: 0 });
        let mut cfg = Config::default();
        cfg.fix_on = true;
        let mut faults = FaultLog::default();
        let sb = world.superblock();
        let res = is_valid_ssa_node_blk(&sb, &mut world.meta, &mut world.device, &cfg, &mut faults, 42, sb.main_blkaddr);
        assert_eq!(res, SsaCheck::Valid);
        assert_eq!(faults.count_for(Domain::Ssa), 1);
    }

    #[test]
    fn node_summary_mismatch_read_only_keeps_fault_and_fails() {
        let mut world = MockWorld::new(4, 4);
        world.seg_type(0, SegType::HotNode);
        world.summary_entry(0, 0, Summary { nid: 999, version: 0, ofs_in_node: 0 });
        let cfg = Config::default();
        let mut faults = FaultLog::default();
        let sb = world.superblock();
        let res = is_valid_ssa_node_blk(&sb, &mut world.meta, &mut world.device, &cfg, &mut faults, 42, sb.main_blkaddr);
        assert_eq!(res, SsaCheck::Invalid);
    }
}
