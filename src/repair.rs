//! Repair writer (C10): `fix_checkpoint`. Runs only when fix-on produced at
//! least one fault (or a forced fix was scheduled), and rewrites the
//! checkpoint, NAT, SIT bitmap and curseg summaries wholesale, in the fixed
//! order spec §4.11 lays out.

use crate::bitmap::ShadowBitmaps;
use crate::collab::Metadata;
use crate::context::Counters;
use crate::hardlink::HardLinkLedger;
use crate::layout::{Checkpoint, RawBlock, CHECKSUM_OFFSET, CP_ORPHAN_PRESENT_FLAG, CP_UMOUNT_FLAG};

/// Which on-disk checkpoint copy a run was loaded from; the repair writer
/// rewrites the same slot rather than alternating, since this is a
/// consistency fixup and not the normal mount-time checkpoint commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpSlot {
    Primary,
    Secondary,
}

/// Drains the hard-link ledger, rewriting `i_links` for every surviving
/// record to the walk-observed `actual_links`. The node block itself is
/// rewritten through the same `Metadata`/`Device` pair the walker used, by
/// nid, since the ledger only tracks nid and the observed count.
pub fn fix_hard_links(meta: &dyn Metadata, device: &mut dyn crate::collab::Device, hardlinks: &mut HardLinkLedger) {
    for (nid, entry) in hardlinks.take() {
        let Some(info) = meta.get_node_info(nid) else {
            continue;
        };
        let mut raw: RawBlock = crate::layout::zeroed_block();
        if device.read_block(&mut raw, info.blk_addr as u64).is_err() {
            continue;
        }
        let mut inode = crate::layout::Inode::parse(&raw);
        inode.i_links = entry.actual_links;
        inode.write(&mut raw);
        let _ = device.write_block(&raw, info.blk_addr as u64);
    }
}

/// Nullifies the NAT entry for every nid still marked "unreached" in the
/// NAT shadow bitmap after the walk.
pub fn fix_nat_entries(meta: &mut dyn Metadata, bitmaps: &ShadowBitmaps) {
    for nid in bitmaps.nat_still_set().collect::<Vec<_>>() {
        meta.nullify_nat_entry(nid);
    }
}

/// Executes the full §4.11 repair sequence and writes the checkpoint
/// payload. `cp` is updated in place with the walk's aggregated counters
/// before its CRC is recomputed.
#[allow(clippy::too_many_arguments)]
pub fn fix_checkpoint(
    sb: &crate::layout::Superblock,
    meta: &mut dyn Metadata,
    device: &mut dyn crate::collab::Device,
    bitmaps: &ShadowBitmaps,
    hardlinks: &HardLinkLedger,
    counters: &Counters,
    cp: &mut Checkpoint,
    cp_slot: CpSlot,
) {
    let mut hardlinks = hardlinks.clone();
    fix_hard_links(&*meta, device, &mut hardlinks);
    fix_nat_entries(meta, bitmaps);
    meta.rewrite_sit_area_bitmap();

    meta.move_curseg_info(sb.main_blkaddr as u64);
    meta.write_curseg_info();

    cp.ckpt_flags = CP_UMOUNT_FLAG;
    if !bitmaps.nat_is_clean() {
        cp.ckpt_flags |= CP_ORPHAN_PRESENT_FLAG;
    }
    cp.valid_node_count = counters.valid_node_count;
    cp.valid_inode_count = counters.valid_inode_count;
    cp.valid_block_count = counters.valid_block_count;

    let mut buf = crate::layout::zeroed_block();
    cp.write(&mut buf);
    let crc = crate::hash::crc32(&buf[..CHECKSUM_OFFSET]);
    cp.checksum = crc;
    buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());

    let cp_addr = match cp_slot {
        CpSlot::Primary => sb.cp_blkaddr as u64,
        CpSlot::Secondary => sb.cp_blkaddr as u64 + sb.blocks_per_seg as u64,
    };
    let _ = device.write_block(&buf, cp_addr);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mock::MockWorld;

    #[test]
    fn checkpoint_write_sets_umount_flag_and_crc() {
        let mut world = MockWorld::new(16, 4);
        let sb = world.superblock();
        let bitmaps = ShadowBitmaps::new(16, sb.main_blkaddr, 16 * 4, 8);
        let hardlinks = HardLinkLedger::default();
        let counters = Counters {
            valid_inode_count: 1,
            valid_node_count: 1,
            valid_block_count: 1,
        };
        let mut cp = Checkpoint::default();
        fix_checkpoint(
            &sb,
            &mut world.meta,
            &mut world.device,
            &bitmaps,
            &hardlinks,
            &counters,
            &mut cp,
            CpSlot::Primary,
        );
        assert_eq!(cp.ckpt_flags & CP_UMOUNT_FLAG, CP_UMOUNT_FLAG);
        assert_eq!(cp.valid_node_count, 1);

        let mut raw = crate::layout::zeroed_block();
        world.device.read_block(&mut raw, sb.cp_blkaddr as u64).unwrap();
        let crc = crate::hash::crc32(&raw[..CHECKSUM_OFFSET]);
        assert_eq!(crc, cp.checksum);
    }

    #[test]
    fn secondary_slot_writes_one_segment_past_primary() {
        let mut world = MockWorld::new(16, 4);
        let sb = world.superblock();
        let bitmaps = ShadowBitmaps::new(16, sb.main_blkaddr, 16 * 4, 8);
        let hardlinks = HardLinkLedger::default();
        let counters = Counters::default();
        let mut cp = Checkpoint::default();
        fix_checkpoint(
            &sb,
            &mut world.meta,
            &mut world.device,
            &bitmaps,
            &hardlinks,
            &counters,
            &mut cp,
            CpSlot::Secondary,
        );
        let mut raw = crate::layout::zeroed_block();
        world
            .device
            .read_block(&mut raw, sb.cp_blkaddr as u64 + sb.blocks_per_seg as u64)
            .unwrap();
        assert_eq!(Checkpoint::parse(&raw).ckpt_flags, cp.ckpt_flags);
    }
}
