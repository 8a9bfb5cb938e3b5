//! Global reconciler (C9): `fsck_chk_meta` and `fsck_verify`. Runs once the
//! walk (C7) and orphan sweep (C8) are done, cross-checking the shadow
//! bitmaps and accumulated counters against the loaded NAT/SIT/CP state.
//! Every mismatch here is a "global" fault per spec §7: it points at no
//! single block, only at an aggregate disagreement.

use crate::bitmap::ShadowBitmaps;
use crate::collab::Metadata;
use crate::config::Config;
use crate::context::Counters;
use crate::fault::{Domain, FaultCode, FaultLog};
use crate::layout::{Checkpoint, SegType, Superblock};
use crate::report;

/// Runs every §4.10 check, printing the `[FSCK] <check> … [Ok..]/[Fail]`
/// table and recording a fault for every failing check. Returns the nids
/// still marked "unreachable" in the NAT shadow bitmap, for the caller to
/// enumerate (spec §7's "Unreachable NIDs" listing).
pub fn verify(
    sb: &Superblock,
    meta: &dyn Metadata,
    bitmaps: &ShadowBitmaps,
    cfg: &Config,
    faults: &mut FaultLog,
    counters: &Counters,
    cp: &Checkpoint,
) -> Vec<u32> {
    let free_segments = check_sit_segment_totals(sb, meta, cp, faults);
    check_nat_node_count_vs_sit(sb, meta, counters, faults);
    check_cp_counters(cp, counters, faults, free_segments);
    let unreachable = check_nat_bitmap(bitmaps, faults);
    check_main_vs_sit(bitmaps, faults);
    check_curseg_free(sb, meta, cp, faults);
    check_segment_types(sb, meta, bitmaps, faults);

    for &nid in &unreachable {
        report::info(format!("NID[{nid}] is unreachable"));
    }
    unreachable
}

/// Returns the number of SIT-free segments (§4.10's first bullet), with
/// current segments holding zero valid blocks still counted as occupied
/// (an open curseg is never "free" even before its first write).
fn check_sit_segment_totals(sb: &Superblock, meta: &dyn Metadata, cp: &Checkpoint, faults: &mut FaultLog) -> u32 {
    let mut free = 0u32;
    let mut occupied = 0u32;
    for segno in 0..sb.segment_count {
        let entry = meta.get_seg_entry(segno);
        let is_curseg = cp.cur_node_segno.contains(&segno) || cp.cur_data_segno.contains(&segno);
        if entry.valid_blocks == 0 && !is_curseg {
            free += 1;
        } else {
            occupied += 1;
        }
    }
    let ok = free + occupied == sb.segment_count;
    report::check_result("sit free+occupied == total segments", ok);
    if !ok {
        faults.record(Domain::Meta, FaultCode::SitSegmentCountMismatchWithTotal, sb.segment_count);
    }
    free
}

fn check_nat_node_count_vs_sit(sb: &Superblock, meta: &dyn Metadata, counters: &Counters, faults: &mut FaultLog) {
    let mut node_blocks = 0u64;
    for segno in 0..sb.segment_count {
        let entry = meta.get_seg_entry(segno);
        if entry.seg_type.is_node() {
            node_blocks += entry.valid_blocks as u64;
        }
    }
    let ok = node_blocks == meta.valid_nat_entry_count() as u64;
    report::check_result("sit node block count == valid nat entries", ok);
    if !ok {
        faults.record(Domain::Meta, FaultCode::NatNodeCountMismatchWithSit, counters.valid_node_count);
    }
}

fn check_cp_counters(cp: &Checkpoint, counters: &Counters, faults: &mut FaultLog, free_segments: u32) {
    let free_ok = cp.free_segment_count == free_segments;
    report::check_result("cp.free_segment_count matches sit", free_ok);
    if !free_ok {
        faults.record(Domain::Meta, FaultCode::SitFreesegCountMismatchWithCp, free_segments);
    }

    let node_ok = cp.valid_node_count == counters.valid_node_count;
    report::check_result("cp.valid_node_count matches walk", node_ok);
    if !node_ok {
        faults.record(Domain::Meta, FaultCode::NatNodeCountMismatchWithCp, counters.valid_node_count);
    }

    let inode_ok = cp.valid_inode_count == counters.valid_inode_count;
    report::check_result("cp.valid_inode_count matches walk", inode_ok);
    if !inode_ok {
        faults.record(Domain::Meta, FaultCode::NatInodeCountMismatchWithCp, counters.valid_inode_count);
    }

    // No dedicated PR_* code exists for a valid_block_count mismatch in the
    // closed enumeration (spec §6); the node-count code is the closest
    // existing CP-counter mismatch signal and is reused here.
    let block_ok = cp.valid_block_count == counters.valid_block_count;
    report::check_result("cp.valid_block_count matches walk", block_ok);
    if !block_ok {
        faults.record(Domain::Meta, FaultCode::NatNodeCountMismatchWithCp, counters.valid_node_count);
    }
}

fn check_nat_bitmap(bitmaps: &ShadowBitmaps, faults: &mut FaultLog) -> Vec<u32> {
    let unreachable: Vec<u32> = bitmaps.nat_still_set().collect();
    let ok = unreachable.is_empty();
    report::check_result("every nat-known nid was reached", ok);
    for &nid in &unreachable {
        faults.record(Domain::Meta, FaultCode::NidIsUnreachable, nid);
    }
    unreachable
}

fn check_main_vs_sit(bitmaps: &ShadowBitmaps, faults: &mut FaultLog) {
    let ok = bitmaps.main_equals_sit();
    report::check_result("main bitmap == sit bitmap", ok);
    if !ok {
        faults.record(Domain::Meta, FaultCode::NatInoOutNatBitmap, 0);
    }
}

fn check_curseg_free(sb: &Superblock, meta: &dyn Metadata, cp: &Checkpoint, faults: &mut FaultLog) {
    let mut ok = true;
    for &segno in cp.cur_node_segno.iter().chain(cp.cur_data_segno.iter()) {
        let entry = meta.get_seg_entry(segno);
        let next_off = entry.valid_blocks as usize;
        if next_off < sb.blocks_per_seg as usize {
            let free = entry.cur_valid_map.get(next_off / 8).map(|b| b & (1 << (next_off % 8)) == 0).unwrap_or(true);
            if !free {
                ok = false;
                faults.record(Domain::Meta, FaultCode::CurNextBlkIsNotFree, segno);
            }
        } else {
            ok = false;
            faults.record(Domain::Meta, FaultCode::LfsHasNoFreeSection, segno);
        }
    }
    report::check_result("current segments have a free next-write slot", ok);
}

/// Compares each segment's original SIT type against the type the walk
/// actually observed there, excepting a benign cold-data downgrade (a
/// segment SIT originally typed `ColdData` but observed as any data type
/// during the walk is not a fault — data temperature reclassification is
/// harmless for consistency purposes).
fn check_segment_types(sb: &Superblock, meta: &dyn Metadata, bitmaps: &ShadowBitmaps, faults: &mut FaultLog) {
    let mut ok = true;
    for segno in 0..sb.segment_count {
        let entry = meta.get_seg_entry(segno);
        let observed = bitmaps.observed_type(segno);
        if observed == SegType::NoCheck {
            continue;
        }
        let benign_cold_downgrade = entry.orig_type == SegType::ColdData && observed.is_data();
        if entry.orig_type != observed && !benign_cold_downgrade {
            ok = false;
            faults.record(Domain::Meta, FaultCode::SitTypeIsError, segno);
        }
    }
    report::check_result("segment original type matches observed type", ok);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mock::MockWorld;

    #[test]
    fn clean_run_reports_no_unreachable_nids() {
        let mut world = MockWorld::new(16, 4);
        let sb = world.superblock();
        let bitmaps = ShadowBitmaps::new(16, sb.main_blkaddr, 16 * 4, 8);
        let cfg = Config::default();
        let mut faults = FaultLog::default();
        let counters = Counters::default();
        let cp = Checkpoint::default();
        let unreachable = verify(&sb, &world.meta, &bitmaps, &cfg, &mut faults, &counters, &cp);
        assert!(unreachable.is_empty());
    }

    #[test]
    fn unreached_nat_entry_is_listed() {
        let world = MockWorld::new(16, 4);
        let sb = world.superblock();
        let mut bitmaps = ShadowBitmaps::new(16, sb.main_blkaddr, 16 * 4, 8);
        bitmaps.seed_nat([5]);
        let cfg = Config::default();
        let mut faults = FaultLog::default();
        let counters = Counters::default();
        // 4 segments total, segno 0 counted as the (default-zeroed) current
        // node/data segment: 3 free.
        let cp = Checkpoint { free_segment_count: 3, ..Checkpoint::default() };
        let unreachable = verify(&sb, &world.meta, &bitmaps, &cfg, &mut faults, &counters, &cp);
        assert_eq!(unreachable, vec![5]);
        assert_eq!(faults.count_for(Domain::Meta), 1);
    }
}
