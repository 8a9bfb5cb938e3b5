//! Inode/indirect tree walker (C7) and the data-block checker (§4.8).
//! `check_node` is the single recursive entry point: every nid the walk
//! visits — inode, xattr, direct, indirect, double-indirect — passes
//! through C3's sanity gate and C2's SSA check before its own payload is
//! interpreted.

use crate::bitmap::ShadowBitmaps;
use crate::collab::{Device, Metadata};
use crate::config::Config;
use crate::context::Counters;
use crate::fault::{Domain, FaultCode, FaultLog};
use crate::hardlink::HardLinkLedger;
use crate::layout::{
    zeroed_block, DentryBlock, DirectNode, Extent, FileKind, IndirectNode, NodeKind, SegType, Superblock,
    XattrEntry, XattrHeader, DATA_EXIST, ENCRYPT_CORRUPT, INLINE_DATA, INLINE_DENTRY, INLINE_DOTS, INLINE_XATTR,
    NEW_ADDR, NULL_ADDR, XATTR_MAGIC,
};

/// A verified encryption-context xattr entry offered as a fscrypt rebuild
/// source (spec §4.5 steps 1-2): either a parent directory's own xattr, or
/// the first non-corrupt encrypted child a directory finds among its
/// dentries.
pub type EncryptCandidate = (XattrHeader, XattrEntry);

pub struct ChildStats {
    pub is_dir: bool,
    pub encrypt_candidate: Option<EncryptCandidate>,
}

/// Dentry counts accumulated across however many data/index-node blocks a
/// directory's payload spans, plus any encryption-rebuild candidate found
/// along the way. Zero/`None` for non-directory blocks.
#[derive(Default)]
struct DentryCounts {
    child_count: u32,
    subdir_count: u32,
    needs_inline_dots: bool,
    encrypt_candidate: Option<EncryptCandidate>,
}

impl DentryCounts {
    fn merge(&mut self, other: DentryCounts) {
        self.child_count += other.child_count;
        self.subdir_count += other.subdir_count;
        self.needs_inline_dots |= other.needs_inline_dots;
        if self.encrypt_candidate.is_none() {
            self.encrypt_candidate = other.encrypt_candidate;
        }
    }
}

/// Per-inode transient extent-coverage map (§4.7 item 7): tracks which
/// blocks within the inode's declared `i_ext` the walk has actually visited,
/// to catch a stale extent (left-over unreferenced range) or a duplicate
/// mapping (the same block address reachable through two different paths).
struct ExtentTracker {
    start_blkaddr: u32,
    covered: Vec<bool>,
    remaining: u32,
    fail: bool,
}

impl ExtentTracker {
    fn new(ext: Extent) -> Self {
        ExtentTracker {
            start_blkaddr: ext.blkaddr,
            covered: vec![false; ext.len as usize],
            remaining: ext.len,
            fail: false,
        }
    }

    fn mark(&mut self, blkaddr: u32) {
        if blkaddr < self.start_blkaddr {
            return;
        }
        let idx = (blkaddr - self.start_blkaddr) as usize;
        let Some(slot) = self.covered.get_mut(idx) else {
            return;
        };
        if *slot {
            self.fail = true;
        } else {
            *slot = true;
            self.remaining = self.remaining.saturating_sub(1);
        }
    }

    fn is_bad(&self) -> bool {
        self.fail || self.remaining != 0
    }
}

/// Validates and (under fix-on) repairs the inode at `nid`, recursing into
/// its xattr, dentry and indirect-tree children. `parent_ino == 0` marks
/// the root of the walk (the filesystem root inode or an orphan); any
/// other value is the directory ino that referenced this child.
#[allow(clippy::too_many_arguments)]
pub fn check_node(
    sb: &Superblock,
    meta: &mut dyn Metadata,
    device: &mut dyn Device,
    bitmaps: &mut ShadowBitmaps,
    cfg: &Config,
    faults: &mut FaultLog,
    hardlinks: &mut HardLinkLedger,
    counters: &mut Counters,
    nid: u32,
    expected_file_kind: FileKind,
    expected_node_kind: NodeKind,
    blk_cnt: &mut u64,
    parent_ino: u32,
    parent_candidate: Option<EncryptCandidate>,
) -> Result<ChildStats, ()> {
    let check = crate::nid::sanity_check_nid(
        sb,
        &*meta,
        device,
        bitmaps,
        cfg,
        faults,
        nid,
        Some(expected_file_kind),
        expected_node_kind,
    )?;

    if !bitmaps.set_main(check.blk_addr, SegType::HotNode, faults) {
        faults.record(Domain::Meta, FaultCode::DuplicateNodeBlkaddrInMainBitmap, nid);
        return Err(());
    }
    if !crate::ssa::is_valid_ssa_node_blk(sb, meta, device, cfg, faults, nid, check.blk_addr).is_valid() {
        return Err(());
    }

    *blk_cnt += 1;
    counters.valid_node_count += 1;
    counters.valid_inode_count += 1;

    let mut inode = check.inode.expect("check_node only invoked with NodeKind::Inode");
    let is_dir = expected_file_kind == FileKind::Dir;

    if !is_dir && inode.i_links > 1 {
        if parent_ino == 0 {
            hardlinks.open(nid, inode.i_links);
        } else if !hardlinks.refer(nid) {
            faults.record(Domain::HardLink, FaultCode::HardLinkNumIsError, nid);
        }
    }

    let external = if inode.i_xattr_nid != 0 {
        match crate::nid::sanity_check_nid(sb, &*meta, device, bitmaps, cfg, faults, inode.i_xattr_nid, None, NodeKind::Xattr) {
            Ok(xattr_check) => {
                if bitmaps.set_main(xattr_check.blk_addr, SegType::ColdNode, faults) {
                    *blk_cnt += 1;
                    counters.valid_node_count += 1;
                }
                xattr_check.raw[..crate::layout::BLOCK_SIZE - crate::layout::NODE_FOOTER_LEN].to_vec()
            }
            Err(()) => {
                if cfg.may_write() {
                    inode.i_xattr_nid = 0;
                }
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let validation = crate::xattr::validate_and_rewrite(&mut inode, &external, cfg.may_write());

    if inode.has_flag(INLINE_DATA) {
        let addr0 = inode.i_addr.first().copied().unwrap_or(0);
        if addr0 != 0 {
            faults.record(Domain::Inode, FaultCode::InlineDataAddr0NotZero, nid);
            if cfg.may_write() {
                if inode.i_addr.is_empty() {
                    inode.i_addr.push(0);
                } else {
                    inode.i_addr[0] = 0;
                }
            }
        }
        if !inode.has_flag(DATA_EXIST) {
            faults.record(Domain::Inode, FaultCode::InlineDataInexistence, nid);
            if cfg.may_write() {
                inode.set_flag(DATA_EXIST);
            }
        }
    }

    // What this directory offers its own children as a fscrypt rebuild
    // source (spec §4.5 step 1): `None` whenever this inode's own context is
    // itself still corrupt, since an unverified context cannot be handed
    // down — the rebuild attempt for `inode` itself happens once, below,
    // after its children have had a chance to offer a candidate back up.
    let candidate_for_children = crate::xattr::own_encrypt_candidate(&inode);
    let mut found_child_candidate: Option<EncryptCandidate> = None;

    let mut child_count = 0u32;
    let mut subdir_count = 0u32;
    let mut needs_inline_dots = false;
    let mut extent = if inode.i_ext.len > 0 { Some(ExtentTracker::new(inode.i_ext)) } else { None };
    // Root is its own parent (spec §3 invariant 4); every other directory's
    // ".." must resolve to whatever ino referred to it.
    let dotdot_expected = if parent_ino == 0 { check.ino } else { parent_ino };

    if inode.has_flag(INLINE_DENTRY) {
        let mut block = DentryBlock::parse_inline(&inode.inline_dentry);
        let outcome = crate::dentry::check_dentry_block(
            &mut block,
            check.ino,
            dotdot_expected,
            true,
            candidate_for_children.clone(),
            sb,
            meta,
            device,
            bitmaps,
            cfg,
            faults,
            hardlinks,
            counters,
        );
        if outcome.need_fix && cfg.may_write() {
            let mut buf = vec![0u8; inode.inline_dentry.len()];
            block.write_inline(&mut buf);
            inode.inline_dentry = buf;
        }
        child_count = outcome.child_count;
        subdir_count = outcome.subdir_count;
        needs_inline_dots = outcome.needs_inline_dots;
        found_child_candidate = outcome.first_child_encrypt;
    } else if !inode.has_flag(INLINE_DATA) {
        // §4.7 item 6: inline space can carry the xattr magic/refcount
        // sentinel pair even though `INLINE_XATTR` was never set (the flag
        // update and the sentinel write can fall on opposite sides of a
        // crash). Restore the flag under fix-on rather than leave the
        // sentinel orphaned.
        if !inode.has_flag(INLINE_XATTR) && inode.inline_xattr.len() >= 8 {
            let magic = u32::from_le_bytes(inode.inline_xattr[0..4].try_into().unwrap());
            let refcount = u32::from_le_bytes(inode.inline_xattr[4..8].try_into().unwrap());
            if magic == XATTR_MAGIC && refcount != 0 {
                faults.record(Domain::Xattr, FaultCode::MissingInlineXattr, nid);
                if cfg.may_write() {
                    inode.set_flag(INLINE_XATTR);
                }
            }
        }

        let mut acc = DentryCounts::default();
        for (idx, &addr) in inode.i_addr.clone().iter().enumerate() {
            if addr == NULL_ADDR {
                continue;
            }
            if let Ok(counts) = check_data_block(
                sb,
                meta,
                device,
                bitmaps,
                cfg,
                faults,
                hardlinks,
                counters,
                nid,
                idx as u16,
                addr,
                check.version,
                check.ino,
                dotdot_expected,
                expected_file_kind,
                blk_cnt,
                &mut extent,
                candidate_for_children.clone(),
            ) {
                acc.merge(counts);
            }
        }
        for (slot, &child_nid) in inode.i_nid.iter().enumerate() {
            if child_nid == NULL_ADDR {
                continue;
            }
            let kind = match slot {
                0 | 1 => NodeKind::Direct,
                2 | 3 => NodeKind::Indirect,
                _ => NodeKind::DoubleIndirect,
            };
            if let Ok(counts) = walk_index_node(
                sb,
                meta,
                device,
                bitmaps,
                cfg,
                faults,
                hardlinks,
                counters,
                child_nid,
                kind,
                expected_file_kind,
                blk_cnt,
                check.ino,
                dotdot_expected,
                &mut extent,
                candidate_for_children.clone(),
            ) {
                acc.merge(counts);
            }
        }
        child_count = acc.child_count;
        subdir_count = acc.subdir_count;
        needs_inline_dots = acc.needs_inline_dots;
        found_child_candidate = acc.encrypt_candidate;
    }

    // Step 1 prefers the parent's own context; step 2 (directories only,
    // since only a directory has children to search) falls back to the
    // first verified child context. `check_encrypt` must run exactly once
    // per inode: it unconditionally clears `ENCRYPT_CORRUPT` on its first
    // call, so a second call here would always be a no-op.
    let effective_candidate = if is_dir {
        parent_candidate.clone().or(found_child_candidate.take())
    } else {
        parent_candidate.clone()
    };
    let _ = crate::xattr::check_encrypt(&mut inode, &validation, effective_candidate.as_ref().map(|(h, e)| (h, e)));

    if expected_file_kind == FileKind::Symlink {
        // Symlink payload always lives in the first (and only) data block;
        // its size/block-count are restored from what the walk actually
        // observed rather than cross-checked against a separate invariant.
        if inode.i_blocks == 0 {
            inode.i_blocks = *blk_cnt;
        }
    }

    if inode.i_blocks != *blk_cnt {
        faults.record(Domain::Inode, FaultCode::InvalidIBlocks, nid);
        if cfg.may_write() {
            inode.i_blocks = *blk_cnt;
        }
    }

    if let Some(tracker) = &extent {
        if tracker.is_bad() {
            faults.record(Domain::Inode, FaultCode::InvalidExtentValue, nid);
            if cfg.may_write() {
                inode.i_ext.len = 0;
            }
        }
    }

    if expected_file_kind == FileKind::Orphan && inode.i_links != 0 {
        faults.record(Domain::Orphan, FaultCode::OrphanInodeHasILinks, nid);
        if cfg.may_write() {
            inode.i_links = 0;
        }
    }

    // Spec §3 invariant 4 / §8: a directory's recorded child count must
    // equal `i_links` (2 dot entries plus one per subdirectory child).
    if is_dir {
        let expected_links = 2 + subdir_count;
        if inode.i_links != expected_links {
            faults.record(Domain::Inode, FaultCode::InvalidILinks, nid);
            if cfg.may_write() {
                inode.i_links = expected_links;
            }
        }
        // §4.6: fewer than two dot entries sets INLINE_DOTS for later repair.
        if needs_inline_dots && cfg.may_write() {
            inode.set_flag(INLINE_DOTS);
        }
    }

    let own_candidate = crate::xattr::own_encrypt_candidate(&inode);

    if cfg.may_write() {
        let mut raw = check.raw;
        inode.write(&mut raw);
        let _ = device.write_block(&raw, check.blk_addr as u64);
    }

    let _ = child_count;
    Ok(ChildStats {
        is_dir,
        encrypt_candidate: own_candidate,
    })
}

#[allow(clippy::too_many_arguments)]
fn walk_index_node(
    sb: &Superblock,
    meta: &mut dyn Metadata,
    device: &mut dyn Device,
    bitmaps: &mut ShadowBitmaps,
    cfg: &Config,
    faults: &mut FaultLog,
    hardlinks: &mut HardLinkLedger,
    counters: &mut Counters,
    nid: u32,
    kind: NodeKind,
    file_kind: FileKind,
    blk_cnt: &mut u64,
    ino: u32,
    dotdot_ino: u32,
    extent: &mut Option<ExtentTracker>,
    dentry_candidate: Option<EncryptCandidate>,
) -> Result<DentryCounts, ()> {
    let check = crate::nid::sanity_check_nid(sb, &*meta, device, bitmaps, cfg, faults, nid, None, kind)?;

    if !bitmaps.set_main(check.blk_addr, SegType::WarmNode, faults) {
        faults.record(Domain::Meta, FaultCode::DuplicateNodeBlkaddrInMainBitmap, nid);
        return Err(());
    }
    if !crate::ssa::is_valid_ssa_node_blk(sb, meta, device, cfg, faults, nid, check.blk_addr).is_valid() {
        return Err(());
    }
    *blk_cnt += 1;
    counters.valid_node_count += 1;

    let mut acc = DentryCounts::default();
    match kind {
        NodeKind::Direct => {
            let node = DirectNode::parse(&check.raw);
            for (idx, &addr) in node.addr.iter().enumerate() {
                if addr == NULL_ADDR {
                    continue;
                }
                if let Ok(counts) = check_data_block(
                    sb,
                    meta,
                    device,
                    bitmaps,
                    cfg,
                    faults,
                    hardlinks,
                    counters,
                    nid,
                    idx as u16,
                    addr,
                    check.version,
                    ino,
                    dotdot_ino,
                    file_kind,
                    blk_cnt,
                    extent,
                    dentry_candidate.clone(),
                ) {
                    acc.merge(counts);
                }
            }
            Ok(acc)
        }
        NodeKind::Indirect | NodeKind::DoubleIndirect => {
            let node = IndirectNode::parse(&check.raw);
            let child_kind = if kind == NodeKind::Indirect {
                NodeKind::Direct
            } else {
                NodeKind::Indirect
            };
            for &child_nid in &node.nid {
                if child_nid == NULL_ADDR {
                    continue;
                }
                if let Ok(counts) = walk_index_node(
                    sb, meta, device, bitmaps, cfg, faults, hardlinks, counters, child_nid, child_kind, file_kind,
                    blk_cnt, ino, dotdot_ino, extent, dentry_candidate.clone(),
                ) {
                    acc.merge(counts);
                }
            }
            Ok(acc)
        }
        _ => unreachable!("walk_index_node only called with Direct/Indirect/DoubleIndirect"),
    }
}

#[allow(clippy::too_many_arguments)]
fn check_data_block(
    sb: &Superblock,
    meta: &mut dyn Metadata,
    device: &mut dyn Device,
    bitmaps: &mut ShadowBitmaps,
    cfg: &Config,
    faults: &mut FaultLog,
    hardlinks: &mut HardLinkLedger,
    counters: &mut Counters,
    parent_nid: u32,
    idx_in_node: u16,
    blkaddr: u32,
    version: u8,
    ino: u32,
    dotdot_ino: u32,
    file_kind: FileKind,
    blk_cnt: &mut u64,
    extent: &mut Option<ExtentTracker>,
    dentry_candidate: Option<EncryptCandidate>,
) -> Result<DentryCounts, ()> {
    if blkaddr == NEW_ADDR {
        return Ok(DentryCounts::default());
    }
    let in_main =
        blkaddr >= sb.main_blkaddr && (blkaddr as u64) < sb.main_blkaddr as u64 + sb.main_area_blocks();
    if !in_main {
        faults.record(Domain::Meta, FaultCode::NodeInvalidBlkaddr, parent_nid);
        return Err(());
    }

    let seg_type = if file_kind == FileKind::Dir { SegType::HotData } else { SegType::WarmData };
    if !bitmaps.set_main(blkaddr, seg_type, faults) {
        faults.record(Domain::Meta, FaultCode::DuplicateDataBlkaddrInMainBitmap, parent_nid);
        return Err(());
    }
    if !crate::ssa::is_valid_ssa_data_blk(sb, meta, device, cfg, faults, parent_nid, idx_in_node, version, blkaddr)
        .is_valid()
    {
        return Err(());
    }

    *blk_cnt += 1;
    counters.valid_block_count += 1;
    if let Some(tracker) = extent.as_mut() {
        tracker.mark(blkaddr);
    }

    if file_kind == FileKind::Dir {
        let mut raw = zeroed_block();
        if device.read_block(&mut raw, blkaddr as u64).is_ok() {
            let mut block = DentryBlock::parse_block(&raw);
            let has_dots = idx_in_node == 0;
            let outcome = crate::dentry::check_dentry_block(
                &mut block, ino, dotdot_ino, has_dots, dentry_candidate, sb, meta, device, bitmaps, cfg, faults,
                hardlinks, counters,
            );
            if outcome.need_fix && cfg.may_write() {
                block.write_block(&mut raw);
                let _ = device.write_block(&raw, blkaddr as u64);
            }
            return Ok(DentryCounts {
                child_count: outcome.child_count,
                subdir_count: outcome.subdir_count,
                needs_inline_dots: outcome.needs_inline_dots,
                encrypt_candidate: outcome.first_child_encrypt,
            });
        }
    }

    Ok(DentryCounts::default())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collab::NodeInfo;
    use crate::config::Config;
    use crate::context::Counters;
    use crate::fault::FaultLog;
    use crate::hardlink::HardLinkLedger;
    use crate::layout::{zeroed_block, Inode, NodeFooter, ADDRS_PER_INODE, INLINE_XATTR_SIZE, I_NAME_LEN, NIDS_PER_INODE};
    use crate::mock::MockWorld;

    const NID: u32 = 50;

    /// Builds a regular-file inode at `nid` with two data blocks and the
    /// given declared extent, returning the block addresses it wrote.
    fn setup(world: &mut MockWorld, sb: &Superblock, ext_len: u32) -> (u32, u32) {
        let data0 = sb.main_blkaddr + 100;
        let data1 = sb.main_blkaddr + 101;

        world.set_node_info(NID, NodeInfo { ino: NID, blk_addr: sb.main_blkaddr + 50, version: 0 });
        let mut i_addr = vec![0u32; ADDRS_PER_INODE];
        i_addr[0] = data0;
        i_addr[1] = data1;
        let inode = Inode {
            footer: NodeFooter { nid: NID, ino: NID, flag: 0 },
            i_mode: 0o100000,
            i_links: 1,
            i_size: 0,
            // One for the inode's own node block plus the two data blocks
            // below: `blk_cnt` counts every node and data block the walk
            // visits, not just data.
            i_blocks: 3,
            i_pino: 0,
            i_ext: Extent { fofs: 0, blkaddr: data0, len: ext_len },
            i_inline: 0,
            i_namelen: 0,
            i_name: [0; I_NAME_LEN],
            i_xattr_nid: 0,
            i_nid: [0; NIDS_PER_INODE],
            i_addr,
            inline_data: Vec::new(),
            inline_dentry: Vec::new(),
            inline_xattr: vec![0u8; INLINE_XATTR_SIZE],
        };
        let mut raw = zeroed_block();
        inode.write(&mut raw);
        world.write_raw((sb.main_blkaddr + 50) as u64, &raw);

        // Pre-seed correct SSA summary entries so both tests (with and
        // without -f) exercise only the extent-coverage check, not a
        // summary-repair side effect.
        let inode_seg = sb.segno_of(sb.main_blkaddr + 50);
        world.seg_type(inode_seg, SegType::HotNode);
        world.summary_entry(
            inode_seg,
            sb.offset_in_seg(sb.main_blkaddr + 50) as usize,
            crate::collab::Summary { nid: NID, version: 0, ofs_in_node: 0 },
        );

        let data_seg = sb.segno_of(data0);
        world.seg_type(data_seg, SegType::WarmData);
        world.summary_entry(
            data_seg,
            sb.offset_in_seg(data0) as usize,
            crate::collab::Summary { nid: NID, version: 0, ofs_in_node: 0 },
        );
        world.summary_entry(
            data_seg,
            sb.offset_in_seg(data1) as usize,
            crate::collab::Summary { nid: NID, version: 0, ofs_in_node: 1 },
        );

        (data0, data1)
    }

    fn check(world: &mut MockWorld, sb: &Superblock, cfg: &Config) -> (Result<ChildStats, ()>, FaultLog) {
        let mut bitmaps = ShadowBitmaps::new(sb.blocks_per_seg, sb.main_blkaddr, 16 * 8, 64);
        let inode_seg = sb.segno_of(sb.main_blkaddr + 50);
        let off = sb.offset_in_seg(sb.main_blkaddr + 50);
        let mut valid_map = vec![0u8; (sb.blocks_per_seg as usize).div_ceil(8)];
        valid_map[off as usize / 8] |= 1 << (off % 8);
        bitmaps.seed_sit_segment(inode_seg, &valid_map);

        let mut faults = FaultLog::default();
        let mut hardlinks = HardLinkLedger::default();
        let mut counters = Counters::default();
        let mut blk_cnt = 0u64;
        let res = check_node(
            sb,
            &mut world.meta,
            &mut world.device,
            &mut bitmaps,
            cfg,
            &mut faults,
            &mut hardlinks,
            &mut counters,
            NID,
            FileKind::Reg,
            NodeKind::Inode,
            &mut blk_cnt,
            0,
            None,
        );
        (res, faults)
    }

    #[test]
    fn fully_covered_extent_is_not_flagged() {
        let mut world = MockWorld::new(16, 8);
        let sb = world.superblock();
        setup(&mut world, &sb, 2);

        let mut cfg = Config::default();
        cfg.fix_on = true;
        let (res, faults) = check(&mut world, &sb, &cfg);
        assert!(res.is_ok());
        assert_eq!(faults.count_for(Domain::Inode), 0);
    }

    #[test]
    fn short_extent_is_flagged_and_cleared_under_fix_on() {
        let mut world = MockWorld::new(16, 8);
        let sb = world.superblock();
        // Extent declares 3 blocks but only 2 are ever visited: one block
        // of declared coverage is left over at the end of the walk.
        setup(&mut world, &sb, 3);

        let mut cfg = Config::default();
        cfg.fix_on = true;
        let (res, faults) = check(&mut world, &sb, &cfg);
        assert!(res.is_ok());
        assert_eq!(faults.count_for(Domain::Inode), 1);

        let mut reread = zeroed_block();
        world.device.read_block(&mut reread, (sb.main_blkaddr + 50) as u64).unwrap();
        let fixed = Inode::parse(&reread);
        assert_eq!(fixed.i_ext.len, 0);
    }

    #[test]
    fn short_extent_is_left_alone_without_fix_on() {
        let mut world = MockWorld::new(16, 8);
        let sb = world.superblock();
        setup(&mut world, &sb, 3);

        let cfg = Config::default();
        let (res, faults) = check(&mut world, &sb, &cfg);
        assert!(res.is_ok());
        assert_eq!(faults.count_for(Domain::Inode), 1);

        let mut reread = zeroed_block();
        world.device.read_block(&mut reread, (sb.main_blkaddr + 50) as u64).unwrap();
        let untouched = Inode::parse(&reread);
        assert_eq!(untouched.i_ext.len, 3);
    }

    /// Spec §8 scenario 5: a directory's fscrypt context is corrupt, its own
    /// parent offers nothing, but one of its children carries a verified
    /// encryption xattr — the rebuild should copy that child's context.
    #[test]
    fn corrupt_dir_context_is_rebuilt_from_encrypted_child() {
        use crate::layout::{
            DirEntry, XattrEntry, XattrHeader, ENCRYPT, ENCRYPT_CORRUPT, ENCRYPT_FIXED, ENCRYPTION_NAME_INDEX,
            FSCRYPT_CTX_SIZE, INLINE_DENTRY, SLOT_LEN,
        };

        let mut world = MockWorld::new(16, 8);
        let sb = world.superblock();
        let root = sb.root_ino;

        // Child regular-file inode (nid 4) with a verified encryption xattr.
        let child_value = vec![9u8; FSCRYPT_CTX_SIZE];
        let child_header = XattrHeader {
            magic: crate::layout::XATTR_MAGIC,
            refcount: 1,
            h_ctx_crc: crate::hash::crc32(&child_value),
        };
        let child_entry = XattrEntry {
            name_index: ENCRYPTION_NAME_INDEX,
            name_len: 0,
            value_size: FSCRYPT_CTX_SIZE as u16,
            name: Vec::new(),
            value: child_value,
        };
        let mut child_inline_xattr = vec![0u8; INLINE_XATTR_SIZE];
        crate::layout::write_xattr_region(&mut child_inline_xattr, &child_header, std::slice::from_ref(&child_entry));

        let child_blkaddr = sb.main_blkaddr + 60;
        world.set_node_info(4, NodeInfo { ino: 4, blk_addr: child_blkaddr, version: 0 });
        let child_inode = Inode {
            footer: NodeFooter { nid: 4, ino: 4, flag: 0 },
            i_mode: 0o100000,
            i_links: 1,
            i_size: 0,
            i_blocks: 1,
            i_pino: root,
            i_ext: Default::default(),
            i_inline: ENCRYPT,
            i_namelen: 0,
            i_name: [0; I_NAME_LEN],
            i_xattr_nid: 0,
            i_nid: [0; NIDS_PER_INODE],
            i_addr: vec![0u32; ADDRS_PER_INODE],
            inline_data: Vec::new(),
            inline_dentry: Vec::new(),
            inline_xattr: child_inline_xattr,
        };
        let mut child_raw = zeroed_block();
        child_inode.write(&mut child_raw);
        world.write_raw(child_blkaddr as u64, &child_raw);
        let child_seg = sb.segno_of(child_blkaddr);
        world.seg_type(child_seg, SegType::HotNode);
        world.mark_sit_valid(child_seg, sb.offset_in_seg(child_blkaddr) as usize);
        world.summary_entry(
            child_seg,
            sb.offset_in_seg(child_blkaddr) as usize,
            crate::collab::Summary { nid: 4, version: 0, ofs_in_node: 0 },
        );

        // Directory inode (nid == root) with a single inline dentry slot
        // pointing at the child, its own xattr region empty (no context),
        // and the corrupt advisory set.
        let dir_blkaddr = sb.main_blkaddr + 61;
        world.set_node_info(root, NodeInfo { ino: root, blk_addr: dir_blkaddr, version: 0 });
        let mut dentry = DentryBlock {
            bitmap: vec![0u8; crate::layout::NR_INLINE_DENTRY.div_ceil(8)],
            entries: vec![DirEntry::default(); crate::layout::NR_INLINE_DENTRY],
            names: vec![[0u8; SLOT_LEN]; crate::layout::NR_INLINE_DENTRY],
        };
        let name = b"child";
        dentry.entries[0] = DirEntry {
            hash: crate::hash::dentry_hash(name),
            ino: 4,
            name_len: name.len() as u16,
            file_type: FileKind::Reg.to_dentry_type(),
        };
        dentry.names[0][..name.len()].copy_from_slice(name);
        dentry.set_present(0, true);
        let mut inline_dentry_buf =
            vec![0u8; crate::layout::INLINE_DENTRY_NAME_OFFSET + crate::layout::INLINE_DENTRY_NAME_LEN];
        dentry.write_inline(&mut inline_dentry_buf);

        let dir_inode = Inode {
            footer: NodeFooter { nid: root, ino: root, flag: 0 },
            i_mode: 0o040000,
            i_links: 2,
            i_size: 0,
            i_blocks: 1,
            i_pino: root,
            i_ext: Default::default(),
            i_inline: INLINE_DENTRY | ENCRYPT_CORRUPT,
            i_namelen: 0,
            i_name: [0; I_NAME_LEN],
            i_xattr_nid: 0,
            i_nid: [0; NIDS_PER_INODE],
            i_addr: vec![0u32; ADDRS_PER_INODE],
            inline_data: Vec::new(),
            inline_dentry: inline_dentry_buf,
            inline_xattr: vec![0u8; INLINE_XATTR_SIZE],
        };
        let mut dir_raw = zeroed_block();
        dir_inode.write(&mut dir_raw);
        world.write_raw(dir_blkaddr as u64, &dir_raw);
        let dir_seg = sb.segno_of(dir_blkaddr);
        world.seg_type(dir_seg, SegType::HotNode);
        world.mark_sit_valid(dir_seg, sb.offset_in_seg(dir_blkaddr) as usize);
        world.summary_entry(
            dir_seg,
            sb.offset_in_seg(dir_blkaddr) as usize,
            crate::collab::Summary { nid: root, version: 0, ofs_in_node: 0 },
        );

        let mut bitmaps = ShadowBitmaps::new(sb.blocks_per_seg, sb.main_blkaddr, 16 * 8, 64);
        let mut cfg = Config::default();
        cfg.fix_on = true;
        let mut faults = FaultLog::default();
        let mut hardlinks = HardLinkLedger::default();
        let mut counters = Counters::default();
        let mut blk_cnt = 0u64;
        let res = check_node(
            &sb,
            &mut world.meta,
            &mut world.device,
            &mut bitmaps,
            &cfg,
            &mut faults,
            &mut hardlinks,
            &mut counters,
            root,
            FileKind::Dir,
            NodeKind::Inode,
            &mut blk_cnt,
            0,
            None,
        );
        assert!(res.is_ok());

        let mut reread = zeroed_block();
        world.device.read_block(&mut reread, dir_blkaddr as u64).unwrap();
        let fixed_dir = Inode::parse(&reread);
        assert!(fixed_dir.has_flag(ENCRYPT_FIXED));
        assert!(!fixed_dir.has_flag(ENCRYPT_CORRUPT));

        let (header, entries, _) = crate::layout::parse_xattr_region(&fixed_dir.inline_xattr);
        let header = header.unwrap();
        let rebuilt = entries.iter().find(|e| e.is_encryption_context()).unwrap();
        assert_eq!(rebuilt.value, vec![9u8; FSCRYPT_CTX_SIZE]);
        assert_eq!(header.h_ctx_crc, crate::hash::crc32(&vec![9u8; FSCRYPT_CTX_SIZE]));
    }
}
