//! Orphan-inode sweeper (C8): walks the orphan-list blocks that precede the
//! summary area when the checkpoint carries the orphan-present flag.

use crate::bitmap::ShadowBitmaps;
use crate::collab::{Device, Metadata};
use crate::config::{Config, PreenMode};
use crate::context::Counters;
use crate::fault::{Domain, FaultCode, FaultLog};
use crate::hardlink::HardLinkLedger;
use crate::layout::{zeroed_block, FileKind, NodeKind, Superblock};

/// Number of orphan inode numbers a single 4 KiB orphan block can hold,
/// one `u32` count header followed by a flat array of `u32` ino values.
const ORPHANS_PER_BLOCK: usize = (crate::layout::BLOCK_SIZE - 4) / 4;

fn orphan_block_addr(sb: &Superblock, i: u32) -> u64 {
    sb.cp_blkaddr as u64 + 1 + sb.cp_payload as u64 + i as u64
}

/// Sweeps every orphan block recorded by the checkpoint. In preen mode
/// (`PreenMode::Mode1`), the first invalid entry aborts the whole scan
/// immediately without attempting repair, matching upstream's fast-fail
/// `-EINVAL` behavior. Otherwise each entry is validated through C7 with
/// file kind `Orphan`; failing entries are dropped and, under fix-on, the
/// block is rewritten with a compacted count.
#[allow(clippy::too_many_arguments)]
pub fn sweep(
    sb: &Superblock,
    meta: &mut dyn Metadata,
    device: &mut dyn Device,
    bitmaps: &mut ShadowBitmaps,
    cfg: &Config,
    faults: &mut FaultLog,
    hardlinks: &mut HardLinkLedger,
    counters: &mut Counters,
) -> Result<(), ()> {
    let mut i = 0u32;
    loop {
        let blkaddr = orphan_block_addr(sb, i);
        let mut raw = zeroed_block();
        if device.read_block(&mut raw, blkaddr).is_err() {
            break;
        }
        let count = u32::from_le_bytes(raw[0..4].try_into().unwrap()) as usize;
        if count == 0 {
            break;
        }
        let count = count.min(ORPHANS_PER_BLOCK);

        let mut survivors = Vec::with_capacity(count);
        for slot in 0..count {
            let off = 4 + slot * 4;
            let ino = u32::from_le_bytes(raw[off..off + 4].try_into().unwrap());
            if ino == 0 {
                continue;
            }

            let mut blk_cnt = 0u64;
            let result = crate::walker::check_node(
                sb,
                meta,
                device,
                bitmaps,
                cfg,
                faults,
                hardlinks,
                counters,
                ino,
                FileKind::Orphan,
                NodeKind::Inode,
                &mut blk_cnt,
                0,
                None,
            );

            match result {
                Ok(_) => survivors.push(ino),
                Err(()) => {
                    faults.record(Domain::Orphan, FaultCode::OrphanInodeError, ino);
                    if cfg.preen_mode == PreenMode::Mode1 {
                        return Err(());
                    }
                }
            }
        }

        if cfg.may_write() && survivors.len() != count {
            let mut out = zeroed_block();
            out[0..4].copy_from_slice(&(survivors.len() as u32).to_le_bytes());
            for (slot, ino) in survivors.iter().enumerate() {
                let off = 4 + slot * 4;
                out[off..off + 4].copy_from_slice(&ino.to_le_bytes());
            }
            let _ = device.write_block(&out, blkaddr);
        }

        i += 1;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collab::NodeInfo;
    use crate::layout::{Inode, NodeFooter, I_NAME_LEN, NIDS_PER_INODE, ADDRS_PER_INODE, INLINE_XATTR_SIZE};
    use crate::mock::MockWorld;

    fn write_orphan_inode(world: &mut MockWorld, sb: &Superblock, ino: u32, i_links: u32) {
        world.set_node_info(
            ino,
            NodeInfo {
                ino,
                blk_addr: sb.main_blkaddr + ino,
                version: 0,
            },
        );
        let mut raw = zeroed_block();
        let inode = Inode {
            footer: NodeFooter { nid: ino, ino, flag: 0 },
            i_mode: 0o100000,
            i_links,
            i_size: 0,
            i_blocks: 0,
            i_pino: 0,
            i_ext: Default::default(),
            i_inline: 0,
            i_namelen: 0,
            i_name: [0; I_NAME_LEN],
            i_xattr_nid: 0,
            i_nid: [0; NIDS_PER_INODE],
            i_addr: vec![0u32; ADDRS_PER_INODE],
            inline_data: Vec::new(),
            inline_dentry: Vec::new(),
            inline_xattr: vec![0u8; INLINE_XATTR_SIZE],
        };
        inode.write(&mut raw);
        world.write_raw((sb.main_blkaddr + ino) as u64, &raw);
    }

    #[test]
    fn orphan_with_nonzero_links_is_fixed_under_fix_on() {
        let mut world = MockWorld::new(16, 8);
        let sb = world.superblock();
        world.mark_sit_valid(sb.segno_of(sb.main_blkaddr + 7), sb.offset_in_seg(sb.main_blkaddr + 7) as usize);
        world.seg_type(sb.segno_of(sb.main_blkaddr + 7), crate::layout::SegType::HotNode);
        write_orphan_inode(&mut world, &sb, 7, 3);

        let mut raw = zeroed_block();
        raw[0..4].copy_from_slice(&1u32.to_le_bytes());
        raw[4..8].copy_from_slice(&7u32.to_le_bytes());
        world.write_raw(orphan_block_addr(&sb, 0), &raw);

        let mut bitmaps = ShadowBitmaps::new(16, sb.main_blkaddr, 16 * 8, 16);
        let mut cfg = Config::default();
        cfg.fix_on = true;
        let mut faults = FaultLog::default();
        let mut hardlinks = HardLinkLedger::default();
        let mut counters = Counters::default();

        let res = sweep(&sb, &mut world.meta, &mut world.device, &mut bitmaps, &cfg, &mut faults, &mut hardlinks, &mut counters);
        assert!(res.is_ok());
        assert_eq!(faults.count_for(Domain::Orphan), 1);

        let mut reread = zeroed_block();
        world.device.read_block(&mut reread, sb.main_blkaddr as u64 + 7).unwrap();
        let fixed = Inode::parse(&reread);
        assert_eq!(fixed.i_links, 0);
    }

    #[test]
    fn preen_mode_aborts_on_first_invalid_entry() {
        let mut world = MockWorld::new(16, 8);
        let sb = world.superblock();
        // Nid 9 has no NAT entry at all: sanity_check_nid will fail.
        let mut raw = zeroed_block();
        raw[0..4].copy_from_slice(&1u32.to_le_bytes());
        raw[4..8].copy_from_slice(&9u32.to_le_bytes());
        world.write_raw(orphan_block_addr(&sb, 0), &raw);

        let mut bitmaps = ShadowBitmaps::new(16, sb.main_blkaddr, 16 * 8, 16);
        let mut cfg = Config::default();
        cfg.preen_mode = PreenMode::Mode1;
        let mut faults = FaultLog::default();
        let mut hardlinks = HardLinkLedger::default();
        let mut counters = Counters::default();

        let res = sweep(&sb, &mut world.meta, &mut world.device, &mut bitmaps, &cfg, &mut faults, &mut hardlinks, &mut counters);
        assert!(res.is_err());
    }
}
