//! The reconciliation context (spec §9's "explicit context" design note):
//! owns the shadow bitmaps, fault log and hard-link ledger across the
//! whole run and drives C7's walk, C9's global checks and C10's repair
//! writer in sequence.

use crate::bitmap::ShadowBitmaps;
use crate::collab::{Device, Metadata};
use crate::config::Config;
use crate::fault::FaultLog;
use crate::hardlink::HardLinkLedger;
use crate::layout::{FileKind, NodeKind, Superblock};
use crate::repair::CpSlot;

/// Running totals the walk accumulates and the reconciler cross-checks
/// against NAT/SIT/CP counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct Counters {
    pub valid_inode_count: u32,
    pub valid_node_count: u32,
    pub valid_block_count: u64,
}

pub struct Checker<D: Device, M: Metadata> {
    pub sb: Superblock,
    pub device: D,
    pub meta: M,
    pub bitmaps: ShadowBitmaps,
    pub cfg: Config,
    pub faults: FaultLog,
    pub hardlinks: HardLinkLedger,
    pub counters: Counters,
    pub cp_slot: CpSlot,
}

impl<D: Device, M: Metadata> Checker<D, M> {
    pub fn new(
        sb: Superblock,
        device: D,
        meta: M,
        cfg: Config,
        main_block_count: usize,
        nat_entry_count: usize,
        cp_slot: CpSlot,
    ) -> Self {
        let bitmaps = ShadowBitmaps::new(sb.blocks_per_seg, sb.main_blkaddr, main_block_count, nat_entry_count);
        Checker {
            sb,
            device,
            meta,
            bitmaps,
            cfg,
            faults: FaultLog::default(),
            hardlinks: HardLinkLedger::default(),
            counters: Counters::default(),
            cp_slot,
        }
    }

    /// Seeds the NAT shadow bitmap from every nid the metadata collaborator
    /// knows about, so the walk can clear bits as it reaches them and the
    /// reconciler (C9) can report anything left set as unreachable.
    pub fn seed_nat(&mut self, known_nids: impl IntoIterator<Item = u32>) {
        self.bitmaps.seed_nat(known_nids);
    }

    pub fn seed_sit_segment(&mut self, segno: u32, valid_map: &[u8]) {
        self.bitmaps.seed_sit_segment(segno, valid_map);
    }

    /// Walks the root inode and every orphan inode, returning the exit code
    /// (`0` clean, `1` faults recorded) after running the global reconciler
    /// and, under fix-on, the repair writer.
    pub fn run(&mut self, cp: &mut crate::layout::Checkpoint) -> i32 {
        let root_ino = self.sb.root_ino;
        let mut blk_cnt = 0u64;
        let _ = crate::walker::check_node(
            &self.sb,
            &mut self.meta,
            &mut self.device,
            &mut self.bitmaps,
            &self.cfg,
            &mut self.faults,
            &mut self.hardlinks,
            &mut self.counters,
            root_ino,
            FileKind::Dir,
            NodeKind::Inode,
            &mut blk_cnt,
            0,
            None,
        );

        if cp.has_orphans() {
            crate::orphan::sweep(
                &self.sb,
                &mut self.meta,
                &mut self.device,
                &mut self.bitmaps,
                &self.cfg,
                &mut self.faults,
                &mut self.hardlinks,
                &mut self.counters,
            );
        }

        crate::reconcile::verify(&self.sb, &self.meta, &self.bitmaps, &self.cfg, &mut self.faults, &self.counters, cp);

        if self.cfg.may_write() && !self.faults.is_empty() {
            crate::repair::fix_checkpoint(
                &self.sb,
                &mut self.meta,
                &mut self.device,
                &self.bitmaps,
                &self.hardlinks,
                &self.counters,
                cp,
                self.cp_slot,
            );
        }

        if self.faults.is_empty() {
            0
        } else {
            1
        }
    }
}
