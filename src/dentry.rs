//! Directory-entry checker (C6): operates uniformly over inline dentries
//! and ordinary 4 KiB dentry blocks via the shared [`DentryBlock`] view.

use crate::bitmap::ShadowBitmaps;
use crate::collab::{Device, Metadata};
use crate::config::Config;
use crate::context::Counters;
use crate::fault::{Domain, FaultCode, FaultLog};
use crate::hardlink::HardLinkLedger;
use crate::layout::{DentryBlock, FileKind, NodeKind, Superblock};
use crate::walker::EncryptCandidate;

pub struct DentryCheckOutcome {
    pub need_fix: bool,
    pub child_count: u32,
    pub subdir_count: u32,
    pub dot_count: u32,
    /// Set when `has_dots` was true but fewer than two dot entries survived
    /// the walk (spec §4.6: "fewer than two sets the `INLINE_DOTS` flag for
    /// later repair"). The caller owns the inode and applies the flag.
    pub needs_inline_dots: bool,
    /// The first non-corrupt encrypted child's verified encryption xattr
    /// found while walking this block's entries (spec §4.5 step 2's rebuild
    /// source for an encrypted directory whose parent had none).
    pub first_child_encrypt: Option<EncryptCandidate>,
}

/// `self_ino`/`dot_expected` is the directory's own ino; `dotdot_expected`
/// is the ino `".."` must resolve to (the parent, or the directory's own
/// ino at the root). `parent_candidate` is this directory's own verified
/// encryption xattr, offered to children whose `ENCRYPT_CORRUPT` advisory
/// is set (spec §4.5 step 1).
#[allow(clippy::too_many_arguments)]
pub fn check_dentry_block(
    block: &mut DentryBlock,
    self_ino: u32,
    dotdot_expected: u32,
    has_dots: bool,
    parent_candidate: Option<EncryptCandidate>,
    sb: &Superblock,
    meta: &mut dyn Metadata,
    device: &mut dyn Device,
    bitmaps: &mut ShadowBitmaps,
    cfg: &Config,
    faults: &mut FaultLog,
    hardlinks: &mut HardLinkLedger,
    counters: &mut Counters,
) -> DentryCheckOutcome {
    let mut need_fix = false;
    let mut child_count = 0u32;
    let mut subdir_count = 0u32;
    let mut dot_count = 0u32;
    let mut seen_dot = false;
    let mut seen_dotdot = false;
    let mut first_child_encrypt = None;
    let slots = block.slot_count();

    let mut i = 0usize;
    while i < slots {
        if !block.is_present(i) {
            i += 1;
            continue;
        }
        let entry = block.entries[i];
        let name_slots = block.name_slots(entry.name_len);

        if entry.name_len == 0 || entry.name_len as usize > crate::layout::MAX_NAME_LEN {
            faults.record(Domain::Dentry, FaultCode::NameLenIsZero, entry.ino);
            if cfg.may_write() {
                clear_slots(block, i, name_slots);
                need_fix = true;
            }
            i += name_slots;
            continue;
        }

        if FileKind::from_dentry_type(entry.file_type).is_none() {
            faults.record(Domain::Dentry, FaultCode::InvalidFtype, entry.ino);
            if cfg.may_write() {
                clear_slots(block, i, name_slots);
                need_fix = true;
            }
            i += name_slots;
            continue;
        }

        let name = block.name_bytes(i + 1, entry.name_len);
        let is_dot = name == b".";
        let is_dotdot = name == b"..";

        if is_dot || is_dotdot {
            // A third dot entry (a duplicate "." or "..") is simply
            // deleted under fix-on rather than corrected in place.
            let duplicate = if is_dot { seen_dot } else { seen_dotdot };
            if duplicate {
                faults.record(Domain::Dentry, FaultCode::LostDotOrDotdot, entry.ino);
                if cfg.may_write() {
                    clear_slots(block, i, name_slots);
                    need_fix = true;
                }
                i += name_slots;
                continue;
            }
            if is_dot {
                seen_dot = true;
            } else {
                seen_dotdot = true;
            }
            dot_count += 1;
            let expected_ino = if is_dot { self_ino } else { dotdot_expected };
            if entry.ino != expected_ino {
                faults.record(Domain::Dentry, FaultCode::LostDotOrDotdot, entry.ino);
                if cfg.may_write() {
                    block.entries[i].ino = expected_ino;
                    need_fix = true;
                }
            }
            i += name_slots;
            continue;
        }

        let expected_hash = crate::hash::dentry_hash(&name);
        if entry.hash != expected_hash {
            faults.record(Domain::Dentry, FaultCode::InvalidHashCode, entry.ino);
            if cfg.may_write() {
                block.entries[i].hash = expected_hash;
                need_fix = true;
            }
        }

        let file_kind = FileKind::from_dentry_type(entry.file_type).unwrap();
        let mut blk_cnt = 0u64;
        let child = crate::walker::check_node(
            sb,
            meta,
            device,
            bitmaps,
            cfg,
            faults,
            hardlinks,
            counters,
            entry.ino,
            file_kind,
            NodeKind::Inode,
            &mut blk_cnt,
            self_ino,
            parent_candidate.clone(),
        );

        match child {
            Ok(stats) => {
                child_count += 1;
                if stats.is_dir {
                    subdir_count += 1;
                }
                if first_child_encrypt.is_none() {
                    first_child_encrypt = stats.encrypt_candidate;
                }
            }
            Err(()) => {
                if cfg.may_write() {
                    clear_slots(block, i, name_slots);
                    need_fix = true;
                }
            }
        }

        i += name_slots;
    }

    let mut needs_inline_dots = false;
    if has_dots && dot_count < 2 {
        faults.record(Domain::Dentry, FaultCode::LostDotOrDotdot, self_ino);
        needs_inline_dots = true;
    }

    DentryCheckOutcome {
        need_fix,
        child_count,
        subdir_count,
        dot_count,
        needs_inline_dots,
        first_child_encrypt,
    }
}

fn clear_slots(block: &mut DentryBlock, start: usize, count: usize) {
    for i in start..(start + count).min(block.slot_count()) {
        block.set_present(i, false);
    }
}
