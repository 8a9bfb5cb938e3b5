//! Hard-link ledger (C4). The source threads a manually-sorted singly
//! linked list; per §9's "cyclic/linked structures → arena or owned list"
//! note this is modeled as a `BTreeMap` keyed by nid, iterated in reverse
//! to reproduce the descending-nid ordering used for reporting.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
pub struct HardLinkEntry {
    pub expected_links: u32,
    pub actual_links: u32,
}

#[derive(Debug, Clone, Default)]
pub struct HardLinkLedger {
    entries: BTreeMap<u32, HardLinkEntry>,
}

impl HardLinkLedger {
    /// First encounter of a regular inode with `i_links > 1`.
    pub fn open(&mut self, nid: u32, i_links: u32) {
        self.entries.insert(
            nid,
            HardLinkEntry {
                expected_links: i_links,
                actual_links: 1,
            },
        );
    }

    /// A subsequent dentry reference to `nid`. Returns `false` if no open
    /// record exists (the referral does not match any known multi-link
    /// inode — a corrupt `i_links`).
    pub fn refer(&mut self, nid: u32) -> bool {
        let Some(entry) = self.entries.get_mut(&nid) else {
            return false;
        };
        entry.actual_links += 1;
        entry.expected_links -= 1;
        if entry.expected_links <= 1 {
            self.entries.remove(&nid);
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates surviving (unresolved) records, highest nid first.
    pub fn unresolved(&self) -> impl Iterator<Item = (u32, HardLinkEntry)> + '_ {
        self.entries.iter().rev().map(|(&nid, &e)| (nid, e))
    }

    pub fn take(&mut self) -> BTreeMap<u32, HardLinkEntry> {
        std::mem::take(&mut self.entries)
    }
}
