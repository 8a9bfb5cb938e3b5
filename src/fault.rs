//! The error sink (spec §6): a concrete fault accumulator rather than a
//! trait. Nothing in the teacher's tree treats its `error()`/logging sink
//! as swappable, and the design notes in §9 call for fault accumulation to
//! be owned directly by the reconciliation context.

use std::fmt;

/// One domain per component that can raise a fault, used only for grouping
/// in the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Nid,
    Ssa,
    HardLink,
    Xattr,
    Dentry,
    Inode,
    Orphan,
    Meta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum FaultCode {
    InvalidNid,
    InoIsZero,
    BlkaddrIsNewAddr,
    NodeInvalidBlkaddr,
    InodeFooterInoNotEqualNid,
    NodeInoNotEqualFooterIno,
    NonInodeFooterInoEqualNid,
    NodeNidNotEqualFooterNid,
    InvalidXattrOffset,
    DuplicateNodeBlkaddrInMainBitmap,
    DuplicateOrphanOrXattrNid,
    InvalidSumNodeBlock,
    NatBlkaddrOutSitBitmap,
    InvalidSumDataBlock,
    DuplicateDataBlkaddrInMainBitmap,
    InvalidHashCode,
    InvalidFtype,
    NameLenIsZero,
    InlineDataAddr0NotZero,
    InlineDataInexistence,
    InvalidInlineDentry,
    InvalidExtentValue,
    InvalidIBlocks,
    InvalidILinks,
    LostDotOrDotdot,
    HardLinkNumIsError,
    OrphanInodeHasILinks,
    OrphanInodeError,
    SitTypeIsError,
    SitSegmentCountMismatchWithTotal,
    NatNodeCountMismatchWithSit,
    SitFreesegCountMismatchWithCp,
    NatNodeCountMismatchWithCp,
    NatInodeCountMismatchWithCp,
    NatInoOutNatBitmap,
    CurNextBlkIsNotFree,
    LfsHasNoFreeSection,
    NidIsUnreachable,
    NidHasMoreUnreachableLinks,
    InodeMismatchMode,
    MissingInlineXattr,
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Fault {
    pub domain: Domain,
    pub code: FaultCode,
    /// `nid` or `blkaddr` the fault concerns, when applicable.
    pub subject: u32,
}

/// The accumulating error sink: `DMD_ADD_ERROR(domain, code)`.
#[derive(Debug, Clone, Default)]
pub struct FaultLog {
    faults: Vec<Fault>,
}

impl FaultLog {
    pub fn record(&mut self, domain: Domain, code: FaultCode, subject: u32) {
        self.faults.push(Fault { domain, code, subject });
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fault> {
        self.faults.iter()
    }

    pub fn count_for(&self, domain: Domain) -> usize {
        self.faults.iter().filter(|f| f.domain == domain).count()
    }
}
