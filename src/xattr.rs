//! Xattr & encryption rebuilder (C5): inline+external xattr parsing and
//! fscrypt context repair.
//!
//! Preserves two source quirks named by spec §9's open questions rather
//! than "fixing" them:
//! - [`rebuild_encrypt_inline`] always reports failure, even when the
//!   inline rewrite itself succeeded, so its caller always detaches any
//!   external xattr block on that path.
//! - [`fsck_chk_encrypt`]-equivalent logic only ever consults the
//!   candidate-search path when the corrupt advisory bit is set, and
//!   unconditionally clears it afterward; the early-return is kept
//!   structurally visible rather than collapsed away.

use crate::layout::{
    parse_xattr_region, write_xattr_region, Inode, XattrEntry, XattrHeader, ENCRYPT_CORRUPT, ENCRYPT_FIXED,
    INLINE_XATTR_SIZE, XATTR_HEADER_LEN, XATTR_MAGIC,
};

/// Result of validating an inode's xattr region.
pub struct XattrValidation {
    pub header: XattrHeader,
    pub entries: Vec<XattrEntry>,
    pub truncated: bool,
}

/// Validates and, under fix-on, repairs the concatenated inline+external
/// xattr buffer. `external` is the external xattr block's payload bytes
/// (empty if `i_xattr_nid == 0`).
pub fn validate_and_rewrite(inode: &mut Inode, external: &[u8], fix_on: bool) -> XattrValidation {
    let mut combined = inode.inline_xattr.clone();
    combined.extend_from_slice(external);

    let (header, mut entries, valid_len) = parse_xattr_region(&combined);
    let mut header = header.unwrap_or(XattrHeader {
        magic: XATTR_MAGIC,
        refcount: 1,
        h_ctx_crc: 0,
    });

    let bad_magic = header.magic != XATTR_MAGIC || header.refcount != 1;
    let truncated = bad_magic || valid_len < combined.len();

    if bad_magic {
        header.magic = XATTR_MAGIC;
        header.refcount = 1;
    }
    if truncated && fix_on {
        // Keep only entries that fit back into the inline region; the
        // external block is dropped on truncation rather than partially
        // rewritten.
        let mut kept = Vec::new();
        let mut used = XATTR_HEADER_LEN;
        for e in entries.drain(..) {
            let len = e.encoded_len();
            if used + len > INLINE_XATTR_SIZE {
                break;
            }
            used += len;
            kept.push(e);
        }
        entries = kept;
        let mut buf = vec![0u8; INLINE_XATTR_SIZE];
        write_xattr_region(&mut buf, &header, &entries);
        inode.inline_xattr = buf;
        if !external.is_empty() {
            inode.i_xattr_nid = 0;
        }
    }

    XattrValidation {
        header,
        entries,
        truncated,
    }
}

/// CRC over the encryption-context entry's value must agree with the
/// header's `h_ctx_crc` for the entry to be trusted as a rebuild source.
pub fn verify_encryption_entry(header: &XattrHeader, entry: &XattrEntry) -> bool {
    entry.is_encryption_context() && crate::hash::crc32(&entry.value) == header.h_ctx_crc
}

fn used_len(header_present: bool, entries: &[XattrEntry]) -> usize {
    (if header_present { XATTR_HEADER_LEN } else { 0 }) + entries.iter().map(|e| e.encoded_len()).sum::<usize>()
}

/// Whether `entry` can be appended to the inode's current inline xattr
/// region without exceeding its fixed budget.
pub fn may_append_xattr(current: &XattrValidation, entry: &XattrEntry) -> bool {
    used_len(true, &current.entries) + entry.encoded_len() <= INLINE_XATTR_SIZE
}

/// Appends `entry` to the inode's inline xattr region.
pub fn append_encrypt_xattr(inode: &mut Inode, current: &XattrValidation, entry: XattrEntry) {
    let mut entries = current.entries.clone();
    entries.push(entry);
    let mut buf = vec![0u8; INLINE_XATTR_SIZE];
    write_xattr_region(&mut buf, &current.header, &entries);
    inode.inline_xattr = buf;
}

/// Replaces any existing encryption-context entry in place, keeping other
/// entries untouched.
pub fn replace_encrypt_xattr(inode: &mut Inode, current: &XattrValidation, entry: XattrEntry) {
    let mut entries: Vec<XattrEntry> = current
        .entries
        .iter()
        .filter(|e| !e.is_encryption_context())
        .cloned()
        .collect();
    entries.push(entry);
    let mut buf = vec![0u8; INLINE_XATTR_SIZE];
    write_xattr_region(&mut buf, &current.header, &entries);
    inode.inline_xattr = buf;
}

/// Rebuilds the inline xattr header from scratch with a single encryption
/// entry. Always returns `Err`, even on success — see the module docs'
/// Open Question note; callers must detach any external xattr block on
/// this path regardless of whether the inline rewrite itself succeeded.
pub fn rebuild_encrypt_inline(inode: &mut Inode, entry: &XattrEntry) -> Result<(), ()> {
    let header = XattrHeader {
        magic: XATTR_MAGIC,
        refcount: 1,
        h_ctx_crc: crate::hash::crc32(&entry.value),
    };
    let mut buf = vec![0u8; INLINE_XATTR_SIZE];
    write_xattr_region(&mut buf, &header, std::slice::from_ref(entry));
    inode.inline_xattr = buf;
    Err(())
}

/// Rebuilds `inode`'s fscrypt context from a verified `candidate` entry
/// found by the walker (either the parent directory's own xattrs, or —
/// when the inode itself is a directory and the parent had none — the
/// first non-corrupt encrypted child's xattrs). Returns whether a rebuild
/// was performed.
pub fn rebuild_encrypt(
    inode: &mut Inode,
    current: &XattrValidation,
    candidate: Option<(&XattrHeader, &XattrEntry)>,
) -> bool {
    let Some((src_header, src_entry)) = candidate else {
        return false;
    };
    if !verify_encryption_entry(src_header, src_entry) {
        return false;
    }

    let has_existing_encrypt = current.entries.iter().any(|e| e.is_encryption_context());
    let detach_external = if has_existing_encrypt {
        replace_encrypt_xattr(inode, current, src_entry.clone());
        false
    } else if may_append_xattr(current, src_entry) {
        append_encrypt_xattr(inode, current, src_entry.clone());
        false
    } else {
        rebuild_encrypt_inline(inode, src_entry).is_err()
    };

    if detach_external {
        inode.i_xattr_nid = 0;
    }
    inode.set_flag(ENCRYPT_FIXED);
    inode.clear_flag(ENCRYPT_CORRUPT);
    true
}

/// Extracts `inode`'s own encryption xattr entry, if it carries one that
/// passes the CRC check and the inode is not itself flagged corrupt. This is
/// what a parent directory offers its children (or a child offers its
/// parent, for C5 step 2) as a rebuild source.
pub fn own_encrypt_candidate(inode: &Inode) -> Option<(XattrHeader, XattrEntry)> {
    if inode.has_flag(ENCRYPT_CORRUPT) {
        return None;
    }
    let (header, entries, _) = crate::layout::parse_xattr_region(&inode.inline_xattr);
    let header = header?;
    let entry = entries.into_iter().find(|e| e.is_encryption_context())?;
    verify_encryption_entry(&header, &entry).then_some((header, entry))
}

/// Mirrors `fsck_chk_encrypt`: only ever looks for a rebuild candidate when
/// the corrupt advisory bit is set. The bit is unconditionally cleared
/// afterward even if no candidate was found (matching the source's
/// unreachable tail after its `goto skip_chk_encrypt`), since a repeated
/// run must not re-attempt the same rebuild forever.
pub fn check_encrypt(
    inode: &mut Inode,
    current: &XattrValidation,
    candidate: Option<(&XattrHeader, &XattrEntry)>,
) -> bool {
    if inode.has_flag(ENCRYPT_CORRUPT) {
        let fixed = rebuild_encrypt(inode, current, candidate);
        if !fixed {
            // Unreachable in practice once a candidate is always supplied
            // by the walker for directories with children, but kept
            // explicit: clearing happens on every path, fixed or not.
            inode.clear_flag(ENCRYPT_CORRUPT);
        }
        return fixed;
    }
    false
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layout::{zeroed_block, NodeFooter, NIDS_PER_INODE, I_NAME_LEN, ADDRS_PER_INODE};

    fn blank_inode() -> Inode {
        Inode {
            footer: NodeFooter { nid: 5, ino: 5, flag: 0 },
            i_mode: 0o100000,
            i_links: 1,
            i_size: 0,
            i_blocks: 0,
            i_pino: 3,
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
        }
    }

    #[test]
    fn bad_magic_is_rebuilt_under_fix_on() {
        let mut inode = blank_inode();
        inode.inline_xattr[0] = 0xff; // corrupt magic
        let v = validate_and_rewrite(&mut inode, &[], true);
        assert!(v.truncated);
        let v2 = validate_and_rewrite(&mut inode, &[], false);
        assert_eq!(v2.header.magic, XATTR_MAGIC);
    }

    #[test]
    fn rebuild_encrypt_inline_always_reports_error() {
        let mut inode = blank_inode();
        let entry = XattrEntry {
            name_index: crate::layout::ENCRYPTION_NAME_INDEX,
            name_len: 0,
            value_size: crate::layout::FSCRYPT_CTX_SIZE as u16,
            name: Vec::new(),
            value: vec![7u8; crate::layout::FSCRYPT_CTX_SIZE],
        };
        let result = rebuild_encrypt_inline(&mut inode, &entry);
        assert!(result.is_err());
        let mut buf = zeroed_block();
        inode.write(&mut buf);
        let reparsed = Inode::parse(&buf);
        let (_, entries, _) = parse_xattr_region(&reparsed.inline_xattr);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_encryption_context());
    }

    #[test]
    fn rebuild_encrypt_sets_fixed_and_clears_corrupt() {
        let mut inode = blank_inode();
        inode.set_flag(ENCRYPT_CORRUPT);
        let current = validate_and_rewrite(&mut inode, &[], false);
        let src_header = XattrHeader {
            magic: XATTR_MAGIC,
            refcount: 1,
            h_ctx_crc: crate::hash::crc32(&[9u8; crate::layout::FSCRYPT_CTX_SIZE]),
        };
        let src_entry = XattrEntry {
            name_index: crate::layout::ENCRYPTION_NAME_INDEX,
            name_len: 0,
            value_size: crate::layout::FSCRYPT_CTX_SIZE as u16,
            name: Vec::new(),
            value: vec![9u8; crate::layout::FSCRYPT_CTX_SIZE],
        };
        let fixed = check_encrypt(&mut inode, &current, Some((&src_header, &src_entry)));
        assert!(fixed);
        assert!(inode.has_flag(ENCRYPT_FIXED));
        assert!(!inode.has_flag(ENCRYPT_CORRUPT));
    }
}
