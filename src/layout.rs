//! On-disk type definitions for the log-structured flash-friendly filesystem:
//! superblock/checkpoint constants, the node-block union (inode / direct /
//! indirect / xattr), directory-entry blocks, and the xattr region.
//!
//! Node blocks are read and written as raw 4 KiB buffers. Unlike
//! `mkfs`'s `Superblock`/`BlockGroupDescriptor` (which are plain fixed-size
//! `repr(C, packed)` structs safely reinterpreted in place), a node block is
//! a tagged union on disk — its body means different things depending on
//! the node kind and the inode's inline flags — so it is parsed/serialized
//! through explicit byte offsets rather than a single transmute.

pub const BLOCK_SIZE: usize = 4096;

pub const NULL_ADDR: u32 = 0;
pub const NEW_ADDR: u32 = u32::MAX;

pub const MAX_NAME_LEN: usize = 255;
pub const I_NAME_LEN: usize = 64;
pub const SLOT_LEN: usize = 8;

pub const NODE_FOOTER_LEN: usize = 12;
pub const INODE_HEADER_LEN: usize = 132;
pub const INLINE_XATTR_SIZE: usize = 208;
pub const MAIN_PAYLOAD_LEN: usize = BLOCK_SIZE - NODE_FOOTER_LEN - INODE_HEADER_LEN - INLINE_XATTR_SIZE;
pub const ADDRS_PER_INODE: usize = MAIN_PAYLOAD_LEN / 4;
pub const MAX_INLINE_DATA: usize = MAIN_PAYLOAD_LEN;

pub const ADDRS_PER_BLOCK: usize = (BLOCK_SIZE - NODE_FOOTER_LEN) / 4;
pub const NIDS_PER_BLOCK: usize = (BLOCK_SIZE - NODE_FOOTER_LEN) / 4;

pub const NIDS_PER_INODE: usize = 5;
pub const DIRECT_NID_0: usize = 0;
pub const DIRECT_NID_1: usize = 1;
pub const INDIRECT_NID_0: usize = 2;
pub const INDIRECT_NID_1: usize = 3;
pub const DINDIRECT_NID: usize = 4;

pub const CHECKSUM_OFFSET: usize = BLOCK_SIZE - 4;

pub const NR_DENTRY_IN_BLOCK: usize = 214;
pub const DENTRY_BITMAP_LEN: usize = NR_DENTRY_IN_BLOCK.div_ceil(8);
pub const DENTRY_RESERVED_LEN: usize = 3;
pub const DENTRY_STRUCT_LEN: usize = 11; // hash:u32 + ino:u32 + name_len:u16 + file_type:u8
pub const DENTRY_ARRAY_OFFSET: usize = DENTRY_BITMAP_LEN + DENTRY_RESERVED_LEN;
pub const DENTRY_ARRAY_LEN: usize = NR_DENTRY_IN_BLOCK * DENTRY_STRUCT_LEN;
pub const DENTRY_NAME_OFFSET: usize = DENTRY_ARRAY_OFFSET + DENTRY_ARRAY_LEN;
pub const DENTRY_NAME_LEN: usize = NR_DENTRY_IN_BLOCK * SLOT_LEN;

pub const NR_INLINE_DENTRY: usize = 140;
pub const INLINE_DENTRY_BITMAP_LEN: usize = NR_INLINE_DENTRY.div_ceil(8);
pub const INLINE_DENTRY_ARRAY_OFFSET: usize = INLINE_DENTRY_BITMAP_LEN;
pub const INLINE_DENTRY_ARRAY_LEN: usize = NR_INLINE_DENTRY * DENTRY_STRUCT_LEN;
pub const INLINE_DENTRY_NAME_OFFSET: usize = INLINE_DENTRY_ARRAY_OFFSET + INLINE_DENTRY_ARRAY_LEN;
pub const INLINE_DENTRY_NAME_LEN: usize = NR_INLINE_DENTRY * SLOT_LEN;

pub const XATTR_MAGIC: u32 = 0xF78F_F78F;
pub const XATTR_HEADER_LEN: usize = 16;
pub const XATTR_ENTRY_HEADER_LEN: usize = 4;
pub const ENCRYPTION_NAME_INDEX: u8 = 0x80;
pub const FSCRYPT_CTX_SIZE: usize = 28;

/// Inline-flags bitfield (`Inode.i_inline`).
pub const INLINE_XATTR: u16 = 0x01;
pub const INLINE_DATA: u16 = 0x02;
pub const INLINE_DENTRY: u16 = 0x04;
pub const INLINE_DOTS: u16 = 0x08;
pub const DATA_EXIST: u16 = 0x10;
pub const ENCRYPT: u16 = 0x20;
pub const ENCRYPT_CORRUPT: u16 = 0x40;
pub const ENCRYPT_FIXED: u16 = 0x80;

pub const CP_UMOUNT_FLAG: u32 = 0x1;
pub const CP_ORPHAN_PRESENT_FLAG: u32 = 0x2;

pub type RawBlock = [u8; BLOCK_SIZE];

pub fn zeroed_block() -> RawBlock {
    [0u8; BLOCK_SIZE]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Inode,
    Direct,
    Indirect,
    DoubleIndirect,
    Xattr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Dir,
    Reg,
    Symlink,
    Chrdev,
    Blkdev,
    Fifo,
    Sock,
    Orphan,
    Xattr,
}

impl FileKind {
    /// Maps the on-disk dentry `file_type` byte to a `FileKind`, or `None`
    /// if the byte is not one of the enumerated valid values.
    pub fn from_dentry_type(v: u8) -> Option<Self> {
        Some(match v {
            1 => FileKind::Reg,
            2 => FileKind::Dir,
            3 => FileKind::Chrdev,
            4 => FileKind::Blkdev,
            5 => FileKind::Fifo,
            6 => FileKind::Sock,
            7 => FileKind::Symlink,
            _ => return None,
        })
    }

    pub fn to_dentry_type(self) -> u8 {
        match self {
            FileKind::Reg => 1,
            FileKind::Dir => 2,
            FileKind::Chrdev => 3,
            FileKind::Blkdev => 4,
            FileKind::Fifo => 5,
            FileKind::Sock => 6,
            FileKind::Symlink => 7,
            FileKind::Orphan | FileKind::Xattr => 0,
        }
    }

    /// Cross-checks an inode's `i_mode` (POSIX `S_IF*` bits) against the
    /// file kind the caller expected it to be.
    pub fn matches_mode(self, mode: u32) -> bool {
        const S_IFMT: u32 = 0o170000;
        let expect = match self {
            FileKind::Dir => 0o040000,
            FileKind::Reg => 0o100000,
            FileKind::Symlink => 0o120000,
            FileKind::Chrdev => 0o020000,
            FileKind::Blkdev => 0o060000,
            FileKind::Fifo => 0o010000,
            FileKind::Sock => 0o140000,
            FileKind::Orphan | FileKind::Xattr => return true,
        };
        (mode & S_IFMT) == expect
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegType {
    NoCheck,
    HotNode,
    WarmNode,
    ColdNode,
    HotData,
    WarmData,
    ColdData,
}

impl SegType {
    pub fn is_node(self) -> bool {
        matches!(self, SegType::HotNode | SegType::WarmNode | SegType::ColdNode)
    }

    pub fn is_data(self) -> bool {
        matches!(self, SegType::HotData | SegType::WarmData | SegType::ColdData)
    }

    /// The coarse node-vs-data axis; two types "agree" on axis even if the
    /// hot/warm/cold sub-class differs (a benign temperature downgrade).
    pub fn same_axis(self, other: SegType) -> bool {
        self.is_node() == other.is_node() && self.is_data() == other.is_data()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub blocks_per_seg: u32,
    pub log_blocks_per_seg: u32,
    pub segment_count: u32,
    pub main_blkaddr: u32,
    pub nat_blkaddr: u32,
    pub sit_blkaddr: u32,
    pub ssa_blkaddr: u32,
    pub cp_blkaddr: u32,
    pub cp_payload: u32,
    pub root_ino: u32,
}

impl Superblock {
    pub fn main_area_blocks(&self) -> u64 {
        self.segment_count as u64 * self.blocks_per_seg as u64
    }

    pub fn segno_of(&self, blkaddr: u32) -> u32 {
        (blkaddr - self.main_blkaddr) / self.blocks_per_seg
    }

    pub fn offset_in_seg(&self, blkaddr: u32) -> u32 {
        (blkaddr - self.main_blkaddr) % self.blocks_per_seg
    }

    /// Absolute block address of the SSA summary block covering `segno`,
    /// mirroring upstream's `GET_SUM_BLKADDR`.
    pub fn sum_blkaddr(&self, segno: u32) -> u32 {
        self.ssa_blkaddr + segno
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Checkpoint {
    pub free_segment_count: u32,
    pub valid_block_count: u64,
    pub valid_node_count: u32,
    pub valid_inode_count: u32,
    pub ckpt_flags: u32,
    pub cur_node_segno: [u32; 3],
    pub cur_data_segno: [u32; 3],
    pub checksum: u32,
}

impl Checkpoint {
    pub fn has_orphans(&self) -> bool {
        self.ckpt_flags & CP_ORPHAN_PRESENT_FLAG != 0
    }

    /// Parses a checkpoint block, including the trailing CRC at
    /// `CHECKSUM_OFFSET` written by C10's repair writer.
    pub fn parse(buf: &RawBlock) -> Self {
        let mut p = 0usize;
        let free_segment_count = read_u32(buf, &mut p);
        let valid_block_count = read_u64(buf, &mut p);
        let valid_node_count = read_u32(buf, &mut p);
        let valid_inode_count = read_u32(buf, &mut p);
        let ckpt_flags = read_u32(buf, &mut p);
        let mut cur_node_segno = [0u32; 3];
        for s in cur_node_segno.iter_mut() {
            *s = read_u32(buf, &mut p);
        }
        let mut cur_data_segno = [0u32; 3];
        for s in cur_data_segno.iter_mut() {
            *s = read_u32(buf, &mut p);
        }
        let checksum = u32::from_le_bytes(buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].try_into().unwrap());
        Checkpoint {
            free_segment_count,
            valid_block_count,
            valid_node_count,
            valid_inode_count,
            ckpt_flags,
            cur_node_segno,
            cur_data_segno,
            checksum,
        }
    }

    /// Serializes the counters/flags/curseg header; the caller writes the
    /// CRC at `CHECKSUM_OFFSET` separately once the rest of the block (and
    /// any payload/orphan/summary blocks it depends on) is finalized.
    pub fn write(&self, buf: &mut RawBlock) {
        let mut p = 0usize;
        write_u32(buf, &mut p, self.free_segment_count);
        write_u64(buf, &mut p, self.valid_block_count);
        write_u32(buf, &mut p, self.valid_node_count);
        write_u32(buf, &mut p, self.valid_inode_count);
        write_u32(buf, &mut p, self.ckpt_flags);
        for segno in self.cur_node_segno {
            write_u32(buf, &mut p, segno);
        }
        for segno in self.cur_data_segno {
            write_u32(buf, &mut p, segno);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeFooter {
    pub nid: u32,
    pub ino: u32,
    /// Low bits: offset of this node within its inode's address space.
    /// High bit: set for xattr nodes.
    pub flag: u32,
}

const XATTR_FLAG_BIT: u32 = 1 << 31;

impl NodeFooter {
    pub fn is_xattr(&self) -> bool {
        self.flag & XATTR_FLAG_BIT != 0
    }

    pub fn offset_in_node(&self) -> u32 {
        self.flag & !XATTR_FLAG_BIT
    }

    pub fn parse(buf: &RawBlock) -> Self {
        let off = BLOCK_SIZE - NODE_FOOTER_LEN;
        NodeFooter {
            nid: u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()),
            ino: u32::from_le_bytes(buf[off + 4..off + 8].try_into().unwrap()),
            flag: u32::from_le_bytes(buf[off + 8..off + 12].try_into().unwrap()),
        }
    }

    pub fn write(&self, buf: &mut RawBlock) {
        let off = BLOCK_SIZE - NODE_FOOTER_LEN;
        buf[off..off + 4].copy_from_slice(&self.nid.to_le_bytes());
        buf[off + 4..off + 8].copy_from_slice(&self.ino.to_le_bytes());
        buf[off + 8..off + 12].copy_from_slice(&self.flag.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Extent {
    pub fofs: u32,
    pub blkaddr: u32,
    pub len: u32,
}

#[derive(Debug, Clone)]
pub struct Inode {
    pub footer: NodeFooter,
    pub i_mode: u32,
    pub i_links: u32,
    pub i_size: u64,
    pub i_blocks: u64,
    pub i_pino: u32,
    pub i_ext: Extent,
    pub i_inline: u16,
    pub i_namelen: u8,
    pub i_name: [u8; I_NAME_LEN],
    pub i_xattr_nid: u32,
    pub i_nid: [u32; NIDS_PER_INODE],
    /// Direct block addresses. Meaningful only when neither `INLINE_DATA`
    /// nor `INLINE_DENTRY` is set; populated from `MAIN_PAYLOAD_LEN` bytes.
    pub i_addr: Vec<u32>,
    /// Raw inline-data bytes, meaningful iff `INLINE_DATA` is set.
    pub inline_data: Vec<u8>,
    /// Raw inline-dentry bytes, meaningful iff `INLINE_DENTRY` is set.
    pub inline_dentry: Vec<u8>,
    /// Raw inline-xattr bytes (always present in the fixed tail region).
    pub inline_xattr: Vec<u8>,
}

impl Inode {
    pub fn has_flag(&self, flag: u16) -> bool {
        self.i_inline & flag != 0
    }

    pub fn set_flag(&mut self, flag: u16) {
        self.i_inline |= flag;
    }

    pub fn clear_flag(&mut self, flag: u16) {
        self.i_inline &= !flag;
    }

    pub fn parse(buf: &RawBlock) -> Self {
        let footer = NodeFooter::parse(buf);
        let mut p = 0usize;
        let i_mode = read_u32(buf, &mut p);
        let i_links = read_u32(buf, &mut p);
        let i_size = read_u64(buf, &mut p);
        let i_blocks = read_u64(buf, &mut p);
        let i_pino = read_u32(buf, &mut p);
        let i_ext = Extent {
            fofs: read_u32(buf, &mut p),
            blkaddr: read_u32(buf, &mut p),
            len: read_u32(buf, &mut p),
        };
        let i_inline = read_u16(buf, &mut p);
        let i_namelen = buf[p];
        p += 1;
        p += 1; // padding byte
        let mut i_name = [0u8; I_NAME_LEN];
        i_name.copy_from_slice(&buf[p..p + I_NAME_LEN]);
        p += I_NAME_LEN;
        let i_xattr_nid = read_u32(buf, &mut p);
        let mut i_nid = [0u32; NIDS_PER_INODE];
        for slot in i_nid.iter_mut() {
            *slot = read_u32(buf, &mut p);
        }
        debug_assert_eq!(p, INODE_HEADER_LEN);

        let payload = &buf[INODE_HEADER_LEN..INODE_HEADER_LEN + MAIN_PAYLOAD_LEN];
        let xattr_region =
            &buf[INODE_HEADER_LEN + MAIN_PAYLOAD_LEN..INODE_HEADER_LEN + MAIN_PAYLOAD_LEN + INLINE_XATTR_SIZE];

        let has_inline_data = i_inline & INLINE_DATA != 0;
        let has_inline_dentry = i_inline & INLINE_DENTRY != 0;
        let mut i_addr = Vec::new();
        let mut inline_data = Vec::new();
        let mut inline_dentry = Vec::new();
        if has_inline_dentry {
            inline_dentry = payload.to_vec();
        } else if has_inline_data {
            inline_data = payload.to_vec();
        } else {
            i_addr = payload
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
                .collect();
        }

        Inode {
            footer,
            i_mode,
            i_links,
            i_size,
            i_blocks,
            i_pino,
            i_ext,
            i_inline,
            i_namelen,
            i_name,
            i_xattr_nid,
            i_nid,
            i_addr,
            inline_data,
            inline_dentry,
            inline_xattr: xattr_region.to_vec(),
        }
    }

    pub fn write(&self, buf: &mut RawBlock) {
        self.footer.write(buf);
        let mut p = 0usize;
        write_u32(buf, &mut p, self.i_mode);
        write_u32(buf, &mut p, self.i_links);
        write_u64(buf, &mut p, self.i_size);
        write_u64(buf, &mut p, self.i_blocks);
        write_u32(buf, &mut p, self.i_pino);
        write_u32(buf, &mut p, self.i_ext.fofs);
        write_u32(buf, &mut p, self.i_ext.blkaddr);
        write_u32(buf, &mut p, self.i_ext.len);
        write_u16(buf, &mut p, self.i_inline);
        buf[p] = self.i_namelen;
        p += 2;
        buf[p..p + I_NAME_LEN].copy_from_slice(&self.i_name);
        p += I_NAME_LEN;
        write_u32(buf, &mut p, self.i_xattr_nid);
        for nid in self.i_nid {
            write_u32(buf, &mut p, nid);
        }
        debug_assert_eq!(p, INODE_HEADER_LEN);

        let payload = &mut buf[INODE_HEADER_LEN..INODE_HEADER_LEN + MAIN_PAYLOAD_LEN];
        payload.fill(0);
        if self.has_flag(INLINE_DENTRY) {
            payload[..self.inline_dentry.len().min(MAIN_PAYLOAD_LEN)]
                .copy_from_slice(&self.inline_dentry[..self.inline_dentry.len().min(MAIN_PAYLOAD_LEN)]);
        } else if self.has_flag(INLINE_DATA) {
            payload[..self.inline_data.len().min(MAIN_PAYLOAD_LEN)]
                .copy_from_slice(&self.inline_data[..self.inline_data.len().min(MAIN_PAYLOAD_LEN)]);
        } else {
            for (i, addr) in self.i_addr.iter().enumerate().take(ADDRS_PER_INODE) {
                payload[i * 4..i * 4 + 4].copy_from_slice(&addr.to_le_bytes());
            }
        }

        let xattr_region =
            &mut buf[INODE_HEADER_LEN + MAIN_PAYLOAD_LEN..INODE_HEADER_LEN + MAIN_PAYLOAD_LEN + INLINE_XATTR_SIZE];
        xattr_region.fill(0);
        let n = self.inline_xattr.len().min(INLINE_XATTR_SIZE);
        xattr_region[..n].copy_from_slice(&self.inline_xattr[..n]);
    }
}

/// A direct node block: a flat array of `ADDRS_PER_BLOCK` data-block
/// addresses plus the shared node footer.
#[derive(Debug, Clone)]
pub struct DirectNode {
    pub footer: NodeFooter,
    pub addr: Vec<u32>,
}

impl DirectNode {
    pub fn parse(buf: &RawBlock) -> Self {
        let footer = NodeFooter::parse(buf);
        let addr = buf[..ADDRS_PER_BLOCK * 4]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        DirectNode { footer, addr }
    }

    pub fn write(&self, buf: &mut RawBlock) {
        self.footer.write(buf);
        for (i, a) in self.addr.iter().enumerate().take(ADDRS_PER_BLOCK) {
            buf[i * 4..i * 4 + 4].copy_from_slice(&a.to_le_bytes());
        }
    }
}

/// An indirect (or double-indirect) node block: a flat array of child nids.
#[derive(Debug, Clone)]
pub struct IndirectNode {
    pub footer: NodeFooter,
    pub nid: Vec<u32>,
}

impl IndirectNode {
    pub fn parse(buf: &RawBlock) -> Self {
        let footer = NodeFooter::parse(buf);
        let nid = buf[..NIDS_PER_BLOCK * 4]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        IndirectNode { footer, nid }
    }

    pub fn write(&self, buf: &mut RawBlock) {
        self.footer.write(buf);
        for (i, n) in self.nid.iter().enumerate().take(NIDS_PER_BLOCK) {
            buf[i * 4..i * 4 + 4].copy_from_slice(&n.to_le_bytes());
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DirEntry {
    pub hash: u32,
    pub ino: u32,
    pub name_len: u16,
    pub file_type: u8,
}

/// A directory-entry block shared by ordinary dentry blocks and the inline
/// dentry payload embedded in a directory inode; `slot_count` and the
/// offsets differ between the two but the bitmap/entry/name layout is the
/// same shape.
#[derive(Debug, Clone)]
pub struct DentryBlock {
    pub bitmap: Vec<u8>,
    pub entries: Vec<DirEntry>,
    pub names: Vec<[u8; SLOT_LEN]>,
}

impl DentryBlock {
    pub fn slot_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_present(&self, i: usize) -> bool {
        self.bitmap[i / 8] & (1 << (i % 8)) != 0
    }

    pub fn set_present(&mut self, i: usize, v: bool) {
        if v {
            self.bitmap[i / 8] |= 1 << (i % 8);
        } else {
            self.bitmap[i / 8] &= !(1 << (i % 8));
        }
    }

    pub fn name_slots(&self, name_len: u16) -> usize {
        (name_len as usize).div_ceil(SLOT_LEN).max(1)
    }

    pub fn name_bytes(&self, start: usize, name_len: u16) -> Vec<u8> {
        let mut out = Vec::with_capacity(name_len as usize);
        let mut remain = name_len as usize;
        let mut slot = start;
        while remain > 0 {
            let take = remain.min(SLOT_LEN);
            out.extend_from_slice(&self.names[slot][..take]);
            remain -= take;
            slot += 1;
        }
        out
    }

    fn parse_generic(bitmap: &[u8], entries_raw: &[u8], names_raw: &[u8], n: usize) -> Self {
        let entries = entries_raw
            .chunks_exact(DENTRY_STRUCT_LEN)
            .take(n)
            .map(|c| DirEntry {
                hash: u32::from_le_bytes(c[0..4].try_into().unwrap()),
                ino: u32::from_le_bytes(c[4..8].try_into().unwrap()),
                name_len: u16::from_le_bytes(c[8..10].try_into().unwrap()),
                file_type: c[10],
            })
            .collect();
        let names = names_raw
            .chunks_exact(SLOT_LEN)
            .take(n)
            .map(|c| c.try_into().unwrap())
            .collect();
        DentryBlock {
            bitmap: bitmap.to_vec(),
            entries,
            names,
        }
    }

    fn write_generic(&self, bitmap: &mut [u8], entries_raw: &mut [u8], names_raw: &mut [u8]) {
        bitmap.copy_from_slice(&self.bitmap);
        for (i, e) in self.entries.iter().enumerate() {
            let off = i * DENTRY_STRUCT_LEN;
            entries_raw[off..off + 4].copy_from_slice(&e.hash.to_le_bytes());
            entries_raw[off + 4..off + 8].copy_from_slice(&e.ino.to_le_bytes());
            entries_raw[off + 8..off + 10].copy_from_slice(&e.name_len.to_le_bytes());
            entries_raw[off + 10] = e.file_type;
        }
        for (i, n) in self.names.iter().enumerate() {
            names_raw[i * SLOT_LEN..i * SLOT_LEN + SLOT_LEN].copy_from_slice(n);
        }
    }

    pub fn parse_block(buf: &RawBlock) -> Self {
        Self::parse_generic(
            &buf[..DENTRY_BITMAP_LEN],
            &buf[DENTRY_ARRAY_OFFSET..DENTRY_ARRAY_OFFSET + DENTRY_ARRAY_LEN],
            &buf[DENTRY_NAME_OFFSET..DENTRY_NAME_OFFSET + DENTRY_NAME_LEN],
            NR_DENTRY_IN_BLOCK,
        )
    }

    pub fn write_block(&self, buf: &mut RawBlock) {
        let (bitmap, rest) = buf.split_at_mut(DENTRY_BITMAP_LEN);
        let (_reserved, rest) = rest.split_at_mut(DENTRY_RESERVED_LEN);
        let (entries, names) = rest.split_at_mut(DENTRY_ARRAY_LEN);
        self.write_generic(bitmap, entries, &mut names[..DENTRY_NAME_LEN]);
    }

    pub fn parse_inline(buf: &[u8]) -> Self {
        Self::parse_generic(
            &buf[..INLINE_DENTRY_BITMAP_LEN],
            &buf[INLINE_DENTRY_ARRAY_OFFSET..INLINE_DENTRY_ARRAY_OFFSET + INLINE_DENTRY_ARRAY_LEN],
            &buf[INLINE_DENTRY_NAME_OFFSET..INLINE_DENTRY_NAME_OFFSET + INLINE_DENTRY_NAME_LEN],
            NR_INLINE_DENTRY,
        )
    }

    pub fn write_inline(&self, buf: &mut [u8]) {
        let (bitmap, rest) = buf.split_at_mut(INLINE_DENTRY_BITMAP_LEN);
        let (entries, names) = rest.split_at_mut(INLINE_DENTRY_ARRAY_LEN);
        self.write_generic(bitmap, entries, &mut names[..INLINE_DENTRY_NAME_LEN]);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct XattrHeader {
    pub magic: u32,
    pub refcount: u32,
    pub h_ctx_crc: u32,
}

#[derive(Debug, Clone)]
pub struct XattrEntry {
    pub name_index: u8,
    pub name_len: u8,
    pub value_size: u16,
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl XattrEntry {
    pub fn encoded_len(&self) -> usize {
        let raw = XATTR_ENTRY_HEADER_LEN + self.name.len() + self.value.len();
        raw.div_ceil(4) * 4
    }

    pub fn is_encryption_context(&self) -> bool {
        self.name_index == ENCRYPTION_NAME_INDEX && self.value.len() == FSCRYPT_CTX_SIZE
    }
}

/// Parses a concatenated inline+external xattr buffer into a header plus
/// the entry stream, stopping at the first `name_len == 0` sentinel or at
/// the first entry that would run past `buf`.
///
/// Returns `(header, entries, valid_len)` where `valid_len` is the number of
/// bytes of `buf` that were successfully consumed (used by the caller to
/// truncate a corrupt tail).
pub fn parse_xattr_region(buf: &[u8]) -> (Option<XattrHeader>, Vec<XattrEntry>, usize) {
    if buf.len() < XATTR_HEADER_LEN {
        return (None, Vec::new(), 0);
    }
    let header = XattrHeader {
        magic: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
        refcount: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
        h_ctx_crc: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
    };
    let mut entries = Vec::new();
    let mut p = XATTR_HEADER_LEN;
    while p + XATTR_ENTRY_HEADER_LEN <= buf.len() {
        let name_index = buf[p];
        let name_len = buf[p + 1];
        let value_size = u16::from_le_bytes(buf[p + 2..p + 4].try_into().unwrap());
        if name_len == 0 && name_index == 0 {
            p += XATTR_ENTRY_HEADER_LEN;
            break;
        }
        let body_len = name_len as usize + value_size as usize;
        let entry_len = (XATTR_ENTRY_HEADER_LEN + body_len).div_ceil(4) * 4;
        if p + entry_len > buf.len() {
            break;
        }
        let name = buf[p + XATTR_ENTRY_HEADER_LEN..p + XATTR_ENTRY_HEADER_LEN + name_len as usize].to_vec();
        let value_start = p + XATTR_ENTRY_HEADER_LEN + name_len as usize;
        let value = buf[value_start..value_start + value_size as usize].to_vec();
        entries.push(XattrEntry {
            name_index,
            name_len,
            value_size,
            name,
            value,
        });
        p += entry_len;
    }
    (Some(header), entries, p.min(buf.len()))
}

/// Serializes a header plus entry stream back into `buf`, zero-filling the
/// remainder and writing the terminating sentinel.
pub fn write_xattr_region(buf: &mut [u8], header: &XattrHeader, entries: &[XattrEntry]) {
    buf.fill(0);
    buf[0..4].copy_from_slice(&header.magic.to_le_bytes());
    buf[4..8].copy_from_slice(&header.refcount.to_le_bytes());
    buf[8..12].copy_from_slice(&header.h_ctx_crc.to_le_bytes());
    let mut p = XATTR_HEADER_LEN;
    for e in entries {
        let entry_len = e.encoded_len();
        if p + entry_len > buf.len() {
            break;
        }
        buf[p] = e.name_index;
        buf[p + 1] = e.name_len;
        buf[p + 2..p + 4].copy_from_slice(&e.value_size.to_le_bytes());
        let name_start = p + XATTR_ENTRY_HEADER_LEN;
        buf[name_start..name_start + e.name.len()].copy_from_slice(&e.name);
        let value_start = name_start + e.name.len();
        buf[value_start..value_start + e.value.len()].copy_from_slice(&e.value);
        p += entry_len;
    }
}

fn read_u16(buf: &[u8], p: &mut usize) -> u16 {
    let v = u16::from_le_bytes(buf[*p..*p + 2].try_into().unwrap());
    *p += 2;
    v
}

fn read_u32(buf: &[u8], p: &mut usize) -> u32 {
    let v = u32::from_le_bytes(buf[*p..*p + 4].try_into().unwrap());
    *p += 4;
    v
}

fn read_u64(buf: &[u8], p: &mut usize) -> u64 {
    let v = u64::from_le_bytes(buf[*p..*p + 8].try_into().unwrap());
    *p += 8;
    v
}

fn write_u16(buf: &mut [u8], p: &mut usize, v: u16) {
    buf[*p..*p + 2].copy_from_slice(&v.to_le_bytes());
    *p += 2;
}

fn write_u32(buf: &mut [u8], p: &mut usize, v: u32) {
    buf[*p..*p + 4].copy_from_slice(&v.to_le_bytes());
    *p += 4;
}

fn write_u64(buf: &mut [u8], p: &mut usize, v: u64) {
    buf[*p..*p + 8].copy_from_slice(&v.to_le_bytes());
    *p += 8;
}
