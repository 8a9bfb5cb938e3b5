//! `lffsck`: the consistency-checker and repair engine for a log-structured
//! flash-friendly filesystem image. `main.rs` is a thin CLI shell around the
//! `Checker` this crate exposes; everything else is organized by component
//! (C1-C10) the way the original fsck's source files were.

pub mod bitmap;
pub mod collab;
pub mod config;
pub mod context;
pub mod dentry;
pub mod fault;
pub mod hardlink;
pub mod hash;
pub mod image;
pub mod layout;
pub mod nid;
pub mod orphan;
pub mod reconcile;
pub mod repair;
pub mod report;
pub mod ssa;
pub mod utils_crc32;
pub mod walker;
pub mod xattr;

#[cfg(test)]
mod mock;
