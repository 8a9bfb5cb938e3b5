//! User-facing messages. The source's `MSG`/`DBG`/`FIX_MSG`/`ASSERT_MSG`
//! macros become plain functions over `&Config`, matching the teacher's own
//! `eprintln!`-based style (`utils::error`, `mkfs`/`fdisk` call sites) —
//! nothing in the corpus's mutils tree reaches for a logging crate.

use crate::config::Config;

pub fn info(msg: impl std::fmt::Display) {
    println!("[FSCK] {msg}");
}

pub fn fix(cfg: &Config, msg: impl std::fmt::Display) {
    if cfg.may_write() {
        println!("[FSCK] [FIX] {msg}");
    } else {
        println!("[FSCK] [DETECT] {msg}");
    }
}

pub fn debug(cfg: &Config, lv: i32, msg: impl std::fmt::Display) {
    if cfg.dbg_lv >= lv {
        eprintln!("[DBG({lv})] {msg}");
    }
}

pub fn check_result(name: &str, ok: bool) {
    if ok {
        println!("[FSCK] {name} [Ok..]");
    } else {
        println!("[FSCK] {name} [Fail]");
    }
}

/// Renders an encrypted (non-UTF8-safe) filename for the `dbg_lv == -1`
/// tree-print, the way the original's `convert_encrypted_name` helper does:
/// display-only, never consulted for repair decisions.
pub fn convert_encrypted_name(raw: &[u8]) -> String {
    let mut s = String::with_capacity(raw.len() * 2);
    for b in raw {
        if b.is_ascii_graphic() || *b == b' ' {
            s.push(*b as char);
        } else {
            s.push_str(&format!("\\x{b:02x}"));
        }
    }
    s
}
