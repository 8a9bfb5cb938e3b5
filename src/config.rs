//! Run configuration (spec §6), parsed the way every teacher tool parses
//! its own `Args`: a plain struct with `Default`, filled by a hand-rolled
//! loop over `env::args_os()` — no argument-parsing crate.

use std::env::ArgsOs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreenMode {
    None,
    Mode1,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Attempt repairs for faults the walk discovers.
    pub fix_on: bool,
    /// Suppress every device write even when `fix_on` is set.
    pub ro: bool,
    pub preen_mode: PreenMode,
    /// Debug verbosity; `-1` additionally enables the dentry tree-print.
    pub dbg_lv: i32,
    /// Set by the core once any fault is recorded during the run.
    pub bug_on: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fix_on: false,
            ro: false,
            preen_mode: PreenMode::None,
            dbg_lv: 0,
            bug_on: false,
        }
    }
}

impl Config {
    pub fn may_write(&self) -> bool {
        self.fix_on && !self.ro
    }
}

#[derive(Debug, Clone, Default)]
pub struct Args {
    pub help: bool,
    pub config: Config,
    pub device_path: Option<PathBuf>,
}

pub fn parse_args(args: ArgsOs) -> Args {
    let mut res = Args::default();
    let mut args = args.peekable();
    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("-h" | "--help") => res.help = true,
            Some("-f" | "--fix") => res.config.fix_on = true,
            Some("-n" | "--no-fix") => {
                res.config.fix_on = false;
                res.config.ro = true;
            }
            Some("-p" | "--preen") => res.config.preen_mode = PreenMode::Mode1,
            Some("-d" | "--debug") => {
                if let Some(lv) = args.next().and_then(|a| a.to_str().map(str::to_owned)) {
                    res.config.dbg_lv = lv.parse().unwrap_or(0);
                }
            }
            _ => res.device_path = Some(PathBuf::from(arg)),
        }
    }
    res
}
