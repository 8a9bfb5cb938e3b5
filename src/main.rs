//! `fsck.lffs`: checks (and, with `-f`, repairs) a log-structured
//! flash-friendly filesystem image. Parses its own `Args` the way every
//! other tool in this tree does (`config::parse_args`, mirroring
//! `su::parse_args`/`mkfs`'s own loop): a hand-rolled loop over
//! `env::args_os()`, no argument-parsing crate, with the binary name
//! already consumed by the caller before `parse_args` sees the rest.

use std::env;
use std::fs::OpenOptions;
use std::process::exit;

use lffsck::config::parse_args;
use lffsck::context::Checker;
use lffsck::image::{self, ImageDevice, ImageMetadata};

fn usage(prog: &str) {
    eprintln!("Usage: {prog} [-f|-n] [-p] [-d level] <device>");
    eprintln!("  -f, --fix      attempt repairs for faults found");
    eprintln!("  -n, --no-fix   check only, never write (default)");
    eprintln!("  -p, --preen    abort the orphan sweep on the first bad entry");
    eprintln!("  -d, --debug lv debug verbosity; -1 also prints the dentry tree");
}

fn main() {
    let mut args_os = env::args_os();
    let prog = args_os
        .next()
        .and_then(|s| s.into_string().ok())
        .unwrap_or_else(|| "fsck.lffs".to_owned());
    let args = parse_args(args_os);

    if args.help {
        usage(&prog);
        exit(0);
    }

    let Some(device_path) = args.device_path else {
        eprintln!("{prog}: specify path to a device or image");
        usage(&prog);
        exit(1);
    };

    let cfg = args.config;

    let file = OpenOptions::new()
        .read(true)
        .write(cfg.may_write())
        .open(&device_path)
        .unwrap_or_else(|e| {
            eprintln!("{prog}: {}: {e}", device_path.display());
            exit(1);
        });

    let mut sb_probe = file.try_clone().unwrap_or_else(|e| {
        eprintln!("{prog}: {e}");
        exit(1);
    });
    let (sb, nat_entry_count) = image::load_superblock(&mut sb_probe).unwrap_or_else(|e| {
        eprintln!("{prog}: {}: invalid superblock: {e}", device_path.display());
        exit(1);
    });

    let mut cp_probe = file.try_clone().unwrap_or_else(|e| {
        eprintln!("{prog}: {e}");
        exit(1);
    });
    let (mut cp, cp_slot) = image::load_checkpoint(&mut cp_probe, &sb).unwrap_or_else(|e| {
        eprintln!("{prog}: {}: failed to load checkpoint: {e}", device_path.display());
        exit(1);
    });

    let meta_file = file.try_clone().unwrap_or_else(|e| {
        eprintln!("{prog}: {e}");
        exit(1);
    });
    let meta = ImageMetadata::load(meta_file, sb, nat_entry_count).unwrap_or_else(|e| {
        eprintln!("{prog}: {}: failed to load NAT/SIT: {e}", device_path.display());
        exit(1);
    });
    let known_nids: Vec<u32> = meta.known_nids().collect();
    let sit_maps: Vec<(u32, Vec<u8>)> = meta.sit_valid_maps().map(|(segno, m)| (segno, m.to_vec())).collect();

    let device = ImageDevice::open(file);
    let main_block_count = sb.main_area_blocks() as usize;

    let mut checker = Checker::new(sb, device, meta, cfg, main_block_count, nat_entry_count as usize, cp_slot);
    checker.seed_nat(known_nids);
    for (segno, map) in &sit_maps {
        checker.seed_sit_segment(*segno, map);
    }

    let exit_code = checker.run(&mut cp);

    lffsck::report::info(format!("done: {} fault(s) recorded", checker.faults.iter().count()));
    exit(exit_code);
}
