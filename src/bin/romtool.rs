//! Smoke-test harness for the library, not a general CLI front end: opens a
//! ROM image, prints its top-level VFS tree, and optionally rebuilds a RomFS
//! directory back into fresh container bytes.
//!
//! ```text
//! romtool <path> [--rebuild-romfs <vfs-dir> <out-file>]
//! ```

use std::env;
use std::fs;
use std::process::ExitCode;

use cartkit::Rom;

fn print_tree(rom: &Rom, dir: &str, depth: usize) -> cartkit::Result<()> {
    let indent = "  ".repeat(depth);
    for d in rom.get_directories(dir, "*", true)? {
        println!("{indent}{d}");
        print_tree(rom, &d, depth + 1)?;
    }
    for f in rom.get_files(dir, "*", true)? {
        println!("{indent}{f}");
    }
    Ok(())
}

fn run() -> cartkit::Result<()> {
    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: romtool <path> [--rebuild-romfs <vfs-dir> <out-file>]");
        return Ok(());
    };

    let bytes = fs::read(&path)?;
    let rom = Rom::open_bytes(bytes)?;

    println!("/");
    print_tree(&rom, "/", 1)?;

    if args.next().as_deref() == Some("--rebuild-romfs") {
        let vfs_dir = args.next().expect("--rebuild-romfs requires <vfs-dir> <out-file>");
        let out_file = args.next().expect("--rebuild-romfs requires <vfs-dir> <out-file>");
        let image = rom.rebuild_romfs(&vfs_dir)?;
        fs::write(&out_file, &image)?;
        println!("rebuilt {vfs_dir} -> {out_file} ({} bytes)", image.len());
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
