//! Cross-module end-to-end scenarios driven entirely through the public
//! `Rom` API, against synthetic NCSD/NCCH/ExeFS/RomFS/NDS images built
//! in-memory (no real ROM fixtures are shipped).

use sha2::{Digest, Sha256};

use cartkit::host::MemoryHostFs;
use cartkit::rebuild::exefs as rebuild_exefs;
use cartkit::rebuild::romfs::{rebuild as rebuild_romfs, BuildDir, BuildFile};
use cartkit::Rom;

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Builds a single NCCH partition: a 0x200 header followed by an optional
/// ExeFS region and an optional RomFS region, each media-unit aligned.
fn build_ncch(exefs: Option<Vec<u8>>, romfs: Option<Vec<u8>>) -> Vec<u8> {
    let mut header = vec![0u8; 0x200];
    header[0x100..0x104].copy_from_slice(b"NCCH");
    header[0x150..0x160].copy_from_slice(b"CTR-P-TEST\0\0\0\0\0\0");

    let mut body = Vec::new();
    let mut cursor_mu = 1u32; // header occupies media unit 0

    if let Some(bytes) = &exefs {
        let size_mu = (align_up(bytes.len(), 0x200) / 0x200) as u32;
        header[0x1A0..0x1A4].copy_from_slice(&cursor_mu.to_le_bytes());
        header[0x1A4..0x1A8].copy_from_slice(&size_mu.to_le_bytes());
        body.extend_from_slice(bytes);
        body.resize(body.len() + (size_mu as usize * 0x200 - bytes.len()), 0);
        cursor_mu += size_mu;
    }
    if let Some(bytes) = &romfs {
        let size_mu = (align_up(bytes.len(), 0x200) / 0x200) as u32;
        header[0x1B0..0x1B4].copy_from_slice(&cursor_mu.to_le_bytes());
        header[0x1B4..0x1B8].copy_from_slice(&size_mu.to_le_bytes());
        body.extend_from_slice(bytes);
        body.resize(body.len() + (size_mu as usize * 0x200 - bytes.len()), 0);
    }

    let mut full = header;
    full.extend(body);
    full
}

/// Builds an NCSD image from a sparse set of `(slot, ncch_bytes)` pairs.
fn build_ncsd(partitions: &[(usize, Vec<u8>)]) -> Vec<u8> {
    let mut header = vec![0u8; 0x200];
    header[0x100..0x104].copy_from_slice(b"NCSD");

    let mut body = Vec::new();
    let mut cursor_mu = 1u32;
    for i in 0..8 {
        if let Some((_, bytes)) = partitions.iter().find(|(slot, _)| *slot == i) {
            let size_mu = (align_up(bytes.len(), 0x200) / 0x200) as u32;
            let e = 0x120 + i * 8;
            header[e..e + 4].copy_from_slice(&cursor_mu.to_le_bytes());
            header[e + 4..e + 8].copy_from_slice(&size_mu.to_le_bytes());
            body.extend_from_slice(bytes);
            body.resize(body.len() + (size_mu as usize * 0x200 - bytes.len()), 0);
            cursor_mu += size_mu;
        }
    }

    let mut full = header;
    full.extend(body);
    full
}

fn sample_romfs_bytes() -> Vec<u8> {
    rebuild_romfs(&BuildDir {
        name: String::new(),
        dirs: vec![],
        files: vec![BuildFile {
            name: "data.bin".to_string(),
            data: vec![1, 2, 3, 4],
        }],
    })
    .unwrap()
}

fn open(bytes: Vec<u8>) -> Rom<MemoryHostFs> {
    Rom::open_bytes_with_host(bytes, MemoryHostFs::new()).unwrap()
}

/// Scenario 1: NCSD open and list.
#[test]
fn ncsd_open_and_list() {
    let exefs = rebuild_exefs::rebuild(&[("code.bin".to_string(), vec![0xAB; 16])]).unwrap();
    let romfs = sample_romfs_bytes();

    let p0 = build_ncch(Some(exefs), Some(romfs.clone()));
    let p1 = build_ncch(None, Some(romfs.clone()));
    let p6 = build_ncch(None, Some(romfs));

    let image = build_ncsd(&[(0, p0), (1, p1), (6, p6)]);
    let rom = open(image);

    let dirs: std::collections::HashSet<String> = rom.get_directories("/", "*", false).unwrap().into_iter().collect();
    assert!(dirs.contains("/ExeFS/"));
    assert!(dirs.contains("/RomFS/"));
    assert!(dirs.contains("/Manual/"));
    assert!(dirs.contains("/N3DSUpdate/"));

    assert!(rom.file_exists("/Header.bin"));
    assert!(rom.file_exists("/Header-6.bin"));
    assert!(!rom.file_exists("/Header-3.bin"));
}

/// Scenario 2: ExeFS read matches declared length and SHA-256.
#[test]
fn exefs_read_matches_length_and_hash() {
    let payload = vec![0x5Au8; 0x1234];
    let exefs = rebuild_exefs::rebuild(&[("code.bin".to_string(), payload.clone())]).unwrap();
    let image = build_ncsd(&[(0, build_ncch(Some(exefs), None))]);
    let rom = open(image);

    let bytes = rom.read_file("/ExeFS/code.bin").unwrap();
    assert_eq!(bytes.len(), 0x1234);
    assert_eq!(Sha256::digest(&bytes).as_slice(), Sha256::digest(&payload).as_slice());
}

/// Scenario 3: overlay write shadows backing, enumerated exactly once.
#[test]
fn overlay_write_shadows_backing() {
    let romfs = rebuild_romfs(&BuildDir {
        name: String::new(),
        dirs: vec![BuildDir {
            name: "a".to_string(),
            dirs: vec![],
            files: vec![BuildFile { name: "b.txt".to_string(), data: b"old".to_vec() }],
        }],
        files: vec![],
    })
    .unwrap();
    let image = build_ncsd(&[(0, build_ncch(None, Some(romfs)))]);
    let rom = open(image);

    rom.write_file("/RomFS/a/b.txt", b"hello").unwrap();
    assert_eq!(rom.read_file("/RomFS/a/b.txt").unwrap(), b"hello");

    let files = rom.get_files("/RomFS/a", "*", true).unwrap();
    assert_eq!(files.iter().filter(|f| f.ends_with("b.txt")).count(), 1);
}

/// Scenario 4: delete then resurrect.
#[test]
fn delete_then_resurrect() {
    let romfs = rebuild_romfs(&BuildDir {
        name: String::new(),
        dirs: vec![],
        files: vec![BuildFile { name: "foo.dat".to_string(), data: b"orig".to_vec() }],
    })
    .unwrap();
    let image = build_ncsd(&[(0, build_ncch(None, Some(romfs)))]);
    let rom = open(image);

    rom.delete_file("/RomFS/foo.dat").unwrap();
    assert!(!rom.file_exists("/RomFS/foo.dat"));
    assert!(rom.read_file("/RomFS/foo.dat").is_err());

    rom.write_file("/RomFS/foo.dat", &[1, 2, 3]).unwrap();
    assert_eq!(rom.read_file("/RomFS/foo.dat").unwrap(), vec![1, 2, 3]);
}

/// Scenario 5: DS ARM9 footer handling.
#[test]
fn ds_arm9_footer_extends_reported_length() {
    const ARM9_OFFSET: u32 = 0x4000;
    const ARM9_SIZE: u32 = 0x100;
    const FNT_OFFSET: u32 = 0x5000;
    const FAT_OFFSET: u32 = 0x6000;

    let mut fnt = vec![0u8; 8];
    fnt[0..4].copy_from_slice(&8u32.to_le_bytes());
    fnt[6..8].copy_from_slice(&1u16.to_le_bytes());
    fnt.push(0); // empty root subtable

    let mut image = vec![0u8; 0x4200];
    image[0x20..0x24].copy_from_slice(&ARM9_OFFSET.to_le_bytes());
    image[0x2C..0x30].copy_from_slice(&ARM9_SIZE.to_le_bytes());
    image[0x40..0x44].copy_from_slice(&FNT_OFFSET.to_le_bytes());
    image[0x44..0x48].copy_from_slice(&(fnt.len() as u32).to_le_bytes());
    image[0x48..0x4C].copy_from_slice(&FAT_OFFSET.to_le_bytes());
    image[0x4C..0x50].copy_from_slice(&0u32.to_le_bytes());
    image[FNT_OFFSET as usize..FNT_OFFSET as usize + fnt.len()].copy_from_slice(&fnt);
    image[(ARM9_OFFSET + ARM9_SIZE) as usize..(ARM9_OFFSET + ARM9_SIZE) as usize + 4]
        .copy_from_slice(&0x2106_C0DEu32.to_le_bytes());

    let rom = open(image);
    assert_eq!(rom.read_file("/arm9.bin").unwrap().len(), ARM9_SIZE as usize + 12);
}

/// Scenario 6: RomFS roundtrip through the public rebuild entry point.
#[test]
fn romfs_roundtrip_through_rom() {
    let romfs = rebuild_romfs(&BuildDir {
        name: String::new(),
        dirs: vec![],
        files: vec![BuildFile { name: "seed.bin".to_string(), data: b"seed".to_vec() }],
    })
    .unwrap();
    let image = build_ncsd(&[(0, build_ncch(None, Some(romfs)))]);
    let rom = open(image);

    rom.write_file("/RomFS/extra.txt", b"added").unwrap();
    let rebuilt = rom.rebuild_romfs("/RomFS").unwrap();

    let rom2 = open(build_ncsd(&[(0, build_ncch(None, Some(rebuilt)))]));
    assert_eq!(rom2.read_file("/RomFS/seed.bin").unwrap(), b"seed");
    assert_eq!(rom2.read_file("/RomFS/extra.txt").unwrap(), b"added");
}

/// Path normalization invariants: `.`/`..` collapsing, current directory.
#[test]
fn path_normalization_collapses_dot_segments() {
    let exefs = rebuild_exefs::rebuild(&[("code.bin".to_string(), vec![1, 2, 3])]).unwrap();
    let rom = open(build_ncsd(&[(0, build_ncch(Some(exefs), None))]));

    assert!(rom.file_exists("/ExeFS/./code.bin"));
    assert!(rom.file_exists("/ExeFS/../ExeFS/code.bin"));
    assert_eq!(rom.current_directory(), "/");
}
