//! Path resolution and enumeration over the read-only backing view.
//!
//! Maps the top-level synthesized names (`Header.bin`, `ExeFS`, `RomFS`, DS
//! `data`/`overlay`/…) and container-internal paths onto [`ResolveTarget`].
//! Knows nothing about the overlay - [`crate::rom::Rom`] merges this view
//! with the overlay on every query.

use crate::accessor::{ByteSource, SliceAccessor};
use crate::container::Container;
use crate::formats::nds::{Nds, NdsDir, Overlay as NdsOverlay};
use crate::vfs::target::ResolveTarget;
use crate::{Error, Result};

/// Matches `name` against `<stem><ext>` (index 0) or `<stem>-<i><ext>`,
/// case-insensitively. Returns the parsed index on a match.
fn match_indexed_ext(name: &str, stem: &str, ext: &str) -> Option<usize> {
    if !name.is_ascii() {
        return None;
    }
    let lower = name.to_ascii_lowercase();
    let stem_lower = stem.to_ascii_lowercase();
    let ext_lower = ext.to_ascii_lowercase();

    if lower == format!("{stem_lower}{ext_lower}") {
        return Some(0);
    }
    let rest = lower.strip_prefix(&format!("{stem_lower}-"))?;
    let digits = rest.strip_suffix(&ext_lower)?;
    digits.parse().ok()
}

fn indexed_name(stem: &str, ext: &str, index: usize) -> String {
    if index == 0 {
        format!("{stem}{ext}")
    } else {
        format!("{stem}-{index}{ext}")
    }
}

/// The canonical directory name(s) a RomFS partition index is reachable
/// under, in the order enumeration should emit them.
fn romfs_alias(index: usize, is_dlc: bool) -> Option<&'static str> {
    if is_dlc {
        return None;
    }
    match index {
        0 => Some("RomFS"),
        1 => Some("Manual"),
        2 => Some("DownloadPlay"),
        6 => Some("N3DSUpdate"),
        7 => Some("O3DSUpdate"),
        _ => None,
    }
}

/// Reverse of [`romfs_alias`] plus the bare `RomFS[-i]` form every partition
/// index accepts regardless of alias.
fn romfs_partition_index(name: &str, is_dlc: bool) -> Option<usize> {
    if !is_dlc {
        for (alias, index) in [
            ("Manual", 1),
            ("DownloadPlay", 2),
            ("N3DSUpdate", 6),
            ("O3DSUpdate", 7),
        ] {
            if name.eq_ignore_ascii_case(alias) {
                return Some(index);
            }
        }
    }
    match_indexed_ext(name, "RomFS", "")
}

/// Resolve a path (already split into normalized segments, root = empty
/// slice) against a 3DS [`Container`]. `whole` is the accessor the whole
/// image/NCCH was opened from (needed for `NcsdHeader.bin`).
pub fn resolve_threeds(
    container: &Container,
    whole: &SliceAccessor,
    segments: &[String],
) -> Result<ResolveTarget> {
    if segments.is_empty() {
        return Ok(ResolveTarget::Directory);
    }
    let top = segments[0].as_str();

    if segments.len() == 1 {
        if container.kind == crate::container::ContainerKind::Ncsd
            && top.eq_ignore_ascii_case("NcsdHeader.bin")
        {
            return Ok(ResolveTarget::File(whole.slice(0, 0x200)?));
        }
        if let Some(i) = match_indexed_ext(top, "Header", ".bin") {
            let p = container.partition(i).ok_or(Error::NotFound)?;
            return Ok(ResolveTarget::File(p.header_bytes()?));
        }
        if let Some(i) = match_indexed_ext(top, "ExHeader", ".bin") {
            let p = container.partition(i).ok_or(Error::NotFound)?;
            let header = p.header.as_ref().ok_or(Error::NotFound)?;
            return Ok(ResolveTarget::File(p.raw_region(header.exheader)?));
        }
        if let Some(i) = match_indexed_ext(top, "PlainRegion", ".txt") {
            let p = container.partition(i).ok_or(Error::NotFound)?;
            let header = p.header.as_ref().ok_or(Error::NotFound)?;
            return Ok(ResolveTarget::File(p.raw_region(header.plain_region)?));
        }
        if let Some(i) = match_indexed_ext(top, "Logo", ".bin") {
            let p = container.partition(i).ok_or(Error::NotFound)?;
            let header = p.header.as_ref().ok_or(Error::NotFound)?;
            return Ok(ResolveTarget::File(p.raw_region(header.logo)?));
        }
    }

    if let Some(i) = match_indexed_ext(top, "ExeFS", "") {
        let p = container.partition(i).ok_or(Error::NotFound)?;
        let (acc, exefs) = p.exefs().ok_or(Error::NotFound)?;
        return match &segments[1..] {
            [] => Ok(ResolveTarget::Directory),
            [name] => {
                let file = exefs.get(name).ok_or(Error::NotFound)?;
                Ok(ResolveTarget::File(exefs.slice_file(acc, file)?))
            }
            _ => Err(Error::NotFound), // ExeFS is a flat namespace
        };
    }

    if let Some(i) = romfs_partition_index(top, container.is_dlc) {
        let p = container.partition(i).ok_or(Error::NotFound)?;
        let (acc, romfs) = p.romfs().ok_or(Error::NotFound)?;
        let mut dir = &romfs.root;
        for (idx, seg) in segments[1..].iter().enumerate() {
            let is_last = idx == segments.len() - 2;
            if let Some(sub) = dir.dirs.iter().find(|d| d.name.eq_ignore_ascii_case(seg)) {
                dir = sub;
                continue;
            }
            if is_last {
                if let Some(f) = dir.files.iter().find(|f| f.name.eq_ignore_ascii_case(seg)) {
                    return Ok(ResolveTarget::File(romfs.slice_file(acc, f)?));
                }
            }
            return Err(Error::NotFound);
        }
        return Ok(ResolveTarget::Directory);
    }

    Err(Error::NotFound)
}

/// Immediate children of the directory at `segments` (files, directories),
/// using each slot's canonical display name.
pub fn list_children_threeds(container: &Container, segments: &[String]) -> Result<(Vec<String>, Vec<String>)> {
    if segments.is_empty() {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for i in 0..crate::container::PARTITION_COUNT {
            let Some(p) = container.partition(i) else { continue };
            if i == 0 && container.kind == crate::container::ContainerKind::Ncsd {
                files.push("NcsdHeader.bin".to_string());
            }
            if let Some(header) = &p.header {
                files.push(indexed_name("Header", ".bin", i));
                if header.exheader.is_some() {
                    files.push(indexed_name("ExHeader", ".bin", i));
                }
                if header.plain_region.is_some() {
                    files.push(indexed_name("PlainRegion", ".txt", i));
                }
                if header.logo.is_some() {
                    files.push(indexed_name("Logo", ".bin", i));
                }
            }
            if p.exefs().is_some() {
                dirs.push(indexed_name("ExeFS", "", i));
            }
            if p.romfs().is_some() {
                let name = romfs_alias(i, container.is_dlc)
                    .map(str::to_string)
                    .unwrap_or_else(|| indexed_name("RomFS", "", i));
                dirs.push(name);
            }
        }
        return Ok((files, dirs));
    }

    let top = segments[0].as_str();

    if let Some(i) = match_indexed_ext(top, "ExeFS", "") {
        let p = container.partition(i).ok_or(Error::NotFound)?;
        let (_, exefs) = p.exefs().ok_or(Error::NotFound)?;
        if segments.len() != 1 {
            return Err(Error::NotFound);
        }
        return Ok((exefs.files.iter().map(|f| f.name.clone()).collect(), Vec::new()));
    }

    if let Some(i) = romfs_partition_index(top, container.is_dlc) {
        let p = container.partition(i).ok_or(Error::NotFound)?;
        let (_, romfs) = p.romfs().ok_or(Error::NotFound)?;
        let mut dir = &romfs.root;
        for seg in &segments[1..] {
            dir = dir
                .dirs
                .iter()
                .find(|d| d.name.eq_ignore_ascii_case(seg))
                .ok_or(Error::NotFound)?;
        }
        let files = dir.files.iter().map(|f| f.name.clone()).collect();
        let dirs = dir.dirs.iter().map(|d| d.name.clone()).collect();
        return Ok((files, dirs));
    }

    Err(Error::NotFound)
}

fn overlay_file_name(overlay_id: u32) -> String {
    format!("{overlay_id:04}.bin")
}

/// Resolve a path against a parsed DS cartridge.
pub fn resolve_ds(acc: &SliceAccessor, nds: &Nds, segments: &[String]) -> Result<ResolveTarget> {
    if segments.is_empty() {
        return Ok(ResolveTarget::Directory);
    }
    let top = segments[0].as_str();

    if segments.len() == 1 {
        if top.eq_ignore_ascii_case("arm9.bin") {
            return Ok(ResolveTarget::File(nds.slice_arm9(acc)?));
        }
        if top.eq_ignore_ascii_case("arm7.bin") {
            return Ok(ResolveTarget::File(nds.slice_arm7(acc)?));
        }
        if top.eq_ignore_ascii_case("header.bin") {
            return Ok(ResolveTarget::File(nds.slice_header(acc)?));
        }
        if top.eq_ignore_ascii_case("y9.bin") {
            return Ok(ResolveTarget::File(nds.slice_y9(acc)?));
        }
        if top.eq_ignore_ascii_case("y7.bin") {
            return Ok(ResolveTarget::File(nds.slice_y7(acc)?));
        }
    }

    if top.eq_ignore_ascii_case("data") {
        return resolve_nds_dir(acc, nds, &nds.root, &segments[1..]);
    }
    if top.eq_ignore_ascii_case("overlay") {
        return resolve_overlay_entry(acc, nds, &nds.arm9_overlays, &segments[1..]);
    }
    if top.eq_ignore_ascii_case("overlay7") {
        return resolve_overlay_entry(acc, nds, &nds.arm7_overlays, &segments[1..]);
    }

    Err(Error::NotFound)
}

fn resolve_nds_dir(acc: &SliceAccessor, nds: &Nds, dir: &NdsDir, segments: &[String]) -> Result<ResolveTarget> {
    let Some((seg, rest)) = segments.split_first() else {
        return Ok(ResolveTarget::Directory);
    };
    if let Some(sub) = dir.dirs.iter().find(|d| d.name.eq_ignore_ascii_case(seg)) {
        return resolve_nds_dir(acc, nds, sub, rest);
    }
    if rest.is_empty() {
        if let Some(f) = dir.files.iter().find(|f| f.name.eq_ignore_ascii_case(seg)) {
            return Ok(ResolveTarget::File(nds.slice_file(acc, f.file_id)?));
        }
    }
    Err(Error::NotFound)
}

fn resolve_overlay_entry(
    acc: &SliceAccessor,
    nds: &Nds,
    overlays: &[NdsOverlay],
    segments: &[String],
) -> Result<ResolveTarget> {
    match segments {
        [] => Ok(ResolveTarget::Directory),
        [name] => {
            let overlay = overlays
                .iter()
                .find(|o| overlay_file_name(o.overlay_id).eq_ignore_ascii_case(name))
                .ok_or(Error::NotFound)?;
            Ok(ResolveTarget::File(nds.slice_overlay(acc, overlay)?))
        }
        _ => Err(Error::NotFound),
    }
}

/// Immediate children of the directory at `segments` in a DS image.
pub fn list_children_ds(nds: &Nds, segments: &[String]) -> Result<(Vec<String>, Vec<String>)> {
    if segments.is_empty() {
        let files = vec![
            "arm9.bin".to_string(),
            "arm7.bin".to_string(),
            "header.bin".to_string(),
            "y9.bin".to_string(),
            "y7.bin".to_string(),
        ];
        let dirs = vec!["data".to_string(), "overlay".to_string(), "overlay7".to_string()];
        return Ok((files, dirs));
    }

    let top = segments[0].as_str();
    if top.eq_ignore_ascii_case("data") {
        let mut dir = &nds.root;
        for seg in &segments[1..] {
            dir = dir
                .dirs
                .iter()
                .find(|d| d.name.eq_ignore_ascii_case(seg))
                .ok_or(Error::NotFound)?;
        }
        let files = dir.files.iter().map(|f| f.name.clone()).collect();
        let dirs = dir.dirs.iter().map(|d| d.name.clone()).collect();
        return Ok((files, dirs));
    }
    if top.eq_ignore_ascii_case("overlay") {
        if segments.len() != 1 {
            return Err(Error::NotFound);
        }
        let files = nds.arm9_overlays.iter().map(|o| overlay_file_name(o.overlay_id)).collect();
        return Ok((files, Vec::new()));
    }
    if top.eq_ignore_ascii_case("overlay7") {
        if segments.len() != 1 {
            return Err(Error::NotFound);
        }
        let files = nds.arm7_overlays.iter().map(|o| overlay_file_name(o.overlay_id)).collect();
        return Ok((files, Vec::new()));
    }

    Err(Error::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_indexed_ext_parses_bare_and_suffixed_forms() {
        assert_eq!(match_indexed_ext("Header.bin", "Header", ".bin"), Some(0));
        assert_eq!(match_indexed_ext("Header-6.bin", "Header", ".bin"), Some(6));
        assert_eq!(match_indexed_ext("ExeFS", "ExeFS", ""), Some(0));
        assert_eq!(match_indexed_ext("ExeFS-2", "ExeFS", ""), Some(2));
        assert_eq!(match_indexed_ext("Logo.bin", "Header", ".bin"), None);
    }

    #[test]
    fn romfs_alias_round_trips_through_partition_index() {
        assert_eq!(romfs_partition_index("Manual", false), Some(1));
        assert_eq!(romfs_partition_index("RomFS-1", false), Some(1));
        assert_eq!(romfs_partition_index("Manual", true), None);
        assert_eq!(romfs_partition_index("RomFS-1", true), Some(1));
        assert_eq!(romfs_alias(1, false), Some("Manual"));
        assert_eq!(romfs_alias(1, true), None);
    }
}
