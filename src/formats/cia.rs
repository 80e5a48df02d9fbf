//! CIA (installable archive) parsing.
//!
//! Layout (each section padded up to a 64-byte boundary):
//!
//! ```text
//! CIA header (0x20)   HeaderSize, Type, Version, CertChainSize, TicketSize,
//!                      TMDSize, MetaSize, ContentSize, ContentIndex bitfield
//! Certificate chain
//! Ticket
//! TMD                  signature block + header + content info records +
//!                      content chunk records (see [`Tmd`])
//! Content               NCCH content chunks, in TMD chunk order
//! Meta (optional)
//! ```
//!
//! TMD fields are big-endian (it is a signed Wii/3DS blob); everything else
//! in this crate is little-endian.

use crate::accessor::ByteSource;
use crate::utils::{align_up, be_u16, be_u32, be_u64, le_u32, le_u64};
use crate::{Error, Result};

/// RSA_2048_SHA256 signature type; the only one this decoder understands.
/// Signature block is `4 (type) + 0x100 (sig) + 0x3C (padding)` = 0x140 bytes.
const SIG_TYPE_RSA2048_SHA256: u32 = 0x10004;
const SIG_BLOCK_SIZE: u64 = 0x140;

const TMD_HEADER_CONTENT_COUNT_OFFSET: usize = 0x9E;
const TMD_HEADER_SIZE: usize = 0xC4;
const CONTENT_INFO_RECORDS_SIZE: usize = 0x900;
const CONTENT_CHUNK_RECORD_SIZE: usize = 0x30;

#[derive(Debug, Clone, Copy)]
pub struct CiaContentChunk {
    pub content_id: u32,
    pub content_index: u16,
    pub content_type: u16,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct Cia {
    pub title_id: u64,
    pub content_chunks: Vec<CiaContentChunk>,
    content_region_offset: u64,
}

impl Cia {
    /// CIA has no magic number; the probe validates the header's internal
    /// size/alignment consistency instead (first `header_size` field must be
    /// the canonical 0x2020, the remaining lengths must fit the image).
    pub fn probe(accessor: &impl ByteSource) -> bool {
        let Ok(buf) = accessor.read(0, 0x20) else {
            return false;
        };
        le_u32(&buf, 0) == 0x2020
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn parse(accessor: &impl ByteSource) -> Result<Self> {
        let header = accessor.read(0, 0x20)?;
        let header_size = le_u32(&header, 0) as u64;
        if header_size != 0x2020 {
            return Err(Error::InvalidFormat("cia header size mismatch"));
        }
        let cert_chain_size = le_u32(&header, 0x08) as u64;
        let ticket_size = le_u32(&header, 0x0C) as u64;
        let tmd_size = le_u32(&header, 0x10) as u64;

        let mut offset = align_up(header_size, 64);
        offset += align_up(cert_chain_size, 64);
        offset += align_up(ticket_size, 64);
        let tmd_offset = offset;
        offset += align_up(tmd_size, 64);
        let content_region_offset = offset;

        let tmd = Tmd::parse(accessor, tmd_offset, tmd_size)?;

        Ok(Cia {
            title_id: tmd.title_id,
            content_chunks: tmd.content_chunks,
            content_region_offset,
        })
    }

    /// Slice the NCCH bytes for `chunk`, given its position among
    /// [`Cia::content_chunks`] (contents are packed back-to-back in TMD
    /// chunk order, each content padded to 64 bytes).
    pub fn slice_content(
        &self,
        accessor: &impl ByteSource,
        chunk_index: usize,
    ) -> Result<crate::accessor::SliceAccessor> {
        let mut offset = self.content_region_offset;
        for (i, chunk) in self.content_chunks.iter().enumerate() {
            if i == chunk_index {
                return accessor.slice(offset, chunk.size);
            }
            offset += align_up(chunk.size, 64);
        }
        Err(Error::NotFound)
    }
}

struct Tmd {
    title_id: u64,
    content_chunks: Vec<CiaContentChunk>,
}

impl Tmd {
    fn parse(accessor: &impl ByteSource, base: u64, len: u64) -> Result<Self> {
        let buf = accessor.read(base, len)?;
        let sig_type = be_u32(&buf, 0);
        if sig_type != SIG_TYPE_RSA2048_SHA256 {
            return Err(Error::InvalidFormat("unsupported tmd signature type"));
        }
        let header = buf
            .get(SIG_BLOCK_SIZE as usize..)
            .ok_or(Error::InvalidFormat("tmd truncated before header"))?;

        let title_id = be_u64(header, 0x4C);
        let content_count = be_u16(header, TMD_HEADER_CONTENT_COUNT_OFFSET) as usize;

        let chunks_offset = TMD_HEADER_SIZE + CONTENT_INFO_RECORDS_SIZE;
        let mut content_chunks = Vec::with_capacity(content_count);
        for i in 0..content_count {
            let o = chunks_offset + i * CONTENT_CHUNK_RECORD_SIZE;
            let record = header
                .get(o..o + CONTENT_CHUNK_RECORD_SIZE)
                .ok_or(Error::InvalidFormat("tmd content chunk truncated"))?;
            content_chunks.push(CiaContentChunk {
                content_id: be_u32(record, 0),
                content_index: be_u16(record, 4),
                content_type: be_u16(record, 6),
                size: be_u64(record, 8),
            });
        }

        Ok(Tmd {
            title_id,
            content_chunks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::SliceAccessor;

    fn synthetic_cia(contents: &[u64]) -> Vec<u8> {
        let cert_chain_size = 0u32;
        let ticket_size = 0u32;

        let header_size = 0x20u32;
        let content_count = contents.len() as u16;

        let mut tmd_header = vec![0u8; TMD_HEADER_SIZE + CONTENT_INFO_RECORDS_SIZE];
        tmd_header[0x4C..0x54].copy_from_slice(&0x0004_0000_0001_2345u64.to_be_bytes());
        tmd_header[TMD_HEADER_CONTENT_COUNT_OFFSET..TMD_HEADER_CONTENT_COUNT_OFFSET + 2]
            .copy_from_slice(&content_count.to_be_bytes());

        let mut chunk_records = Vec::new();
        for (i, size) in contents.iter().enumerate() {
            let mut rec = vec![0u8; CONTENT_CHUNK_RECORD_SIZE];
            rec[0..4].copy_from_slice(&(i as u32).to_be_bytes());
            rec[4..6].copy_from_slice(&(i as u16).to_be_bytes());
            rec[8..16].copy_from_slice(&size.to_be_bytes());
            chunk_records.extend(rec);
        }

        let mut tmd = vec![0u8; SIG_BLOCK_SIZE as usize];
        tmd[0..4].copy_from_slice(&SIG_TYPE_RSA2048_SHA256.to_be_bytes());
        tmd.extend(tmd_header);
        tmd.extend(chunk_records);
        let tmd_size = tmd.len() as u32;

        let mut buf = vec![0u8; 0x20];
        buf[0..4].copy_from_slice(&header_size.to_le_bytes());
        buf[8..12].copy_from_slice(&cert_chain_size.to_le_bytes());
        buf[12..16].copy_from_slice(&ticket_size.to_le_bytes());
        buf[16..20].copy_from_slice(&tmd_size.to_le_bytes());

        let mut image = buf;
        image.resize(align_up(0x20, 64) as usize, 0);
        image.extend(tmd);
        let content_start = align_up(0x20, 64) + align_up(tmd_size as u64, 64);
        image.resize(content_start as usize, 0);
        for size in contents {
            image.resize(image.len() + *size as usize, 0xAB);
            let padded = align_up(image.len() as u64, 64) as usize;
            image.resize(padded, 0);
        }
        image
    }

    #[test]
    fn probe_validates_header_size_field() {
        let image = synthetic_cia(&[0x100]);
        let acc = SliceAccessor::new(image);
        assert!(Cia::probe(&acc));
    }

    #[test]
    fn parses_title_id_and_content_chunks() {
        let image = synthetic_cia(&[0x100, 0x200]);
        let acc = SliceAccessor::new(image);
        let cia = Cia::parse(&acc).unwrap();
        assert_eq!(cia.title_id, 0x0004_0000_0001_2345);
        assert_eq!(cia.content_chunks.len(), 2);
        assert_eq!(cia.content_chunks[0].size, 0x100);
        assert_eq!(cia.content_chunks[1].size, 0x200);
    }

    #[test]
    fn slices_content_at_padded_offsets() {
        let image = synthetic_cia(&[0x100, 0x200]);
        let acc = SliceAccessor::new(image);
        let cia = Cia::parse(&acc).unwrap();
        let first = cia.slice_content(&acc, 0).unwrap();
        assert_eq!(first.len(), 0x100);
        let second = cia.slice_content(&acc, 1).unwrap();
        assert_eq!(second.len(), 0x200);
    }
}
