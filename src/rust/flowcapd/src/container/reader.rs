use super::{ContainerError, FileHeader, FileRecord, BLOCK_MAX, RECORD_LEN};
use fcap_config::Compression;
use miniz_oxide::inflate::decompress_to_vec_zlib;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use zerocopy::FromBytes;

/// Reads a whole output file back into memory.
pub fn read_container(path: &Path) -> Result<(FileHeader, Vec<FileRecord>), ContainerError> {
    let mut input = BufReader::new(File::open(path)?);
    let header = FileHeader::read_from(&mut input)?;
    if header.record_len as usize != RECORD_LEN {
        return Err(ContainerError::Corrupt(format!(
            "record length {} (expected {RECORD_LEN})",
            header.record_len
        )));
    }
    let mut body = Vec::new();
    input.read_to_end(&mut body)?;

    let raw = match header.compression {
        Compression::None => body,
        Compression::Zlib => inflate_blocks(&body)?,
        other => return Err(ContainerError::CompressionUnavailable(other)),
    };
    if raw.len() % RECORD_LEN != 0 {
        return Err(ContainerError::Corrupt(format!(
            "{} trailing bytes",
            raw.len() % RECORD_LEN
        )));
    }
    let records = raw
        .chunks_exact(RECORD_LEN)
        .filter_map(|chunk| FileRecord::read_from_bytes(chunk).ok())
        .collect();
    Ok((header, records))
}

fn inflate_blocks(mut body: &[u8]) -> Result<Vec<u8>, ContainerError> {
    let mut raw = Vec::new();
    while !body.is_empty() {
        let Some((lengths, rest)) = body.split_first_chunk::<8>() else {
            return Err(ContainerError::Corrupt("truncated block header".to_string()));
        };
        let compressed_len = u32::from_be_bytes([lengths[0], lengths[1], lengths[2], lengths[3]]) as usize;
        let raw_len = u32::from_be_bytes([lengths[4], lengths[5], lengths[6], lengths[7]]) as usize;
        if raw_len > BLOCK_MAX || compressed_len > rest.len() {
            return Err(ContainerError::Corrupt("bad block lengths".to_string()));
        }
        let block = decompress_to_vec_zlib(&rest[..compressed_len])
            .map_err(|e| ContainerError::Corrupt(format!("inflate failed: {e:?}")))?;
        if block.len() != raw_len {
            return Err(ContainerError::Corrupt(format!(
                "block inflated to {} bytes, expected {raw_len}",
                block.len()
            )));
        }
        raw.extend_from_slice(&block);
        body = &rest[compressed_len..];
    }
    Ok(raw)
}
