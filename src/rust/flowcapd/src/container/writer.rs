use super::{ContainerError, FileHeader, FileRecord, BLOCK_MAX, RECORD_LEN};
use fcap_config::Compression;
use fcap_flowsource::FlowRecord;
use miniz_oxide::deflate::compress_to_vec_zlib;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use zerocopy::IntoBytes;

const ZLIB_LEVEL: u8 = 6;

/// Totals for a finished file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub records: u64,
    /// Record bytes before compression
    pub record_bytes: u64,
    /// Bytes on disk, header included
    pub file_bytes: u64,
}

impl Summary {
    /// On-disk body size as a percentage of the raw record bytes.
    pub fn ratio_percent(&self, header_len: u64) -> f64 {
        if self.record_bytes == 0 {
            return 100.0;
        }
        self.file_bytes.saturating_sub(header_len) as f64 / self.record_bytes as f64 * 100.0
    }
}

/// Appends records to a newly created output file.
pub struct ContainerWriter {
    out: BufWriter<File>,
    compression: Compression,
    block: Vec<u8>,
    records: u64,
    file_bytes: u64,
}

impl ContainerWriter {
    /// Creates `path`, which must not exist, and writes `header` to it.
    pub fn create(path: &Path, header: &FileHeader) -> Result<Self, ContainerError> {
        if !header.compression.is_available() {
            return Err(ContainerError::CompressionUnavailable(header.compression));
        }
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let mut out = BufWriter::new(file);
        header.write_to(&mut out)?;
        Ok(Self {
            out,
            compression: header.compression,
            block: Vec::new(),
            records: 0,
            file_bytes: header.encoded_len() as u64,
        })
    }

    pub fn append(&mut self, record: &FlowRecord) -> Result<(), ContainerError> {
        let stored = FileRecord::from(record);
        match self.compression {
            Compression::None => {
                self.out.write_all(stored.as_bytes())?;
                self.file_bytes += RECORD_LEN as u64;
            }
            _ => {
                if self.block.len() + RECORD_LEN > BLOCK_MAX {
                    self.flush_block()?;
                }
                self.block.extend_from_slice(stored.as_bytes());
            }
        }
        self.records += 1;
        Ok(())
    }

    /// Records appended so far
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Uncompressed size of the records appended so far
    pub fn record_bytes(&self) -> u64 {
        self.records * RECORD_LEN as u64
    }

    fn flush_block(&mut self) -> Result<(), ContainerError> {
        if self.block.is_empty() {
            return Ok(());
        }
        let compressed = compress_to_vec_zlib(&self.block, ZLIB_LEVEL);
        self.out.write_all(&(compressed.len() as u32).to_be_bytes())?;
        self.out.write_all(&(self.block.len() as u32).to_be_bytes())?;
        self.out.write_all(&compressed)?;
        self.file_bytes += 8 + compressed.len() as u64;
        self.block.clear();
        Ok(())
    }

    /// Writes any buffered block and syncs the file to disk.
    pub fn finish(mut self) -> Result<Summary, ContainerError> {
        self.flush_block()?;
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(Summary {
            records: self.records,
            record_bytes: self.record_bytes(),
            file_bytes: self.file_bytes,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::container::{read_container, FORMAT_FLOWCAP};
    use std::net::Ipv4Addr;

    fn header(compression: Compression) -> FileHeader {
        FileHeader {
            format: FORMAT_FLOWCAP,
            version: 5,
            compression,
            record_len: RECORD_LEN as u16,
            sensor: "S1".to_string(),
            probe: "edge-1".to_string(),
        }
    }

    fn flow(i: u32) -> FlowRecord {
        FlowRecord {
            src_addr: Ipv4Addr::from(0x0a00_0000 + i),
            dst_addr: Ipv4Addr::new(192, 0, 2, 1),
            next_hop: Ipv4Addr::UNSPECIFIED,
            input: 1,
            output: 2,
            packets: 1,
            bytes: 40 + i,
            first: 0,
            last: 10,
            src_port: 1000,
            dst_port: 80,
            tcp_flags: 2,
            protocol: 6,
            tos: 0,
            src_as: 0,
            dst_as: 0,
            src_mask: 0,
            dst_mask: 0,
            sys_uptime: 0,
            unix_secs: 0,
            unix_nsecs: 0,
            start_ms: 1_700_000_000_000 + i as i64,
            elapsed_ms: 10,
        }
    }

    fn write(compression: Compression, count: u32) -> (tempfile::TempDir, std::path::PathBuf, Summary) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        let mut writer = ContainerWriter::create(&path, &header(compression)).unwrap();
        for i in 0..count {
            writer.append(&flow(i)).unwrap();
        }
        assert_eq!(writer.records(), count as u64);
        let summary = writer.finish().unwrap();
        (dir, path, summary)
    }

    #[test]
    fn uncompressed_file_is_header_plus_records() {
        let (_dir, path, summary) = write(Compression::None, 10);
        let header_len = header(Compression::None).encoded_len() as u64;
        assert_eq!(summary.file_bytes, header_len + 10 * RECORD_LEN as u64);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), summary.file_bytes);
        let (read_header, records) = read_container(&path).unwrap();
        assert_eq!(read_header, header(Compression::None));
        assert_eq!(records.len(), 10);
        assert_eq!(records[3].bytes.get(), 43);
        assert_eq!(records[3].start_ms.get(), 1_700_000_000_003);
    }

    #[test]
    fn zlib_spans_several_blocks() {
        // 1500 records do not fit one 64 KiB block.
        let (_dir, path, summary) = write(Compression::Zlib, 1500);
        assert_eq!(summary.record_bytes, 1500 * RECORD_LEN as u64);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), summary.file_bytes);
        assert!(summary.ratio_percent(0) < 100.0);
        let (_, records) = read_container(&path).unwrap();
        assert_eq!(records.len(), 1500);
        assert_eq!(records[1499], FileRecord::from(&flow(1499)));
    }

    #[test]
    fn refuses_existing_file() {
        let (_dir, path, _) = write(Compression::None, 0);
        assert!(matches!(
            ContainerWriter::create(&path, &header(Compression::None)),
            Err(ContainerError::Io(_))
        ));
    }

    #[test]
    fn lzo_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ContainerWriter::create(&dir.path().join("x"), &header(Compression::Lzo)),
            Err(ContainerError::CompressionUnavailable(Compression::Lzo))
        ));
    }
}
