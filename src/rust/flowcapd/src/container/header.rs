use super::ContainerError;
use fcap_config::{Compression, FILE_VERSION_MAX, FILE_VERSION_MIN, NAME_MAX};
use std::io::{Read, Write};

/// Marks the start of every output file.
pub const MAGIC: u32 = 0xDEAD_BEEF;

/// Format identifier for captured NetFlow v5 records.
pub const FORMAT_FLOWCAP: u8 = 0x1C;

/// Byte order flag for big-endian bodies; the only order written.
pub const BIG_ENDIAN: u8 = 0;

// magic, order, format, version, compression, record length, header length
const FIXED_LEN: usize = 4 + 1 + 1 + 1 + 1 + 2 + 4;

/// Everything written before the first record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub format: u8,
    pub version: u8,
    pub compression: Compression,
    pub record_len: u16,
    pub sensor: String,
    pub probe: String,
}

impl FileHeader {
    /// Bytes the header occupies on disk.
    pub fn encoded_len(&self) -> usize {
        FIXED_LEN + 2 + self.sensor.len() + 2 + self.probe.len()
    }

    pub fn write_to(&self, out: &mut impl Write) -> Result<(), ContainerError> {
        for name in [&self.sensor, &self.probe] {
            if name.len() > NAME_MAX {
                return Err(ContainerError::NameTooLong(name.clone()));
            }
        }
        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.extend_from_slice(&MAGIC.to_be_bytes());
        bytes.push(BIG_ENDIAN);
        bytes.push(self.format);
        bytes.push(self.version);
        bytes.push(self.compression.id());
        bytes.extend_from_slice(&self.record_len.to_be_bytes());
        bytes.extend_from_slice(&(self.encoded_len() as u32).to_be_bytes());
        for name in [&self.sensor, &self.probe] {
            bytes.extend_from_slice(&(name.len() as u16).to_be_bytes());
            bytes.extend_from_slice(name.as_bytes());
        }
        out.write_all(&bytes)?;
        Ok(())
    }

    pub fn read_from(input: &mut impl Read) -> Result<Self, ContainerError> {
        let mut fixed = [0u8; FIXED_LEN];
        input.read_exact(&mut fixed)?;
        let magic = u32::from_be_bytes([fixed[0], fixed[1], fixed[2], fixed[3]]);
        if magic != MAGIC {
            return Err(ContainerError::BadMagic(magic));
        }
        if fixed[4] != BIG_ENDIAN {
            return Err(ContainerError::Corrupt(format!(
                "unsupported byte order {}",
                fixed[4]
            )));
        }
        let format = fixed[5];
        let version = fixed[6];
        if !(FILE_VERSION_MIN..=FILE_VERSION_MAX).contains(&version) {
            return Err(ContainerError::UnsupportedVersion(version));
        }
        let compression =
            Compression::from_id(fixed[7]).ok_or(ContainerError::UnknownCompression(fixed[7]))?;
        let record_len = u16::from_be_bytes([fixed[8], fixed[9]]);
        let header_len = u32::from_be_bytes([fixed[10], fixed[11], fixed[12], fixed[13]]) as usize;

        let sensor = read_name(input)?;
        let probe = read_name(input)?;
        let header = Self {
            format,
            version,
            compression,
            record_len,
            sensor,
            probe,
        };
        if header.encoded_len() != header_len {
            return Err(ContainerError::Corrupt(format!(
                "header length {header_len} does not match its contents"
            )));
        }
        Ok(header)
    }
}

fn read_name(input: &mut impl Read) -> Result<String, ContainerError> {
    let mut len = [0u8; 2];
    input.read_exact(&mut len)?;
    let len = u16::from_be_bytes(len) as usize;
    if len > NAME_MAX {
        return Err(ContainerError::Corrupt(format!("name of {len} bytes")));
    }
    let mut name = vec![0u8; len];
    input.read_exact(&mut name)?;
    String::from_utf8(name).map_err(|_| ContainerError::Corrupt("name is not UTF-8".to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    fn header() -> FileHeader {
        FileHeader {
            format: FORMAT_FLOWCAP,
            version: 5,
            compression: Compression::Zlib,
            record_len: 52,
            sensor: "S1".to_string(),
            probe: "edge-1".to_string(),
        }
    }

    #[test]
    fn layout() {
        let mut bytes = Vec::new();
        header().write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), header().encoded_len());
        assert_eq!(&bytes[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(bytes[5], FORMAT_FLOWCAP);
        assert_eq!(bytes[7], Compression::Zlib.id());
        assert_eq!(&bytes[FIXED_LEN..FIXED_LEN + 4], &[0, 2, b'S', b'1']);
        assert_eq!(FileHeader::read_from(&mut bytes.as_slice()).unwrap(), header());
    }

    #[test]
    fn rejects_foreign_files() {
        let mut bytes = Vec::new();
        header().write_to(&mut bytes).unwrap();
        bytes[0] = 0;
        assert!(matches!(
            FileHeader::read_from(&mut bytes.as_slice()),
            Err(ContainerError::BadMagic(_))
        ));
    }

    #[test]
    fn rejects_unknown_versions() {
        let mut old = header();
        old.version = 1;
        let mut bytes = Vec::new();
        old.write_to(&mut bytes).unwrap();
        assert!(matches!(
            FileHeader::read_from(&mut bytes.as_slice()),
            Err(ContainerError::UnsupportedVersion(1))
        ));
    }
}
