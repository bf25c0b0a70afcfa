//! Streaming ZIP reader
//!
//! Only the central directory is read up front. Entries are decompressed on
//! demand, either into a buffer (small parts) or as a `Read` stream (sheets).

use crate::error::{ExcelError, Result};
use flate2::read::DeflateDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;

/// Fixed EOCD size plus the largest possible archive comment
const EOCD_SEARCH_WINDOW: u64 = 22 + 65535;

/// Entry in the ZIP central directory
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression_method: u16,
    pub offset: u64,
}

/// Streaming ZIP archive reader
pub struct StreamingZipReader<R: Read + Seek> {
    source: R,
    entries: Vec<ZipEntry>,
}

impl StreamingZipReader<BufReader<File>> {
    /// Open a ZIP file and read its central directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> StreamingZipReader<R> {
    pub fn new(mut source: R) -> Result<Self> {
        let entries = read_central_directory(&mut source)?;
        Ok(StreamingZipReader { source, entries })
    }

    /// Get list of all entries in the ZIP
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Find an entry by name
    pub fn find_entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_entry(name).is_some()
    }

    /// Read an entry's decompressed data into a vector
    pub fn read_entry_by_name(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self.entry(name)?;
        let mut data = Vec::with_capacity((entry.uncompressed_size as usize).min(1 << 20));
        self.read_entry_streaming(&entry)?.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Stream an entry by name, decompressing as it is read
    pub fn read_entry_streaming_by_name(&mut self, name: &str) -> Result<Box<dyn Read + '_>> {
        let entry = self.entry(name)?;
        self.read_entry_streaming(&entry)
    }

    /// Stream an entry, decompressing as it is read
    pub fn read_entry_streaming(&mut self, entry: &ZipEntry) -> Result<Box<dyn Read + '_>> {
        self.source.seek(SeekFrom::Start(entry.offset))?;

        if read_u32_le(&mut self.source)? != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(ExcelError::Format(format!(
                "invalid local file header for zip entry '{}'",
                entry.name
            )));
        }

        // version, flags, method, time, date, crc, sizes: the central
        // directory already holds the authoritative values
        self.source.seek(SeekFrom::Current(22))?;

        let filename_len = read_u16_le(&mut self.source)? as i64;
        let extra_len = read_u16_le(&mut self.source)? as i64;
        self.source
            .seek(SeekFrom::Current(filename_len + extra_len))?;

        let limited_reader = (&mut self.source).take(entry.compressed_size);

        match entry.compression_method {
            8 => Ok(Box::new(DeflateDecoder::new(limited_reader))),
            0 => Ok(Box::new(limited_reader)),
            method => Err(ExcelError::Format(format!(
                "unsupported compression method {} for zip entry '{}'",
                method, entry.name
            ))),
        }
    }

    fn entry(&self, name: &str) -> Result<ZipEntry> {
        self.find_entry(name)
            .cloned()
            .ok_or_else(|| ExcelError::Format(format!("zip entry not found: {}", name)))
    }
}

fn read_central_directory<R: Read + Seek>(source: &mut R) -> Result<Vec<ZipEntry>> {
    let eocd_offset = find_eocd(source)?;
    source.seek(SeekFrom::Start(eocd_offset + 4))?;

    // disk number fields
    source.seek(SeekFrom::Current(4))?;
    let _entries_on_disk = read_u16_le(source)?;
    let total_entries = read_u16_le(source)? as usize;
    let _cd_size = read_u32_le(source)?;
    let cd_offset = read_u32_le(source)? as u64;

    source.seek(SeekFrom::Start(cd_offset))?;

    let mut entries = Vec::with_capacity(total_entries);
    for _ in 0..total_entries {
        if read_u32_le(source)? != CENTRAL_DIRECTORY_SIGNATURE {
            return Err(ExcelError::Format(
                "corrupt zip central directory".to_string(),
            ));
        }

        // version made by, version needed, flags
        source.seek(SeekFrom::Current(6))?;
        let compression_method = read_u16_le(source)?;
        // time, date, crc
        source.seek(SeekFrom::Current(8))?;

        let compressed_size = read_u32_le(source)? as u64;
        let uncompressed_size = read_u32_le(source)? as u64;
        let filename_len = read_u16_le(source)? as usize;
        let extra_len = read_u16_le(source)? as i64;
        let comment_len = read_u16_le(source)? as i64;

        // disk number, internal attributes, external attributes
        source.seek(SeekFrom::Current(8))?;
        let offset = read_u32_le(source)? as u64;

        let mut filename_buf = vec![0u8; filename_len];
        source.read_exact(&mut filename_buf)?;
        let name = String::from_utf8_lossy(&filename_buf).into_owned();

        source.seek(SeekFrom::Current(extra_len + comment_len))?;

        entries.push(ZipEntry {
            name,
            compressed_size,
            uncompressed_size,
            compression_method,
            offset,
        });
    }

    Ok(entries)
}

/// Locate the end of central directory record by scanning backwards
fn find_eocd<R: Read + Seek>(source: &mut R) -> Result<u64> {
    let size = source.seek(SeekFrom::End(0))?;
    let search_start = size.saturating_sub(EOCD_SEARCH_WINDOW);
    source.seek(SeekFrom::Start(search_start))?;

    let mut buffer = Vec::new();
    source.read_to_end(&mut buffer)?;

    let signature = END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes();
    buffer
        .windows(4)
        .rposition(|w| w == signature)
        .filter(|&i| buffer.len() - i >= 22)
        .map(|i| search_start + i as u64)
        .ok_or_else(|| ExcelError::Format("not a zip container (end record missing)".to_string()))
}

fn read_u16_le<R: Read>(source: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    source.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32_le<R: Read>(source: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    source.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_rejects_non_zip() {
        let err = StreamingZipReader::new(Cursor::new(b"a,b\n1,2\n".to_vec()))
            .err()
            .unwrap();
        assert!(matches!(err, ExcelError::Format(_)));
    }

    #[test]
    fn test_missing_entry() {
        let bytes = crate::container::StreamingZipWriter::new(Vec::new(), 1)
            .finish()
            .unwrap();
        let mut reader = StreamingZipReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.entries().is_empty());
        assert!(reader.read_entry_by_name("xl/workbook.xml").is_err());
    }

    #[test]
    fn test_inflated_declared_size_is_not_trusted() {
        let mut zip = crate::container::StreamingZipWriter::new(Vec::new(), 6);
        zip.add_stored_entry("part.xml", b"<a/>").unwrap();
        let mut bytes = zip.finish().unwrap();

        let central = bytes
            .windows(4)
            .position(|w| w == CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes())
            .unwrap();
        bytes[central + 24..central + 28].copy_from_slice(&u32::MAX.to_le_bytes());

        let mut reader = StreamingZipReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.entries()[0].uncompressed_size, u64::from(u32::MAX));
        assert_eq!(reader.read_entry_by_name("part.xml").unwrap(), b"<a/>");
    }
}
