//! Streaming ZIP writer that compresses parts on-the-fly
//!
//! Entries are written with a trailing data descriptor, so the destination only
//! needs `Write`: no seeking back, no temp files, and nothing of a part is kept
//! in memory once it has gone through the deflater.

use crate::error::{ExcelError, Result};
use chrono::{Datelike, Local, Timelike};
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{self, Write};

const LOCAL_FILE_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const DATA_DESCRIPTOR_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x07, 0x08];
const CENTRAL_DIRECTORY_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Finished entry, kept for the central directory
struct ZipEntry {
    name: String,
    flags: u16,
    method: u16,
    local_header_offset: u32,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
}

/// Entry currently receiving data
struct CurrentEntry<W: Write> {
    name: String,
    local_header_offset: u32,
    data_start: u64,
    crc: Crc32,
    uncompressed_count: u64,
    encoder: DeflateEncoder<CountingWriter<W>>,
}

/// Writer that tracks the absolute output position
struct CountingWriter<W: Write> {
    inner: W,
    position: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streaming ZIP writer over any byte sink
pub struct StreamingZipWriter<W: Write> {
    output: Option<CountingWriter<W>>,
    current_entry: Option<CurrentEntry<W>>,
    entries: Vec<ZipEntry>,
    compression_level: u32,
    dos_time: u16,
    dos_date: u16,
}

impl<W: Write> StreamingZipWriter<W> {
    pub fn new(output: W, compression_level: u32) -> Self {
        let (dos_time, dos_date) = dos_timestamp();
        Self {
            output: Some(CountingWriter {
                inner: output,
                position: 0,
            }),
            current_entry: None,
            entries: Vec::new(),
            compression_level: compression_level.min(9),
            dos_time,
            dos_date,
        }
    }

    /// Start a new deflated entry; the previous entry is finished first
    pub fn start_entry(&mut self, name: &str) -> Result<()> {
        self.finish_current_entry()?;

        let (time, date) = (self.dos_time, self.dos_date);
        let mut output = self.take_output()?;
        let local_header_offset = offset32(output.position)?;
        write_local_header(
            &mut output,
            name,
            FLAG_DATA_DESCRIPTOR,
            METHOD_DEFLATE,
            (time, date),
            [0, 0, 0],
        )?;

        let data_start = output.position;
        self.current_entry = Some(CurrentEntry {
            name: name.to_string(),
            local_header_offset,
            data_start,
            crc: Crc32::new(),
            uncompressed_count: 0,
            encoder: DeflateEncoder::new(output, Compression::new(self.compression_level)),
        });
        Ok(())
    }

    /// Add a whole entry without compression.
    ///
    /// Sizes and CRC go into the local header, which some readers require for
    /// the first entry of a package (the ODS `mimetype`).
    pub fn add_stored_entry(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.finish_current_entry()?;

        let mut crc = Crc32::new();
        crc.update(data);
        let crc32 = crc.finalize();
        let size = size32(data.len() as u64)?;

        let (time, date) = (self.dos_time, self.dos_date);
        let output = self.output_mut()?;
        let local_header_offset = offset32(output.position)?;
        write_local_header(
            output,
            name,
            0,
            METHOD_STORED,
            (time, date),
            [crc32, size, size],
        )?;
        output.write_all(data)?;

        self.entries.push(ZipEntry {
            name: name.to_string(),
            flags: 0,
            method: METHOD_STORED,
            local_header_offset,
            crc32,
            compressed_size: size,
            uncompressed_size: size,
        });
        Ok(())
    }

    /// Write uncompressed data to current entry (compressed on-the-fly)
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        match self.current_entry.as_mut() {
            Some(entry) => {
                entry.crc.update(data);
                entry.uncompressed_count += data.len() as u64;
                entry.encoder.write_all(data)?;
                Ok(())
            }
            None => Err(ExcelError::Format("no zip entry started".to_string())),
        }
    }

    /// Finish current entry and write its data descriptor
    fn finish_current_entry(&mut self) -> Result<()> {
        if let Some(entry) = self.current_entry.take() {
            let mut output = entry.encoder.finish()?;

            let crc32 = entry.crc.finalize();
            let compressed_size = size32(output.position - entry.data_start)?;
            let uncompressed_size = size32(entry.uncompressed_count)?;

            output.write_all(&DATA_DESCRIPTOR_SIGNATURE)?;
            output.write_all(&crc32.to_le_bytes())?;
            output.write_all(&compressed_size.to_le_bytes())?;
            output.write_all(&uncompressed_size.to_le_bytes())?;
            self.output = Some(output);

            self.entries.push(ZipEntry {
                name: entry.name,
                flags: FLAG_DATA_DESCRIPTOR,
                method: METHOD_DEFLATE,
                local_header_offset: entry.local_header_offset,
                crc32,
                compressed_size,
                uncompressed_size,
            });
        }
        Ok(())
    }

    /// Finish the archive (central directory + end record) and hand back the sink
    pub fn finish(mut self) -> Result<W> {
        self.finish_current_entry()?;

        let (time, date) = (self.dos_time, self.dos_date);
        let mut output = self.take_output()?;
        let central_dir_offset = offset32(output.position)?;

        for entry in &self.entries {
            output.write_all(&CENTRAL_DIRECTORY_SIGNATURE)?;
            output.write_all(&20u16.to_le_bytes())?; // version made by
            output.write_all(&20u16.to_le_bytes())?; // version needed
            output.write_all(&entry.flags.to_le_bytes())?;
            output.write_all(&entry.method.to_le_bytes())?;
            output.write_all(&time.to_le_bytes())?;
            output.write_all(&date.to_le_bytes())?;
            output.write_all(&entry.crc32.to_le_bytes())?;
            output.write_all(&entry.compressed_size.to_le_bytes())?;
            output.write_all(&entry.uncompressed_size.to_le_bytes())?;
            output.write_all(&(entry.name.len() as u16).to_le_bytes())?;
            output.write_all(&0u16.to_le_bytes())?; // extra len
            output.write_all(&0u16.to_le_bytes())?; // file comment len
            output.write_all(&0u16.to_le_bytes())?; // disk number start
            output.write_all(&0u16.to_le_bytes())?; // internal attrs
            output.write_all(&0u32.to_le_bytes())?; // external attrs
            output.write_all(&entry.local_header_offset.to_le_bytes())?;
            output.write_all(entry.name.as_bytes())?;
        }

        let central_dir_size = size32(output.position - u64::from(central_dir_offset))?;
        let count = u16::try_from(self.entries.len())
            .map_err(|_| ExcelError::Format("too many zip entries".to_string()))?;

        output.write_all(&END_OF_CENTRAL_DIRECTORY_SIGNATURE)?;
        output.write_all(&0u16.to_le_bytes())?; // disk number
        output.write_all(&0u16.to_le_bytes())?; // disk with central dir
        output.write_all(&count.to_le_bytes())?;
        output.write_all(&count.to_le_bytes())?;
        output.write_all(&central_dir_size.to_le_bytes())?;
        output.write_all(&central_dir_offset.to_le_bytes())?;
        output.write_all(&0u16.to_le_bytes())?; // comment len

        output.flush()?;
        Ok(output.inner)
    }

    fn output_mut(&mut self) -> Result<&mut CountingWriter<W>> {
        self.output
            .as_mut()
            .ok_or_else(|| ExcelError::Format("zip output unavailable".to_string()))
    }

    fn take_output(&mut self) -> Result<CountingWriter<W>> {
        self.output
            .take()
            .ok_or_else(|| ExcelError::Format("zip output unavailable".to_string()))
    }
}

impl<W: Write> Write for StreamingZipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_data(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(buf.len())
    }

    /// Flushes the sink between entries. Inside an entry this is a no-op:
    /// a deflate sync flush would only bloat the output.
    fn flush(&mut self) -> io::Result<()> {
        match self.output.as_mut() {
            Some(output) if self.current_entry.is_none() => output.flush(),
            _ => Ok(()),
        }
    }
}

fn write_local_header<W: Write>(
    output: &mut W,
    name: &str,
    flags: u16,
    method: u16,
    (time, date): (u16, u16),
    [crc32, compressed_size, uncompressed_size]: [u32; 3],
) -> Result<()> {
    output.write_all(&LOCAL_FILE_HEADER_SIGNATURE)?;
    output.write_all(&20u16.to_le_bytes())?; // version needed
    output.write_all(&flags.to_le_bytes())?;
    output.write_all(&method.to_le_bytes())?;
    output.write_all(&time.to_le_bytes())?;
    output.write_all(&date.to_le_bytes())?;
    output.write_all(&crc32.to_le_bytes())?;
    output.write_all(&compressed_size.to_le_bytes())?;
    output.write_all(&uncompressed_size.to_le_bytes())?;
    output.write_all(&(name.len() as u16).to_le_bytes())?;
    output.write_all(&0u16.to_le_bytes())?; // extra len
    output.write_all(name.as_bytes())?;
    Ok(())
}

/// Local time in MS-DOS format; years before 1980 clamp to 1980
fn dos_timestamp() -> (u16, u16) {
    let now = Local::now();
    let year = (now.year().clamp(1980, 2107) - 1980) as u16;
    let time = ((now.hour() as u16) << 11) | ((now.minute() as u16) << 5) | (now.second() as u16 / 2);
    let date = (year << 9) | ((now.month() as u16) << 5) | now.day() as u16;
    (time, date)
}

fn size32(size: u64) -> Result<u32> {
    u32::try_from(size)
        .map_err(|_| ExcelError::Format("zip entry exceeds 4 GiB (zip64 not supported)".to_string()))
}

fn offset32(offset: u64) -> Result<u32> {
    u32::try_from(offset)
        .map_err(|_| ExcelError::Format("archive exceeds 4 GiB (zip64 not supported)".to_string()))
}
