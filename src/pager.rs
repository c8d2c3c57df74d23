//! Pager owns the file descriptor and geometry of a MiniDB v1 file.
//!
//! A MiniDB file is an array of fixed 4096-byte pages. Page 0 is the file
//! header (never a usable table page); pages 1..page_count-1 are either
//! zeroed (freshly allocated) or leaf pages belonging to some table. See
//! `leaf` for the page-internal layout and `table` for the chain-following
//! logical API built on top of this module.

use byteorder::{ByteOrder, LittleEndian};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const PAGE_SIZE: usize = 4096;
const HEADER_SIZE: usize = 20;
const MAGIC: &[u8; 4] = b"MDB1";
const FILE_VERSION: u32 = 1;

const MAGIC_OFF: usize = 0;
const VERSION_OFF: usize = 4;
const PAGE_SIZE_OFF: usize = 8;
const PAGE_COUNT_OFF: usize = 12;
const FLAGS_OFF: usize = 16;

/// Page numbers are 0-based; page 0 is always the file header.
pub type PageNum = u32;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error accessing database file: {0}")]
    Io(#[from] std::io::Error),
    #[error("file header magic does not match \"MDB1\"")]
    BadMagic,
    #[error("file header version is not 1")]
    BadVersion,
    #[error("file header page_size is not 4096")]
    BadPageSize,
    #[error("file header metadata is invalid (flags, page_count, or arithmetic overflow)")]
    BadMetadata,
    #[error("file is shorter than its header-declared page_count implies")]
    TruncatedFile,
    #[error("page number is out of range for this file")]
    PageOutOfRange,
    #[error("invalid argument")]
    InvalidArgument,
}

impl Error {
    /// Stable short name per the error taxonomy in the format spec; used by
    /// the CLI and by tests asserting on error identity.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::BadMagic => "bad_magic",
            Error::BadVersion => "bad_version",
            Error::BadPageSize => "bad_pagesize",
            Error::BadMetadata => "bad_metadata",
            Error::TruncatedFile => "truncated_file",
            Error::PageOutOfRange => "page_out_of_range",
            Error::InvalidArgument => "invalid_argument",
        }
    }
}

/// Checked `page_no * page_size`, so an overflowing offset is reported as a
/// format error rather than silently wrapping or panicking.
fn page_offset(page_no: PageNum, page_size: u32) -> Result<u64, Error> {
    (page_no as u64)
        .checked_mul(page_size as u64)
        .ok_or(Error::BadMetadata)
}

pub struct Pager {
    file: File,
    page_size: u32,
    page_count: u32,
}

impl Pager {
    /// Opens `path`, initializing a fresh empty file if it does not exist
    /// or is zero-length, then validates the header per the format's
    /// invariants (magic, version, page_size, page_count, flags, and that
    /// the file is long enough to hold `page_count` pages).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        if file.metadata()?.len() == 0 {
            Self::initialize_empty(&mut file)?;
        }
        let (page_size, page_count) = Self::read_and_validate_header(&mut file)?;
        Ok(Pager {
            file,
            page_size,
            page_count,
        })
    }

    fn initialize_empty(file: &mut File) -> Result<(), Error> {
        let mut page0 = vec![0_u8; PAGE_SIZE];
        page0[MAGIC_OFF..MAGIC_OFF + 4].copy_from_slice(MAGIC);
        LittleEndian::write_u32(&mut page0[VERSION_OFF..], FILE_VERSION);
        LittleEndian::write_u32(&mut page0[PAGE_SIZE_OFF..], PAGE_SIZE as u32);
        LittleEndian::write_u32(&mut page0[PAGE_COUNT_OFF..], 1);
        LittleEndian::write_u32(&mut page0[FLAGS_OFF..], 0);
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&page0)?;
        file.flush()?;
        Ok(())
    }

    fn read_and_validate_header(file: &mut File) -> Result<(u32, u32), Error> {
        let mut header = [0_u8; HEADER_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;

        if &header[MAGIC_OFF..MAGIC_OFF + 4] != MAGIC {
            return Err(Error::BadMagic);
        }
        let version = LittleEndian::read_u32(&header[VERSION_OFF..]);
        if version != FILE_VERSION {
            return Err(Error::BadVersion);
        }
        let page_size = LittleEndian::read_u32(&header[PAGE_SIZE_OFF..]);
        if page_size as usize != PAGE_SIZE {
            return Err(Error::BadPageSize);
        }
        let page_count = LittleEndian::read_u32(&header[PAGE_COUNT_OFF..]);
        if page_count < 1 {
            return Err(Error::BadMetadata);
        }
        let flags = LittleEndian::read_u32(&header[FLAGS_OFF..]);
        if flags != 0 {
            return Err(Error::BadMetadata);
        }

        let needed = page_offset(page_count, page_size)?;
        let actual_len = file.metadata()?.len();
        if actual_len < needed {
            return Err(Error::TruncatedFile);
        }

        Ok((page_size, page_count))
    }

    /// Reads exactly one page into `buf`, which must be `page_size()` bytes.
    pub fn read(&mut self, page_no: PageNum, buf: &mut [u8]) -> Result<(), Error> {
        if buf.len() != self.page_size as usize {
            return Err(Error::InvalidArgument);
        }
        if page_no >= self.page_count {
            return Err(Error::PageOutOfRange);
        }
        let offset = page_offset(page_no, self.page_size)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Writes exactly one page from `buf`, which must be `page_size()` bytes.
    pub fn write(&mut self, page_no: PageNum, buf: &[u8]) -> Result<(), Error> {
        if buf.len() != self.page_size as usize {
            return Err(Error::InvalidArgument);
        }
        if page_no >= self.page_count {
            return Err(Error::PageOutOfRange);
        }
        let offset = page_offset(page_no, self.page_size)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    /// Appends one fully zeroed page at the end of the file and persists
    /// the new page_count to the on-disk header. Returns the new page's
    /// number (equal to the previous `page_count`).
    ///
    /// All-or-nothing: the new page is written first, and `page_count` is
    /// only advanced in memory after the header write to disk also
    /// succeeds. A failure partway through leaves the on-disk header
    /// describing either the old page_count or the new one, never
    /// something in between.
    pub fn alloc_page(&mut self) -> Result<PageNum, Error> {
        let new_page_no = self.page_count;
        let new_page_count = self.page_count.checked_add(1).ok_or(Error::BadMetadata)?;
        let offset = page_offset(new_page_no, self.page_size)?;

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&vec![0_u8; self.page_size as usize])?;

        self.file.seek(SeekFrom::Start(PAGE_COUNT_OFF as u64))?;
        let mut count_bytes = [0_u8; 4];
        LittleEndian::write_u32(&mut count_bytes, new_page_count);
        self.file.write_all(&count_bytes)?;

        self.page_count = new_page_count;
        Ok(new_page_no)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Releases the underlying file descriptor. Dropping a `Pager` does the
    /// same thing; this exists so callers can observe close failures.
    pub fn close(self) -> Result<(), Error> {
        drop(self.file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn tmp_file() -> NamedTempFile {
        NamedTempFile::new().expect("should create a temp file")
    }

    #[test]
    fn open_empty_path_initializes_header() {
        let file = tmp_file();
        let pager = Pager::open(file.path()).expect("should create and open a fresh file");
        assert_eq!(pager.page_size(), PAGE_SIZE as u32);
        assert_eq!(pager.page_count(), 1);

        let bytes = std::fs::read(file.path()).unwrap();
        assert_eq!(&bytes[0..4], b"MDB1");
        assert_eq!(bytes.len(), PAGE_SIZE);
    }

    #[test]
    fn header_is_idempotent_across_reopen() {
        let file = tmp_file();
        {
            let _pager = Pager::open(file.path()).unwrap();
        }
        let first_bytes = std::fs::read(file.path()).unwrap()[0..20].to_vec();
        {
            let _pager = Pager::open(file.path()).unwrap();
        }
        let second_bytes = std::fs::read(file.path()).unwrap()[0..20].to_vec();
        assert_eq!(first_bytes, second_bytes);
    }

    #[test]
    fn alloc_page_grows_file_and_count() {
        let file = tmp_file();
        let mut pager = Pager::open(file.path()).unwrap();
        assert_eq!(pager.page_count(), 1);
        let pn = pager.alloc_page().unwrap();
        assert_eq!(pn, 1);
        assert_eq!(pager.page_count(), 2);
        let bytes = std::fs::read(file.path()).unwrap();
        assert_eq!(bytes.len(), 2 * PAGE_SIZE);
    }

    #[test]
    fn read_beyond_page_count_is_out_of_range() {
        let file = tmp_file();
        let mut pager = Pager::open(file.path()).unwrap();
        let mut buf = vec![0_u8; PAGE_SIZE];
        let err = pager.read(pager.page_count(), &mut buf).unwrap_err();
        assert_eq!(err.code(), "page_out_of_range");
    }

    #[test]
    fn rejects_wrong_magic() {
        let file = tmp_file();
        let mut bytes = vec![0_u8; PAGE_SIZE];
        bytes[0..4].copy_from_slice(b"NOPE");
        LittleEndian::write_u32(&mut bytes[VERSION_OFF..], 1);
        LittleEndian::write_u32(&mut bytes[PAGE_SIZE_OFF..], PAGE_SIZE as u32);
        LittleEndian::write_u32(&mut bytes[PAGE_COUNT_OFF..], 1);
        std::fs::write(file.path(), &bytes).unwrap();
        let err = Pager::open(file.path()).unwrap_err();
        assert_eq!(err.code(), "bad_magic");
    }

    #[test]
    fn rejects_bad_pagesize() {
        let file = tmp_file();
        let mut bytes = vec![0_u8; PAGE_SIZE];
        bytes[0..4].copy_from_slice(MAGIC);
        LittleEndian::write_u32(&mut bytes[VERSION_OFF..], 1);
        LittleEndian::write_u32(&mut bytes[PAGE_SIZE_OFF..], 2048);
        LittleEndian::write_u32(&mut bytes[PAGE_COUNT_OFF..], 1);
        std::fs::write(file.path(), &bytes).unwrap();
        let err = Pager::open(file.path()).unwrap_err();
        assert_eq!(err.code(), "bad_pagesize");
    }

    #[test]
    fn rejects_truncated_file() {
        let file = tmp_file();
        let mut bytes = vec![0_u8; PAGE_SIZE];
        bytes[0..4].copy_from_slice(MAGIC);
        LittleEndian::write_u32(&mut bytes[VERSION_OFF..], 1);
        LittleEndian::write_u32(&mut bytes[PAGE_SIZE_OFF..], PAGE_SIZE as u32);
        LittleEndian::write_u32(&mut bytes[PAGE_COUNT_OFF..], 3);
        // Physical length covers only 2 pages, header claims 3.
        bytes.truncate(2 * PAGE_SIZE);
        std::fs::write(file.path(), &bytes).unwrap();
        let err = Pager::open(file.path()).unwrap_err();
        assert_eq!(err.code(), "truncated_file");
    }

    #[test]
    fn longer_than_declared_file_is_accepted() {
        let file = tmp_file();
        let mut bytes = vec![0_u8; PAGE_SIZE];
        bytes[0..4].copy_from_slice(MAGIC);
        LittleEndian::write_u32(&mut bytes[VERSION_OFF..], 1);
        LittleEndian::write_u32(&mut bytes[PAGE_SIZE_OFF..], PAGE_SIZE as u32);
        LittleEndian::write_u32(&mut bytes[PAGE_COUNT_OFF..], 1);
        bytes.extend_from_slice(&[0xAA; 123]); // trailing garbage beyond page_count*page_size
        std::fs::write(file.path(), &bytes).unwrap();
        let pager = Pager::open(file.path()).expect("trailing bytes beyond last page must be allowed");
        assert_eq!(pager.page_count(), 1);
    }
}
