use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use twox_hash::XxHash64;

use crate::model::ContentHash;

/// Files below this size are hashed whole.
pub const SMALL_FILE_THRESHOLD: u64 = 650_000;
/// Window hashed for larger files.
pub const SAMPLE_LENGTH: usize = 512 * 1024;
/// The window starts at `len / SAMPLE_OFFSET_DIVISOR`.
pub const SAMPLE_OFFSET_DIVISOR: u64 = 8;

/// Sampled content hash: whole file when small, otherwise a 512 KiB window
/// starting at 1/8 of the file. The file length is part of the hash input.
pub fn content_hash(file: &Path) -> io::Result<ContentHash> {
    let mut f = File::open(file)?;
    let len = f.metadata()?.len();
    let data = if len < SMALL_FILE_THRESHOLD {
        read_full(&mut f)?
    } else {
        read_window(&mut f, len / SAMPLE_OFFSET_DIVISOR, SAMPLE_LENGTH)?
    };
    Ok(ContentHash::from_u64(hash_data(len, &data)))
}

fn read_full(f: &mut File) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    f.read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn read_window(f: &mut File, offset: u64, length: usize) -> io::Result<Vec<u8>> {
    f.seek(SeekFrom::Start(offset))?;
    let mut buffer = Vec::with_capacity(length);
    f.by_ref().take(length as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

pub fn hash_data(len: u64, data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write_u64(len);
    hasher.write(data);
    hasher.finish()
}
