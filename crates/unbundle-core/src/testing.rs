//! Fixture archives for tests.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

/// Write a deflated zip containing `files` as `(archive name, content)`.
pub fn write_archive(path: &Path, files: &[(&str, &[u8])]) {
    write_with_method(path, files, CompressionMethod::Deflated);
}

/// Write a zip whose entries are stored uncompressed, so their bytes appear
/// verbatim in the file.
pub fn write_stored_archive(path: &Path, files: &[(&str, &[u8])]) {
    write_with_method(path, files, CompressionMethod::Stored);
}

fn write_with_method(path: &Path, files: &[(&str, &[u8])], method: CompressionMethod) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, content) in files {
        let options = SimpleFileOptions::default().compression_method(method);
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap();
}

/// Flip the first occurrence of `needle` in the file so its CRC no longer
/// matches. Only meaningful for stored entries.
pub fn corrupt_payload(path: &Path, needle: &[u8]) {
    let mut bytes = fs::read(path).unwrap();
    let pos = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("payload not found in archive");
    bytes[pos] ^= 0xFF;
    fs::write(path, bytes).unwrap();
}

/// Deterministic, poorly compressible content of `len` bytes.
pub fn sample_bytes(len: usize, seed: u8) -> Vec<u8> {
    let mut state = u32::from(seed) | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}
