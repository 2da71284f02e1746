use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const READ_CHUNK_LENGTH: usize = 64 * 1024;

/// Length of a fingerprint in hex characters (256-bit BLAKE3 digest).
pub const FINGERPRINT_HEX_LENGTH: usize = 64;

/// Stream the whole file through BLAKE3 and return the lowercase hex digest.
///
/// Never samples: two files share a fingerprint only if every byte matches.
pub fn fingerprint_file(file: &Path) -> io::Result<String> {
    let mut f = File::open(file)?;
    fingerprint_reader(&mut f)
}

pub fn fingerprint_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; READ_CHUNK_LENGTH];
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

pub fn fingerprint_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}
