//! Godot pack (PCK) directory reader
//!
//! Only the file directory is read; file payloads are never touched.
//!
//! ```text
//! u32 magic "GDPC" | u32 pack version | u32 major | u32 minor | u32 patch
//! v2: u32 pack flags | u64 file base
//! 16 x u32 reserved | u32 file count
//! per file: u32 path len | path (NUL padded) | u64 offset | u64 size | [u8; 16] md5
//!           v2: u32 file flags
//! ```
//!
//! All integers are little-endian.

use std::io::{self, Read};

pub const PCK_MAGIC: u32 = 0x4350_4447;
pub const SUPPORTED_VERSIONS: [u32; 2] = [1, 2];

const PACK_DIR_ENCRYPTED: u32 = 1;
const RESERVED_WORDS: usize = 16;
const MAX_PATH_LEN: u32 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum PckError {
    #[error("Failed to read pack: {0}")]
    Io(#[from] io::Error),

    #[error("Not a Godot pack (magic {0:#010x})")]
    BadMagic(u32),

    #[error("Unsupported pack format version {0}")]
    UnsupportedVersion(u32),

    #[error("Encrypted pack directories are not supported")]
    Encrypted,

    #[error("Invalid entry {index}: {reason}")]
    InvalidEntry { index: u32, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PckEntry {
    pub path: String,
    pub offset: u64,
    pub size: u64,
    pub md5: [u8; 16],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PckIndex {
    pub format_version: u32,
    /// Engine version that wrote the pack
    pub engine_version: (u32, u32, u32),
    pub entries: Vec<PckEntry>,
}

impl PckIndex {
    /// Entry paths in directory order, always with a `res://` prefix.
    pub fn paths(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| {
                if entry.path.starts_with("res://") {
                    entry.path.clone()
                } else {
                    format!("res://{}", entry.path.trim_start_matches('/'))
                }
            })
            .collect()
    }
}

pub fn read_index<R: Read>(reader: &mut R) -> Result<PckIndex, PckError> {
    let magic = read_u32(reader)?;
    if magic != PCK_MAGIC {
        return Err(PckError::BadMagic(magic));
    }

    let format_version = read_u32(reader)?;
    if !SUPPORTED_VERSIONS.contains(&format_version) {
        return Err(PckError::UnsupportedVersion(format_version));
    }
    let engine_version = (read_u32(reader)?, read_u32(reader)?, read_u32(reader)?);

    if format_version == 2 {
        let pack_flags = read_u32(reader)?;
        if pack_flags & PACK_DIR_ENCRYPTED != 0 {
            return Err(PckError::Encrypted);
        }
        let _file_base = read_u64(reader)?;
    }
    for _ in 0..RESERVED_WORDS {
        read_u32(reader)?;
    }

    let file_count = read_u32(reader)?;
    let mut entries = Vec::with_capacity(file_count.min(1024) as usize);
    for index in 0..file_count {
        let path_len = read_u32(reader)?;
        if path_len == 0 || path_len > MAX_PATH_LEN {
            return Err(PckError::InvalidEntry {
                index,
                reason: format!("path length {}", path_len),
            });
        }
        let mut raw_path = vec![0u8; path_len as usize];
        reader.read_exact(&mut raw_path)?;
        let path = String::from_utf8(raw_path)
            .map_err(|e| PckError::InvalidEntry {
                index,
                reason: e.to_string(),
            })?
            .trim_end_matches('\0')
            .to_string();

        let offset = read_u64(reader)?;
        let size = read_u64(reader)?;
        let mut md5 = [0u8; 16];
        reader.read_exact(&mut md5)?;
        if format_version == 2 {
            let _file_flags = read_u32(reader)?;
        }

        entries.push(PckEntry {
            path,
            offset,
            size,
            md5,
        });
    }

    Ok(PckIndex {
        format_version,
        engine_version,
        entries,
    })
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Serialises a pack directory, used to build fixtures.
#[cfg(test)]
pub(crate) fn write_index(version: u32, pack_flags: u32, paths: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&PCK_MAGIC.to_le_bytes());
    out.extend_from_slice(&version.to_le_bytes());
    for part in [4u32, 2, 1] {
        out.extend_from_slice(&part.to_le_bytes());
    }
    if version == 2 {
        out.extend_from_slice(&pack_flags.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
    }
    out.extend_from_slice(&[0u8; RESERVED_WORDS * 4]);
    out.extend_from_slice(&(paths.len() as u32).to_le_bytes());
    for (i, path) in paths.iter().enumerate() {
        // Godot pads paths to a multiple of four with NULs
        let mut bytes = path.as_bytes().to_vec();
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&bytes);
        out.extend_from_slice(&(i as u64 * 64).to_le_bytes());
        out.extend_from_slice(&64u64.to_le_bytes());
        out.extend_from_slice(&[i as u8; 16]);
        if version == 2 {
            out.extend_from_slice(&0u32.to_le_bytes());
        }
    }
    out
}
