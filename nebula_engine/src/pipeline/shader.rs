/// SPIR-V shader binaries loaded from disk

use std::path::{Path, PathBuf};

use crate::engine_error;
use crate::error::{Error, Result};

/// First word of every SPIR-V module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Read a SPIR-V binary and return its words
///
/// The file must be a non-empty multiple of four bytes and start with the
/// SPIR-V magic number (little-endian).
pub fn load_shader_code(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let failure = |reason: String| {
        engine_error!("nebula::shader", "Failed to load '{}': {}", path.display(), reason);
        Error::ShaderModuleLoad { path: path.display().to_string(), reason }
    };

    let bytes = std::fs::read(path).map_err(|e| failure(e.to_string()))?;
    if bytes.is_empty() {
        return Err(failure("file is empty".to_string()));
    }
    if bytes.len() % 4 != 0 {
        return Err(failure(format!("size {} is not a multiple of 4", bytes.len())));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    if words[0] != SPIRV_MAGIC {
        return Err(failure(format!("bad magic number 0x{:08x}", words[0])));
    }
    Ok(words)
}

/// Where a pipeline stage gets its SPIR-V from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderSource {
    Path(PathBuf),
    /// Words already in memory (embedded or generated)
    Code(Vec<u32>),
}

impl ShaderSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        ShaderSource::Path(path.into())
    }

    pub fn load(&self) -> Result<Vec<u32>> {
        match self {
            ShaderSource::Path(path) => load_shader_code(path),
            ShaderSource::Code(words) => {
                if words.first() != Some(&SPIRV_MAGIC) {
                    return Err(Error::ShaderModuleLoad {
                        path: "<memory>".to_string(),
                        reason: "bad magic number".to_string(),
                    });
                }
                Ok(words.clone())
            }
        }
    }
}

#[cfg(test)]
#[path = "shader_tests.rs"]
mod tests;
