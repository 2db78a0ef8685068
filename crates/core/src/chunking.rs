use crate::error::IngestError;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            overlap: 200,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk_size {}",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Splits `text` into fixed-size windows of `chunk_size` characters,
/// each overlapping the previous by `overlap` characters. Windows are
/// measured in characters so multi-byte text never splits a code point.
/// Chunks may cut mid-word; there is no sentence or paragraph snapping.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let step = config.chunk_size - config.overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        start += step;
    }

    Ok(chunks)
}
