use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Text chunk produced by the chunker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable chunk id, `doc_{source}_{ordinal}`
    pub id: String,
    /// Raw text of the chunk
    pub text: String,
    /// Source document name
    pub source: String,
    /// Position of the chunk within its document
    pub ordinal: usize,
    /// Character offset of the first char (inclusive)
    pub char_start: usize,
    /// Character offset after the last char (exclusive)
    pub char_end: usize,
}

impl Chunk {
    pub fn new(
        text: String,
        source: impl Into<String>,
        ordinal: usize,
        char_start: usize,
        char_end: usize,
    ) -> Self {
        let source = source.into();
        Self {
            id: chunk_id(&source, ordinal),
            text,
            source,
            ordinal,
            char_start,
            char_end,
        }
    }

    /// Number of characters in the chunk.
    pub fn len(&self) -> usize {
        self.char_end - self.char_start
    }

    pub fn is_empty(&self) -> bool {
        self.char_end == self.char_start
    }

    /// UUID derived from the chunk id, for indexes that only accept UUID keys.
    pub fn point_id(&self) -> Uuid {
        point_id(&self.id)
    }
}

/// Stable identifier for the `ordinal`-th chunk of `source`.
pub fn chunk_id(source: &str, ordinal: usize) -> String {
    format!("doc_{}_{}", source, ordinal)
}

pub fn point_id(chunk_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes())
}

/// Where a chunk may end, strongest preference first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Sentence,
    Whitespace,
}

/// Character-bounded chunker that prefers natural boundaries.
#[derive(Debug, Clone)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a new chunker. Overlap is clamped below the size.
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            overlap: overlap.min(size.saturating_sub(1)),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into chunks that cover it without gaps.
    pub fn chunk(&self, text: &str, source: impl Into<String>) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let source = source.into();
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = self.find_end(&chars, start);
            let chunk_text: String = chars[start..end].iter().collect();
            chunks.push(Chunk::new(chunk_text, source.clone(), chunks.len(), start, end));

            if end == total {
                break;
            }

            // Must always advance, even when the overlap swallows the chunk
            start = end.saturating_sub(self.overlap).max(start + 1);
        }

        chunks
    }

    fn find_end(&self, chars: &[char], start: usize) -> usize {
        let hard_end = (start + self.size).min(chars.len());
        if hard_end == chars.len() {
            return hard_end;
        }

        // Only look for a boundary in the second half of the window so chunks
        // stay reasonably full.
        let floor = start + self.size / 2;
        let mut best: Option<(Boundary, usize)> = None;

        for end in (floor.max(start + 1)..=hard_end).rev() {
            let Some(kind) = boundary_before(chars, end) else {
                continue;
            };
            match best {
                Some((current, _)) if rank(current) <= rank(kind) => {}
                _ => best = Some((kind, end)),
            }
            if kind == Boundary::Paragraph {
                break;
            }
        }

        best.map(|(_, end)| end).unwrap_or(hard_end)
    }
}

fn rank(boundary: Boundary) -> u8 {
    match boundary {
        Boundary::Paragraph => 0,
        Boundary::Sentence => 1,
        Boundary::Whitespace => 2,
    }
}

/// Classify the cut between `chars[end - 1]` and `chars[end]`.
fn boundary_before(chars: &[char], end: usize) -> Option<Boundary> {
    let prev = chars[end - 1];
    if prev == '\n' && end >= 2 && chars[end - 2] == '\n' {
        return Some(Boundary::Paragraph);
    }
    if prev.is_whitespace() && end >= 2 && matches!(chars[end - 2], '.' | '?' | '!' | ';') {
        return Some(Boundary::Sentence);
    }
    if prev.is_whitespace() {
        return Some(Boundary::Whitespace);
    }
    None
}

/// Rebuild the source text from its chunks, skipping overlapped prefixes.
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered: usize = 0;

    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.char_start);
        text.extend(chunk.text.chars().skip(skip));
        covered = covered.max(chunk.char_end);
    }

    text
}
