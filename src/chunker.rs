//! Chunking engine: splits file content into ordered, bounded, lossless chunks.
//!
//! Both modes cut on line boundaries only. Concatenating the chunks of either
//! mode in order reproduces the input exactly, trailing whitespace included.
use crate::types::{Chunk, ChunkMode, SplitPart, Symbol};

/// Pack whole lines into chunks of at most `max_lines` lines.
///
/// A budget of zero is treated as one line per chunk. Empty content yields
/// no chunks.
pub fn chunk_by_size(content: &str, max_lines: usize) -> Vec<Chunk> {
    let spans = line_spans(content);
    let budget = max_lines.max(1);
    let mut chunks = Vec::new();
    let mut first = 0_usize;
    while first < spans.len() {
        let last = first.saturating_add(budget).min(spans.len()).saturating_sub(1);
        if let Some(chunk) = make_chunk(content, &spans, first, last, ChunkMode::SizeBounded, None) {
            chunks.push(chunk);
        }
        first = last.saturating_add(1);
    }
    return chunks;
}

/// Pack whole top-level symbols into chunks of at most `max_lines` lines.
///
/// Lines between symbols fill chunks freely. A symbol that does not fit in
/// the open chunk starts a new one; a symbol longer than the budget is
/// force-split by size and every piece carries a [`SplitPart`] marker.
/// Only top-level symbols (no parent) seed boundaries; nested symbols travel
/// with their ancestor.
pub fn chunk_by_symbols(content: &str, symbols: &[Symbol], max_lines: usize) -> Vec<Chunk> {
    let spans = line_spans(content);
    let mut packer = Packer {
        chunks: Vec::new(),
        content,
        max_lines: max_lines.max(1),
        open: None,
        spans: &spans,
    };

    let mut next_line = 0_usize;
    for block in symbol_blocks(symbols, spans.len()) {
        while next_line < block.first {
            packer.push_line(next_line);
            next_line = next_line.saturating_add(1);
        }
        packer.push_block(&block);
        next_line = block.last.saturating_add(1);
    }
    while next_line < spans.len() {
        packer.push_line(next_line);
        next_line = next_line.saturating_add(1);
    }
    packer.flush();
    return packer.chunks;
}

/// A run of lines that must stay in one chunk if it fits.
#[derive(Debug)]
struct Block {
    /// Zero-based first line.
    first: usize,
    /// Zero-based last line, inclusive.
    last: usize,
    /// Name of the first symbol in the run, used for split markers.
    name: String,
}

impl Block {
    /// Lines spanned, inclusive.
    const fn len(&self) -> usize {
        return self.last.saturating_sub(self.first).saturating_add(1);
    }
}

/// Greedy chunk builder for symbol-aligned mode.
struct Packer<'a> {
    /// Finished chunks in order.
    chunks: Vec<Chunk>,
    /// Whole file text.
    content: &'a str,
    /// Budget in lines, at least one.
    max_lines: usize,
    /// Zero-based first and last line of the chunk being grown.
    open: Option<(usize, usize)>,
    /// Byte span of every line.
    spans: &'a [(usize, usize)],
}

impl Packer<'_> {
    /// Lines in the open chunk.
    fn open_len(&self) -> usize {
        return self
            .open
            .map_or(0, |(first, last)| return last.saturating_sub(first).saturating_add(1));
    }

    /// Add one freely divisible line.
    fn push_line(&mut self, line: usize) {
        if self.open_len() >= self.max_lines {
            self.flush();
        }
        self.extend_to(line, line);
    }

    /// Add a symbol run, keeping it whole whenever the budget allows.
    fn push_block(&mut self, block: &Block) {
        let len = block.len();
        if self.open_len().saturating_add(len) <= self.max_lines {
            self.extend_to(block.first, block.last);
            return;
        }
        self.flush();
        if len <= self.max_lines {
            self.open = Some((block.first, block.last));
            return;
        }

        let total = len.div_ceil(self.max_lines);
        let total_u32 = u32::try_from(total).unwrap_or(u32::MAX);
        tracing::debug!(symbol = %block.name, lines = len, pieces = total, "force-splitting symbol");
        let mut first = block.first;
        let mut part = 1_u32;
        while first <= block.last {
            let last = first.saturating_add(self.max_lines).saturating_sub(1).min(block.last);
            let split = SplitPart {
                part,
                symbol: block.name.clone(),
                total: total_u32,
            };
            if let Some(chunk) =
                make_chunk(self.content, self.spans, first, last, ChunkMode::SymbolAligned, Some(split))
            {
                self.chunks.push(chunk);
            }
            first = last.saturating_add(1);
            part = part.saturating_add(1);
        }
    }

    /// Grow the open chunk (or open a new one) to cover `first..=last`.
    fn extend_to(&mut self, first: usize, last: usize) {
        self.open = Some(match self.open {
            Some((start, _)) => (start, last),
            None => (first, last),
        });
    }

    /// Close the open chunk, if any.
    fn flush(&mut self) {
        let Some((first, last)) = self.open.take() else {
            return;
        };
        if let Some(chunk) = make_chunk(self.content, self.spans, first, last, ChunkMode::SymbolAligned, None) {
            self.chunks.push(chunk);
        }
    }
}

/// Top-level symbol ranges as zero-based line runs, sorted, with overlapping
/// or line-sharing runs merged and ends clamped to the file.
fn symbol_blocks(symbols: &[Symbol], line_count: usize) -> Vec<Block> {
    let mut ranges: Vec<Block> = symbols
        .iter()
        .filter(|s| return s.parent.is_none())
        .filter_map(|s| {
            let first = usize::try_from(s.start_line.saturating_sub(1)).ok()?;
            if first >= line_count {
                return None;
            }
            let last = usize::try_from(s.end_line.saturating_sub(1))
                .ok()?
                .min(line_count.saturating_sub(1))
                .max(first);
            return Some(Block {
                first,
                last,
                name: s.name.clone(),
            });
        })
        .collect();
    ranges.sort_by_key(|b| return b.first);

    let mut merged: Vec<Block> = Vec::with_capacity(ranges.len());
    for block in ranges {
        match merged.last_mut() {
            Some(prev) if block.first <= prev.last => prev.last = prev.last.max(block.last),
            _ => merged.push(block),
        }
    }
    return merged;
}

/// Byte span `[start, end)` of every line, newline included.
fn line_spans(content: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut offset = 0_usize;
    for line in content.split_inclusive('\n') {
        let end = offset.saturating_add(line.len());
        spans.push((offset, end));
        offset = end;
    }
    return spans;
}

/// Build the chunk covering zero-based lines `first..=last`.
fn make_chunk(
    content: &str,
    spans: &[(usize, usize)],
    first: usize,
    last: usize,
    mode: ChunkMode,
    split: Option<SplitPart>,
) -> Option<Chunk> {
    let (start_byte, _) = *spans.get(first)?;
    let (_, end_byte) = *spans.get(last)?;
    let text = content.get(start_byte..end_byte)?;
    return Some(Chunk {
        content: text.to_string(),
        end_byte,
        end_line: u32::try_from(last.saturating_add(1)).unwrap_or(u32::MAX),
        mode,
        split,
        start_byte,
        start_line: u32::try_from(first.saturating_add(1)).unwrap_or(u32::MAX),
    });
}
