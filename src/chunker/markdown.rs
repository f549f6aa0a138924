//! Heading-based chunking for Markdown documents.
//!
//! Splits at `#`..`######` heading lines so each chunk is one section;
//! content before the first heading becomes an implicit `(intro)` section.

use super::symbols::{file_chunk, merge_small_symbols, symbols_to_chunks, RawSymbol};
use super::{estimate_tokens, Chunk, Chunker, ChunkingConfig, FileMetadata};
use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").unwrap());

/// Heading-based chunker for Markdown files.
pub struct MarkdownChunker {
    config: ChunkingConfig,
}

struct Section {
    heading: String,
    start_line: usize,
    content: String,
}

impl MarkdownChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    fn extract_sections(&self, lines: &[&str]) -> Vec<RawSymbol> {
        let mut sections: Vec<RawSymbol> = Vec::new();
        let mut current: Option<Section> = None;

        for (i, line) in lines.iter().enumerate() {
            let line_num = i + 1;

            if let Some(caps) = HEADING_RE.captures(line) {
                if let Some(sec) = current.take() {
                    sections.push(close_section(sec, line_num - 1));
                }
                current = Some(Section {
                    heading: caps[2].to_string(),
                    start_line: line_num,
                    content: line.to_string(),
                });
            } else if let Some(sec) = current.as_mut() {
                sec.content.push('\n');
                sec.content.push_str(line);
            } else {
                current = Some(Section {
                    heading: "(intro)".to_string(),
                    start_line: line_num,
                    content: line.to_string(),
                });
            }
        }

        if let Some(sec) = current {
            sections.push(close_section(sec, lines.len()));
        }

        sections
    }
}

fn close_section(sec: Section, end_line: usize) -> RawSymbol {
    RawSymbol {
        name: sec.heading,
        symbol_type: "heading".to_string(),
        start_line: sec.start_line,
        end_line,
        tokens: estimate_tokens(&sec.content),
        content: sec.content,
    }
}

impl Chunker for MarkdownChunker {
    fn chunk(&self, content: &[u8], metadata: &FileMetadata) -> Result<Vec<Chunk>> {
        let source = String::from_utf8_lossy(content);
        let lines: Vec<&str> = source.split('\n').collect();

        let mut sections = self.extract_sections(&lines);
        if sections.is_empty() {
            // Use the first heading as the fallback symbol when there is one.
            let symbol = lines
                .iter()
                .find_map(|l| HEADING_RE.captures(l).map(|c| c[2].to_string()))
                .unwrap_or_else(|| metadata.file_path.clone());
            return Ok(file_chunk(&source, &symbol, metadata, "markdown"));
        }

        if self.config.merge_small_chunks {
            sections = merge_small_symbols(sections, &self.config);
        }

        Ok(symbols_to_chunks(
            sections,
            metadata,
            "markdown",
            &metadata.module,
        ))
    }

    fn name(&self) -> &'static str {
        "heading"
    }
}
