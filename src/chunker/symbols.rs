//! Shared machinery for symbol-based chunkers: extracted symbols, leading
//! documentation absorption, small-symbol merging, and chunk conversion.

use super::{chunk_id, estimate_tokens, hash_content, Chunk, ChunkingConfig, FileMetadata};

/// A symbol extracted from a source file, before merging and id assignment.
#[derive(Debug, Clone)]
pub(crate) struct RawSymbol {
    pub name: String,
    pub symbol_type: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    pub tokens: usize,
}

impl RawSymbol {
    pub fn new(
        name: impl Into<String>,
        symbol_type: impl Into<String>,
        start_line: usize,
        end_line: usize,
        content: String,
    ) -> Self {
        let tokens = estimate_tokens(&content);
        Self {
            name: name.into(),
            symbol_type: symbol_type.into(),
            start_line,
            end_line,
            content,
            tokens,
        }
    }
}

/// Which leading lines count as documentation for a language family.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DocStyle {
    /// Prefixes of single-line comments (also covers doc comments)
    pub line_prefixes: &'static [&'static str],
    /// Prefixes of decorators or attributes that belong to the symbol
    pub attr_prefixes: &'static [&'static str],
    /// Whether `/** ... */` blocks are recognized
    pub block_comments: bool,
}

pub(crate) const RUST_DOC: DocStyle = DocStyle {
    line_prefixes: &["//"],
    attr_prefixes: &["#["],
    block_comments: false,
};

pub(crate) const GO_DOC: DocStyle = DocStyle {
    line_prefixes: &["//"],
    attr_prefixes: &[],
    block_comments: false,
};

pub(crate) const TS_DOC: DocStyle = DocStyle {
    line_prefixes: &["//"],
    attr_prefixes: &["@"],
    block_comments: true,
};

pub(crate) const PHP_DOC: DocStyle = DocStyle {
    line_prefixes: &["//"],
    attr_prefixes: &["#["],
    block_comments: true,
};

/// Extend a symbol's start line upward to absorb the contiguous run of
/// comment, decorator, and attribute lines immediately above it. Blank
/// lines are skipped but do not extend the range by themselves.
pub(crate) fn doc_start_line(lines: &[&str], symbol_line: usize, style: DocStyle) -> usize {
    let mut start_line = symbol_line;
    if symbol_line < 2 {
        return start_line;
    }

    let mut i = symbol_line - 2; // index of the line above the symbol
    loop {
        let line = lines[i].trim();

        if style.block_comments && line.ends_with("*/") {
            // Walk back to the opening of the block comment.
            for j in (0..=i).rev() {
                if lines[j].contains("/*") {
                    return j + 1;
                }
            }
            return start_line;
        }

        let is_line_comment = style.line_prefixes.iter().any(|p| line.starts_with(p));
        let is_attr = style.attr_prefixes.iter().any(|p| line.starts_with(p));

        if is_line_comment || is_attr {
            start_line = i + 1;
        } else if !line.is_empty() {
            break;
        }

        if i == 0 {
            break;
        }
        i -= 1;
    }

    start_line
}

/// Merge symbols below `min_tokens` so that no undersized chunk survives
/// standalone.
///
/// Walks symbols in source order with a single `pending` accumulator of
/// undersized items. A following full-sized symbol absorbs the pending
/// prefix when the combined size stays within `max_tokens`; otherwise the
/// pending run is flushed as a `combined` chunk. A trailing pending run is
/// attached to the last full-sized symbol, or emitted alone when the whole
/// file is undersized.
pub(crate) fn merge_small_symbols(symbols: Vec<RawSymbol>, cfg: &ChunkingConfig) -> Vec<RawSymbol> {
    if !cfg.merge_small_chunks || symbols.len() <= 1 {
        return symbols;
    }

    struct Pending {
        sym: RawSymbol,
        count: usize,
    }

    let mut result: Vec<RawSymbol> = Vec::with_capacity(symbols.len());
    let mut pending: Option<Pending> = None;

    for mut sym in symbols {
        if sym.tokens < cfg.min_tokens {
            if let Some(p) = pending.as_mut() {
                p.sym.content.push_str("\n\n");
                p.sym.content.push_str(&sym.content);
                p.sym.end_line = p.sym.end_line.max(sym.end_line);
                p.sym.tokens = estimate_tokens(&p.sym.content);
                p.sym.name = format!("{}+{}", p.sym.name, sym.name);
                p.count += 1;
            } else {
                pending = Some(Pending { sym, count: 1 });
            }
        } else {
            if let Some(p) = pending.take() {
                if p.sym.tokens + sym.tokens <= cfg.max_tokens {
                    sym.content = format!("{}\n\n{}", p.sym.content, sym.content);
                    sym.start_line = sym.start_line.min(p.sym.start_line);
                    sym.tokens = estimate_tokens(&sym.content);
                    sym.name = format!("{}+{}", sym.name, p.count);
                } else {
                    result.push(combined(p.sym));
                }
            }
            result.push(sym);
        }
    }

    if let Some(p) = pending {
        if let Some(last) = result.last_mut() {
            last.content.push_str("\n\n");
            last.content.push_str(&p.sym.content);
            last.end_line = last.end_line.max(p.sym.end_line);
            last.tokens = estimate_tokens(&last.content);
            last.name = format!("{}+{}", last.name, p.count);
        } else {
            result.push(combined(p.sym));
        }
    }

    result
}

fn combined(mut sym: RawSymbol) -> RawSymbol {
    sym.symbol_type = "combined".to_string();
    sym
}

/// Find the line of the closing brace for a block that opens at or after
/// `start_line`, tracking depth with a single-character state machine that
/// skips simple single/double/back-quoted string contents
/// (backslash-escape aware).
pub(crate) fn find_brace_end(lines: &[&str], start_line: usize) -> usize {
    let mut depth: i32 = 0;
    let mut found_open = false;

    for (i, line) in lines.iter().enumerate().skip(start_line.saturating_sub(1)) {
        let bytes = line.as_bytes();
        let mut in_string = false;
        let mut string_char = 0u8;

        for j in 0..bytes.len() {
            let ch = bytes[j];

            if !in_string && (ch == b'"' || ch == b'\'' || ch == b'`') {
                in_string = true;
                string_char = ch;
                continue;
            }
            if in_string {
                if ch == string_char && (j == 0 || bytes[j - 1] != b'\\') {
                    in_string = false;
                }
                continue;
            }

            if ch == b'{' {
                depth += 1;
                found_open = true;
            } else if ch == b'}' {
                depth -= 1;
                if found_open && depth == 0 {
                    return i + 1;
                }
            }
        }
    }

    // No closing brace found; callers clamp at the next anchor and EOF.
    start_line + 50
}

/// Convert merged symbols into chunks, assigning deterministic ids.
pub(crate) fn symbols_to_chunks(
    symbols: Vec<RawSymbol>,
    metadata: &FileMetadata,
    language: &str,
    module: &str,
) -> Vec<Chunk> {
    symbols
        .into_iter()
        .map(|sym| {
            let content_hash = hash_content(&sym.content);
            Chunk {
                id: chunk_id(
                    &metadata.project_id,
                    &metadata.file_path,
                    &sym.name,
                    &content_hash,
                ),
                content: sym.content,
                symbol: sym.name,
                symbol_type: sym.symbol_type,
                start_line: sym.start_line,
                end_line: sym.end_line,
                token_count: sym.tokens,
                content_hash,
                file_path: metadata.file_path.clone(),
                language: language.to_string(),
                module: module.to_string(),
                project_id: metadata.project_id.clone(),
            }
        })
        .collect()
}

/// Emit the whole file as one chunk. Used when a strategy finds no symbols
/// or fails to parse.
pub(crate) fn file_chunk(
    content: &str,
    symbol: &str,
    metadata: &FileMetadata,
    language: &str,
) -> Vec<Chunk> {
    let content_hash = hash_content(content);
    vec![Chunk {
        id: chunk_id(&metadata.project_id, &metadata.file_path, symbol, &content_hash),
        content: content.to_string(),
        symbol: symbol.to_string(),
        symbol_type: "file".to_string(),
        start_line: 1,
        end_line: content.matches('\n').count() + 1,
        token_count: estimate_tokens(content),
        content_hash,
        file_path: metadata.file_path.clone(),
        language: language.to_string(),
        module: metadata.module.clone(),
        project_id: metadata.project_id.clone(),
    }]
}
