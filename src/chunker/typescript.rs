//! Regex-based chunking for the TypeScript/JavaScript family.
//!
//! Anchors on top-level declarations, finds block ends with a brace-depth
//! scanner that skips string literals, and absorbs leading JSDoc comments
//! and decorators into each chunk.

use super::symbols::{
    doc_start_line, file_chunk, find_brace_end, merge_small_symbols, symbols_to_chunks, RawSymbol,
    TS_DOC,
};
use super::{extract_lines, Chunk, Chunker, ChunkingConfig, FileMetadata};
use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:export\s+)?(?:async\s+)?function\s+(\w+)\s*(?:<[^>]*>)?\s*\(").unwrap()
});

static ARROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:export\s+)?(?:const|let|var)\s+(\w+)\s*(?::\s*[^=]+)?\s*=\s*(?:async\s+)?(?:\([^)]*\)|[^=\s])\s*=>")
        .unwrap()
});

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(?:export\s+)?(?:abstract\s+)?class\s+(\w+)(?:\s+extends\s+\w+)?(?:\s+implements\s+[\w,\s<>]+)?\s*\{",
    )
    .unwrap()
});

static INTERFACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:export\s+)?interface\s+(\w+)(?:\s*<[^>]+>)?(?:\s+extends\s+[\w,\s<>]+)?\s*\{")
        .unwrap()
});

static TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:export\s+)?type\s+(\w+)(?:\s*<[^>]+>)?\s*=").unwrap());

static ENUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:export\s+)?(?:const\s+)?enum\s+(\w+)\s*\{").unwrap());

static EXPORT_DEFAULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^export\s+default\s+(?:async\s+)?(function|class)\s+(\w+)?").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Class,
    Interface,
    Enum,
    TypeAlias,
    Function,
    Arrow,
    DefaultFunction,
    DefaultClass,
}

impl Anchor {
    /// Collision priority when two patterns hit the same line; lower wins.
    fn priority(self) -> u8 {
        match self {
            Anchor::Class => 1,
            Anchor::Interface => 2,
            Anchor::Enum => 3,
            Anchor::TypeAlias => 4,
            Anchor::Function => 5,
            Anchor::Arrow => 6,
            Anchor::DefaultFunction | Anchor::DefaultClass => 7,
        }
    }

    fn symbol_type(self) -> &'static str {
        match self {
            Anchor::Class | Anchor::DefaultClass => "class",
            Anchor::Interface => "interface",
            Anchor::Enum => "enum",
            Anchor::TypeAlias => "type",
            Anchor::Function | Anchor::Arrow | Anchor::DefaultFunction => "function",
        }
    }
}

#[derive(Debug, Clone)]
struct SymbolMatch {
    name: String,
    anchor: Anchor,
    line: usize,
}

/// Function/class-level chunker for TypeScript and JavaScript.
pub struct TypeScriptChunker {
    config: ChunkingConfig,
}

impl TypeScriptChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    fn find_symbols(&self, content: &str) -> Vec<SymbolMatch> {
        let mut matches = Vec::new();

        let mut add = |re: &Regex, anchor: Anchor| {
            for caps in re.captures_iter(content) {
                let Some(name) = caps.get(1).map(|m| m.as_str().to_string()) else {
                    continue;
                };
                if name.is_empty() {
                    continue;
                }
                let offset = caps.get(0).map(|m| m.start()).unwrap_or(0);
                let line = content[..offset].matches('\n').count() + 1;
                matches.push(SymbolMatch { name, anchor, line });
            }
        };

        add(&CLASS_RE, Anchor::Class);
        add(&INTERFACE_RE, Anchor::Interface);
        add(&ENUM_RE, Anchor::Enum);
        add(&TYPE_RE, Anchor::TypeAlias);
        add(&FUNCTION_RE, Anchor::Function);
        add(&ARROW_RE, Anchor::Arrow);

        // Export-default captures the keyword first, the (optional) name
        // second; anonymous defaults are skipped like any unnamed match.
        for caps in EXPORT_DEFAULT_RE.captures_iter(content) {
            let Some(name) = caps.get(2).map(|m| m.as_str().to_string()) else {
                continue;
            };
            let anchor = match caps.get(1).map(|m| m.as_str()) {
                Some("class") => Anchor::DefaultClass,
                _ => Anchor::DefaultFunction,
            };
            let offset = caps.get(0).map(|m| m.start()).unwrap_or(0);
            let line = content[..offset].matches('\n').count() + 1;
            matches.push(SymbolMatch { name, anchor, line });
        }

        dedup_by_line(matches)
    }

    fn extract_boundaries(&self, lines: &[&str], matches: &[SymbolMatch]) -> Vec<RawSymbol> {
        let mut symbols = Vec::with_capacity(matches.len());
        let mut prev_end = 0usize;

        for (i, m) in matches.iter().enumerate() {
            let mut start_line = doc_start_line(lines, m.line, TS_DOC);
            // Never reach into the previous symbol's range.
            start_line = start_line.max(prev_end + 1);

            let mut end_line = if m.anchor == Anchor::TypeAlias {
                find_type_end(lines, m.line)
            } else {
                find_brace_end(lines, m.line)
            };

            if let Some(next) = matches.get(i + 1) {
                if end_line >= next.line {
                    end_line = next.line - 1;
                }
            }
            end_line = end_line.min(lines.len()).max(start_line);

            let content = extract_lines(lines, start_line, end_line);
            symbols.push(RawSymbol::new(
                m.name.clone(),
                m.anchor.symbol_type(),
                start_line,
                end_line,
                content,
            ));
            prev_end = end_line;
        }

        symbols
    }
}

impl Chunker for TypeScriptChunker {
    fn chunk(&self, content: &[u8], metadata: &FileMetadata) -> Result<Vec<Chunk>> {
        let source = String::from_utf8_lossy(content);
        let lines: Vec<&str> = source.split('\n').collect();

        let mut matches = self.find_symbols(&source);
        if matches.is_empty() {
            return Ok(file_chunk(
                &source,
                &metadata.file_path,
                metadata,
                &metadata.language,
            ));
        }
        matches.sort_by_key(|m| m.line);

        let mut symbols = self.extract_boundaries(&lines, &matches);
        if self.config.merge_small_chunks {
            symbols = merge_small_symbols(symbols, &self.config);
        }

        Ok(symbols_to_chunks(
            symbols,
            metadata,
            &metadata.language,
            &metadata.module,
        ))
    }

    fn name(&self) -> &'static str {
        "typescript"
    }
}

fn dedup_by_line(matches: Vec<SymbolMatch>) -> Vec<SymbolMatch> {
    let mut by_line: HashMap<usize, SymbolMatch> = HashMap::new();
    for m in matches {
        let wins = by_line
            .get(&m.line)
            .map(|existing| m.anchor.priority() < existing.anchor.priority())
            .unwrap_or(true);
        if wins {
            by_line.insert(m.line, m);
        }
    }
    by_line.into_values().collect()
}

/// A type alias ends at the first top-level `;` or where the next
/// declaration begins.
fn find_type_end(lines: &[&str], start_line: usize) -> usize {
    let mut depth: i32 = 0;

    for (i, line) in lines.iter().enumerate().skip(start_line.saturating_sub(1)) {
        for ch in line.chars() {
            match ch {
                '{' | '<' | '(' => depth += 1,
                '}' | '>' | ')' => depth -= 1,
                ';' if depth == 0 => return i + 1,
                _ => {}
            }
        }

        if depth == 0 {
            if let Some(next) = lines.get(i + 1) {
                let next = next.trim_start();
                const STARTERS: [&str; 7] = [
                    "export ", "type ", "interface ", "class ", "function ", "const ", "let ",
                ];
                if STARTERS.iter().any(|s| next.starts_with(s)) {
                    return i + 1;
                }
            }
        }
    }

    start_line
}
