//! Regex-based chunking for PHP.
//!
//! Anchors on top-level classes, interfaces, traits, enums, and standalone
//! functions; the file's namespace is captured into the module tag and
//! prefixes class symbols.

use super::symbols::{
    doc_start_line, file_chunk, find_brace_end, merge_small_symbols, RawSymbol, PHP_DOC,
};
use super::{chunk_id, extract_lines, hash_content, Chunk, Chunker, ChunkingConfig, FileMetadata};
use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^namespace\s+([\w\\]+)\s*;").unwrap());

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(?:abstract\s+|final\s+)?class\s+(\w+)(?:\s+extends\s+[\w\\]+)?(?:\s+implements\s+[\w\\,\s]+)?\s*\{?",
    )
    .unwrap()
});

static INTERFACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^interface\s+(\w+)(?:\s+extends\s+[\w\\,\s]+)?\s*\{").unwrap()
});

static TRAIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^trait\s+(\w+)\s*\{").unwrap());

static ENUM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^enum\s+(\w+)(?:\s*:\s*\w+)?(?:\s+implements\s+[\w\\,\s]+)?\s*\{").unwrap()
});

static FUNCTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^function\s+(\w+)\s*\(").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Class,
    Interface,
    Trait,
    Enum,
    Function,
}

impl Anchor {
    fn priority(self) -> u8 {
        match self {
            Anchor::Class => 1,
            Anchor::Interface => 2,
            Anchor::Trait => 3,
            Anchor::Enum => 4,
            Anchor::Function => 5,
        }
    }

    fn symbol_type(self) -> &'static str {
        match self {
            Anchor::Class => "class",
            Anchor::Interface => "interface",
            Anchor::Trait => "trait",
            Anchor::Enum => "enum",
            Anchor::Function => "function",
        }
    }
}

#[derive(Debug, Clone)]
struct SymbolMatch {
    name: String,
    anchor: Anchor,
    line: usize,
}

/// Function/class-level chunker for PHP.
pub struct PhpChunker {
    config: ChunkingConfig,
}

impl PhpChunker {
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
                let offset = caps.get(0).map(|m| m.start()).unwrap_or(0);
                let line = content[..offset].matches('\n').count() + 1;
                matches.push(SymbolMatch { name, anchor, line });
            }
        };

        // Class-level constructs first; methods inside them are not
        // separate top-level anchors.
        add(&CLASS_RE, Anchor::Class);
        add(&INTERFACE_RE, Anchor::Interface);
        add(&TRAIT_RE, Anchor::Trait);
        add(&ENUM_RE, Anchor::Enum);
        add(&FUNCTION_RE, Anchor::Function);

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

    fn extract_boundaries(&self, lines: &[&str], matches: &[SymbolMatch]) -> Vec<RawSymbol> {
        let mut symbols = Vec::with_capacity(matches.len());
        let mut prev_end = 0usize;

        for (i, m) in matches.iter().enumerate() {
            let mut start_line = doc_start_line(lines, m.line, PHP_DOC);
            start_line = start_line.max(prev_end + 1);

            let mut end_line = find_brace_end(lines, m.line);
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

impl Chunker for PhpChunker {
    fn chunk(&self, content: &[u8], metadata: &FileMetadata) -> Result<Vec<Chunk>> {
        let source = String::from_utf8_lossy(content);
        let lines: Vec<&str> = source.split('\n').collect();

        let namespace = NAMESPACE_RE
            .captures(&source)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let mut matches = self.find_symbols(&source);
        if matches.is_empty() {
            return Ok(file_chunk(&source, &metadata.file_path, metadata, "php"));
        }
        matches.sort_by_key(|m| m.line);

        let mut symbols = self.extract_boundaries(&lines, &matches);
        if self.config.merge_small_chunks {
            symbols = merge_small_symbols(symbols, &self.config);
        }

        let module = if namespace.is_empty() {
            metadata.module.clone()
        } else {
            namespace.clone()
        };

        let chunks = symbols
            .into_iter()
            .map(|sym| {
                let content_hash = hash_content(&sym.content);
                // The namespace qualifies the displayed class symbol; the
                // id keeps the bare name so edits elsewhere in the file do
                // not perturb it.
                let symbol = if !namespace.is_empty() && sym.symbol_type == "class" {
                    format!("{namespace}\\{}", sym.name)
                } else {
                    sym.name.clone()
                };
                Chunk {
                    id: chunk_id(
                        &metadata.project_id,
                        &metadata.file_path,
                        &sym.name,
                        &content_hash,
                    ),
                    content: sym.content,
                    symbol,
                    symbol_type: sym.symbol_type,
                    start_line: sym.start_line,
                    end_line: sym.end_line,
                    token_count: sym.tokens,
                    content_hash,
                    file_path: metadata.file_path.clone(),
                    language: "php".to_string(),
                    module: module.clone(),
                    project_id: metadata.project_id.clone(),
                }
            })
            .collect();

        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "php"
    }
}
