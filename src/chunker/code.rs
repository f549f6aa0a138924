//! AST-based chunking for languages with a bundled tree-sitter grammar.
//!
//! Extracts top-level function, method, and type declarations. Doc comments
//! and attributes immediately above a declaration extend its chunk upward.
//! When parsing yields nothing usable the whole file becomes one chunk.

use super::symbols::{
    doc_start_line, file_chunk, merge_small_symbols, symbols_to_chunks, DocStyle, RawSymbol,
    GO_DOC, RUST_DOC,
};
use super::{extract_lines, Chunk, Chunker, ChunkingConfig, FileMetadata};
use anyhow::Result;
use std::path::Path;
use tree_sitter::{Node, Parser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grammar {
    Rust,
    Go,
}

impl Grammar {
    fn language(self) -> tree_sitter::Language {
        match self {
            Grammar::Rust => tree_sitter_rust::LANGUAGE.into(),
            Grammar::Go => tree_sitter_go::LANGUAGE.into(),
        }
    }

    fn doc_style(self) -> DocStyle {
        match self {
            Grammar::Rust => RUST_DOC,
            Grammar::Go => GO_DOC,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Grammar::Rust => "rust",
            Grammar::Go => "go",
        }
    }
}

/// Function-level chunker backed by a real parser.
pub struct AstChunker {
    config: ChunkingConfig,
    grammar: Grammar,
}

impl AstChunker {
    pub fn rust(config: ChunkingConfig) -> Self {
        Self {
            config,
            grammar: Grammar::Rust,
        }
    }

    pub fn go(config: ChunkingConfig) -> Self {
        Self {
            config,
            grammar: Grammar::Go,
        }
    }

    fn fallback(&self, source: &str, metadata: &FileMetadata) -> Vec<Chunk> {
        let symbol = Path::new(&metadata.file_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| metadata.file_path.clone());
        file_chunk(source, &symbol, metadata, self.grammar.tag())
    }

    fn extract_symbols(&self, root: Node, lines: &[&str]) -> Vec<RawSymbol> {
        let mut symbols = Vec::new();
        let mut cursor = root.walk();

        for node in root.children(&mut cursor) {
            match self.grammar {
                Grammar::Rust => self.extract_rust(node, lines, &mut symbols),
                Grammar::Go => self.extract_go(node, lines, &mut symbols),
            }
        }

        symbols.sort_by_key(|s| s.start_line);
        symbols
    }

    fn extract_rust(&self, node: Node, lines: &[&str], out: &mut Vec<RawSymbol>) {
        match node.kind() {
            "function_item" => {
                if let Some(name) = field_text(node, "name", lines) {
                    out.push(self.symbol(node, lines, name, "function"));
                }
            }
            "struct_item" => {
                if let Some(name) = field_text(node, "name", lines) {
                    out.push(self.symbol(node, lines, name, "struct"));
                }
            }
            "enum_item" => {
                if let Some(name) = field_text(node, "name", lines) {
                    out.push(self.symbol(node, lines, name, "enum"));
                }
            }
            "trait_item" => {
                if let Some(name) = field_text(node, "name", lines) {
                    out.push(self.symbol(node, lines, name, "trait"));
                }
            }
            "type_item" => {
                if let Some(name) = field_text(node, "name", lines) {
                    out.push(self.symbol(node, lines, name, "type"));
                }
            }
            "impl_item" => {
                // The impl block itself is not a chunk; its methods are,
                // named Type::method.
                let type_name = field_text(node, "type", lines)
                    .map(|t| t.split('<').next().unwrap_or(&t).trim().to_string())
                    .unwrap_or_default();
                if let Some(body) = node.child_by_field_name("body") {
                    let mut cursor = body.walk();
                    for child in body.children(&mut cursor) {
                        if child.kind() == "function_item" {
                            if let Some(name) = field_text(child, "name", lines) {
                                let qualified = if type_name.is_empty() {
                                    name
                                } else {
                                    format!("{type_name}::{name}")
                                };
                                out.push(self.symbol(child, lines, qualified, "method"));
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn extract_go(&self, node: Node, lines: &[&str], out: &mut Vec<RawSymbol>) {
        match node.kind() {
            "function_declaration" => {
                if let Some(name) = field_text(node, "name", lines) {
                    out.push(self.symbol(node, lines, name, "function"));
                }
            }
            "method_declaration" => {
                if let Some(name) = field_text(node, "name", lines) {
                    let qualified = match go_receiver_type(node, lines) {
                        Some(recv) => format!("{recv}.{name}"),
                        None => name,
                    };
                    out.push(self.symbol(node, lines, qualified, "method"));
                }
            }
            "type_declaration" => {
                // One symbol per spec so grouped declarations stay disjoint.
                let mut cursor = node.walk();
                for spec in node.children(&mut cursor) {
                    if spec.kind() != "type_spec" {
                        continue;
                    }
                    let Some(name) = field_text(spec, "name", lines) else {
                        continue;
                    };
                    let symbol_type = match spec.child_by_field_name("type").map(|t| t.kind()) {
                        Some("struct_type") => "struct",
                        Some("interface_type") => "interface",
                        _ => "type",
                    };
                    out.push(self.symbol(spec, lines, name, symbol_type));
                }
            }
            _ => {}
        }
    }

    fn symbol(&self, node: Node, lines: &[&str], name: String, symbol_type: &str) -> RawSymbol {
        let mut start_line = node.start_position().row + 1;
        let end_line = node.end_position().row + 1;
        start_line = doc_start_line(lines, start_line, self.grammar.doc_style());
        let content = extract_lines(lines, start_line, end_line);
        RawSymbol::new(name, symbol_type, start_line, end_line, content)
    }
}

impl Chunker for AstChunker {
    fn chunk(&self, content: &[u8], metadata: &FileMetadata) -> Result<Vec<Chunk>> {
        let source = String::from_utf8_lossy(content);
        let lines: Vec<&str> = source.split('\n').collect();

        let mut parser = Parser::new();
        if parser.set_language(&self.grammar.language()).is_err() {
            return Ok(self.fallback(&source, metadata));
        }

        let Some(tree) = parser.parse(source.as_bytes(), None) else {
            return Ok(self.fallback(&source, metadata));
        };

        let mut symbols = self.extract_symbols(tree.root_node(), &lines);
        if symbols.is_empty() {
            return Ok(self.fallback(&source, metadata));
        }

        if self.config.merge_small_chunks {
            symbols = merge_small_symbols(symbols, &self.config);
        }

        let module = if self.grammar == Grammar::Go && metadata.module.is_empty() {
            go_package_name(tree.root_node(), &lines).unwrap_or_default()
        } else {
            metadata.module.clone()
        };

        Ok(symbols_to_chunks(symbols, metadata, self.grammar.tag(), &module))
    }

    fn name(&self) -> &'static str {
        "function"
    }
}

fn field_text(node: Node, field: &str, lines: &[&str]) -> Option<String> {
    let child = node.child_by_field_name(field)?;
    node_text(child, lines)
}

fn node_text(node: Node, lines: &[&str]) -> Option<String> {
    let start = node.start_position();
    let end = node.end_position();
    if start.row != end.row {
        // Multi-line names do not occur for the kinds we extract.
        return None;
    }
    let line = lines.get(start.row)?;
    line.get(start.column..end.column).map(|s| s.to_string())
}

/// Receiver type for a Go method, with any pointer or generic decoration
/// stripped: `func (s *Server[T]) Close()` yields `Server`.
fn go_receiver_type(method: Node, lines: &[&str]) -> Option<String> {
    let receiver = method.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    for param in receiver.children(&mut cursor) {
        if param.kind() != "parameter_declaration" {
            continue;
        }
        let ty = param.child_by_field_name("type")?;
        let text = node_text(ty, lines)?;
        let cleaned = text.trim_start_matches('*');
        let cleaned = cleaned.split('[').next().unwrap_or(cleaned);
        return Some(cleaned.trim().to_string());
    }
    None
}

fn go_package_name(root: Node, lines: &[&str]) -> Option<String> {
    let mut cursor = root.walk();
    for node in root.children(&mut cursor) {
        if node.kind() == "package_clause" {
            let mut inner = node.walk();
            for child in node.children(&mut inner) {
                if child.kind() == "package_identifier" {
                    return node_text(child, lines);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(path: &str, project: &str) -> FileMetadata {
        FileMetadata {
            file_path: path.to_string(),
            language: super::super::detect_language(path),
            module: super::super::extract_module(path),
            project_id: project.to_string(),
        }
    }

    fn no_merge() -> ChunkingConfig {
        ChunkingConfig {
            merge_small_chunks: false,
            ..ChunkingConfig::default()
        }
    }

    #[test]
    fn rust_top_level_items() {
        let source = r#"/// Entry point.
fn main() {
    println!("hi");
}

pub struct Config {
    value: u32,
}

pub trait Runner {
    fn run(&self);
}

pub enum Mode {
    A,
    B,
}
"#;
        let chunker = AstChunker::rust(no_merge());
        let chunks = chunker.chunk(source.as_bytes(), &meta("src/main.rs", "p")).unwrap();

        let names: Vec<(&str, &str)> = chunks
            .iter()
            .map(|c| (c.symbol.as_str(), c.symbol_type.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("main", "function"),
                ("Config", "struct"),
                ("Runner", "trait"),
                ("Mode", "enum"),
            ]
        );
        // The doc comment belongs to main().
        assert!(chunks[0].content.starts_with("/// Entry point."));
        assert_eq!(chunks[0].start_line, 1);
    }

    #[test]
    fn rust_impl_methods_are_qualified() {
        let source = r#"struct Counter {
    n: u32,
}

impl Counter {
    /// Creates a zeroed counter.
    pub fn new() -> Self {
        Counter { n: 0 }
    }

    fn bump(&mut self) {
        self.n += 1;
    }
}
"#;
        let chunker = AstChunker::rust(no_merge());
        let chunks = chunker.chunk(source.as_bytes(), &meta("src/counter.rs", "p")).unwrap();

        let methods: Vec<&str> = chunks
            .iter()
            .filter(|c| c.symbol_type == "method")
            .map(|c| c.symbol.as_str())
            .collect();
        assert_eq!(methods, vec!["Counter::new", "Counter::bump"]);

        let new_chunk = chunks.iter().find(|c| c.symbol == "Counter::new").unwrap();
        assert!(new_chunk.content.starts_with("/// Creates a zeroed counter."));
    }

    #[test]
    fn go_functions_methods_and_types() {
        let source = r#"package server

// Server handles requests.
type Server struct {
	addr string
}

// Close shuts the server down.
func (s *Server) Close() error {
	return nil
}

func New(addr string) *Server {
	return &Server{addr: addr}
}

type Handler interface {
	Handle() error
}
"#;
        let chunker = AstChunker::go(no_merge());
        let chunks = chunker.chunk(source.as_bytes(), &meta("server.go", "p")).unwrap();

        let names: Vec<(&str, &str)> = chunks
            .iter()
            .map(|c| (c.symbol.as_str(), c.symbol_type.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Server", "struct"),
                ("Server.Close", "method"),
                ("New", "function"),
                ("Handler", "interface"),
            ]
        );

        let close = &chunks[1];
        assert!(close.content.starts_with("// Close shuts the server down."));
        // Top-level file: module falls back to the package name.
        assert_eq!(close.module, "server");
    }

    #[test]
    fn line_ranges_do_not_overlap() {
        let source = r#"fn a() {}

fn b() {}

struct S;
"#;
        let chunker = AstChunker::rust(no_merge());
        let mut chunks = chunker.chunk(source.as_bytes(), &meta("x.rs", "p")).unwrap();
        chunks.sort_by_key(|c| c.start_line);
        for pair in chunks.windows(2) {
            assert!(pair[0].end_line < pair[1].start_line);
        }
    }

    #[test]
    fn empty_parse_falls_back_to_file_chunk() {
        let source = "// only a comment\n";
        let chunker = AstChunker::rust(no_merge());
        let chunks = chunker.chunk(source.as_bytes(), &meta("src/empty.rs", "p")).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].symbol_type, "file");
        assert_eq!(chunks[0].symbol, "empty.rs");
        assert_eq!(chunks[0].start_line, 1);
    }

    #[test]
    fn deterministic_output() {
        let source = "fn f() { let x = 1; }\n\nstruct T(u8);\n";
        let chunker = AstChunker::rust(no_merge());
        let a = chunker.chunk(source.as_bytes(), &meta("d.rs", "p")).unwrap();
        let b = chunker.chunk(source.as_bytes(), &meta("d.rs", "p")).unwrap();
        let key = |cs: &[Chunk]| {
            cs.iter()
                .map(|c| (c.id.clone(), c.content_hash.clone(), c.start_line, c.end_line))
                .collect::<Vec<_>>()
        };
        assert_eq!(key(&a), key(&b));
    }
}
