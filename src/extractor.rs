//! Tree-sitter symbol extraction driven by per-language declaration tables.
use std::borrow::Cow;
use std::path::Path;

use tree_sitter::{Language, Node, Parser, Tree};

use crate::error::Error;
use crate::types::{Symbol, SymbolKind};

/// Signatures longer than this are truncated.
const MAX_SIGNATURE_CHARS: usize = 240;

/// How a declaration node's name is found.
#[derive(Debug, Clone, Copy)]
pub enum NameSource {
    /// Each `variable_declarator` child yields its own symbol.
    Declarators,
    /// Text of the named field.
    Field(&'static str),
    /// Markdown heading text of the section.
    Heading,
}

/// Where leading documentation lives for a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocStyle {
    /// Contiguous comment nodes immediately above the declaration.
    Comments,
    /// No documentation convention.
    Nothing,
    /// First statement of the body is a string literal.
    PythonString,
}

/// One declaration form recognised in a grammar.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    /// Base kind; functions inside containers become methods.
    pub kind: SymbolKind,
    /// How the symbol's name is read.
    pub name: NameSource,
    /// Tree-sitter node kind this rule matches.
    pub node_kind: &'static str,
    /// Optional refinement of the kind by inspecting the node.
    pub refine: Option<for<'t> fn(Node<'t>) -> SymbolKind>,
    /// Only recognised at top level or directly inside a container.
    pub scoped: bool,
}

impl Rule {
    /// Rule with a name field called `name`, recognised anywhere.
    const fn named(node_kind: &'static str, kind: SymbolKind) -> Self {
        return Self {
            kind,
            name: NameSource::Field("name"),
            node_kind,
            refine: None,
            scoped: false,
        };
    }

    /// Same as [`Rule::named`] but only at container scope.
    const fn scoped(node_kind: &'static str, kind: SymbolKind) -> Self {
        return Self {
            scoped: true,
            ..Self::named(node_kind, kind)
        };
    }
}

/// Declaration table for one grammar.
#[derive(Debug)]
pub struct GrammarSpec {
    /// Node kinds of attributes that precede and belong to a declaration.
    pub attributes: &'static [&'static str],
    /// Field holding a declaration's body; text before it is the signature.
    pub body_field: &'static str,
    /// Documentation convention.
    pub docs: DocStyle,
    /// Recognised declaration forms.
    pub rules: &'static [Rule],
    /// Wrapper node kinds and the field holding the wrapped declaration.
    /// The wrapper's range (decorators, `export`) becomes the symbol's range.
    pub wrappers: &'static [(&'static str, &'static str)],
}

impl GrammarSpec {
    /// Rule matching a node kind, if any.
    fn rule_for(&self, kind: &str) -> Option<&Rule> {
        return self.rules.iter().find(|r| return r.node_kind == kind);
    }

    /// Field name of the declaration inside a wrapper node kind.
    fn wrapped_field(&self, kind: &str) -> Option<&'static str> {
        return self
            .wrappers
            .iter()
            .find(|(wrapper, _)| return *wrapper == kind)
            .map(|(_, field)| return *field);
    }
}

// ── Language tables ────────────────────────────────────────────────────

/// Rust items, impl blocks, and trait method signatures.
pub static RUST: GrammarSpec = GrammarSpec {
    attributes: &["attribute_item"],
    body_field: "body",
    docs: DocStyle::Comments,
    rules: &[
        Rule::named("function_item", SymbolKind::Function),
        Rule::named("function_signature_item", SymbolKind::Function),
        Rule::named("struct_item", SymbolKind::Struct),
        Rule::named("union_item", SymbolKind::Struct),
        Rule::named("enum_item", SymbolKind::Enum),
        Rule::named("trait_item", SymbolKind::Interface),
        Rule::named("type_item", SymbolKind::Type),
        Rule::named("mod_item", SymbolKind::Module),
        Rule::named("macro_definition", SymbolKind::Function),
        Rule {
            name: NameSource::Field("type"),
            ..Rule::named("impl_item", SymbolKind::Impl)
        },
        Rule::scoped("const_item", SymbolKind::Constant),
        Rule::scoped("static_item", SymbolKind::Constant),
    ],
    wrappers: &[],
};

/// Python functions and classes, including decorated ones.
pub static PYTHON: GrammarSpec = GrammarSpec {
    attributes: &[],
    body_field: "body",
    docs: DocStyle::PythonString,
    rules: &[
        Rule::named("function_definition", SymbolKind::Function),
        Rule::named("class_definition", SymbolKind::Class),
    ],
    wrappers: &[("decorated_definition", "definition")],
};

/// Go functions, methods, and type/const/var specs.
pub static GO: GrammarSpec = GrammarSpec {
    attributes: &[],
    body_field: "body",
    docs: DocStyle::Comments,
    rules: &[
        Rule::named("function_declaration", SymbolKind::Function),
        Rule::named("method_declaration", SymbolKind::Method),
        Rule {
            refine: Some(go_type_kind),
            ..Rule::named("type_spec", SymbolKind::Type)
        },
        Rule::named("type_alias", SymbolKind::Type),
        Rule::scoped("const_spec", SymbolKind::Constant),
        Rule::scoped("var_spec", SymbolKind::Variable),
    ],
    wrappers: &[],
};

/// TypeScript and JavaScript declarations.
pub static TYPESCRIPT: GrammarSpec = GrammarSpec {
    attributes: &[],
    body_field: "body",
    docs: DocStyle::Comments,
    rules: &[
        Rule::named("function_declaration", SymbolKind::Function),
        Rule::named("generator_function_declaration", SymbolKind::Function),
        Rule::named("class_declaration", SymbolKind::Class),
        Rule::named("abstract_class_declaration", SymbolKind::Class),
        Rule::named("interface_declaration", SymbolKind::Interface),
        Rule::named("type_alias_declaration", SymbolKind::Type),
        Rule::named("enum_declaration", SymbolKind::Enum),
        Rule::named("method_definition", SymbolKind::Method),
        Rule::named("method_signature", SymbolKind::Method),
        Rule::named("abstract_method_signature", SymbolKind::Method),
        Rule::named("internal_module", SymbolKind::Module),
        Rule::named("module", SymbolKind::Module),
        Rule {
            name: NameSource::Declarators,
            ..Rule::scoped("lexical_declaration", SymbolKind::Variable)
        },
        Rule {
            name: NameSource::Declarators,
            ..Rule::scoped("variable_declaration", SymbolKind::Variable)
        },
    ],
    wrappers: &[("export_statement", "declaration")],
};

/// Bash function definitions.
pub static BASH: GrammarSpec = GrammarSpec {
    attributes: &[],
    body_field: "body",
    docs: DocStyle::Comments,
    rules: &[Rule::named("function_definition", SymbolKind::Function)],
    wrappers: &[],
};

/// Markdown heading sections, nested by level.
pub static MARKDOWN: GrammarSpec = GrammarSpec {
    attributes: &[],
    body_field: "",
    docs: DocStyle::Nothing,
    rules: &[Rule {
        kind: SymbolKind::Section,
        name: NameSource::Heading,
        node_kind: "section",
        refine: None,
        scoped: false,
    }],
    wrappers: &[],
};

/// Go `type X struct/interface/...` maps onto struct, interface, or type.
fn go_type_kind(node: Node<'_>) -> SymbolKind {
    return match node.child_by_field_name("type").map(|t| return t.kind()) {
        Some("struct_type") => SymbolKind::Struct,
        Some("interface_type") => SymbolKind::Interface,
        _ => SymbolKind::Type,
    };
}

// ── Extraction ─────────────────────────────────────────────────────────

/// Parse `source` and extract its symbols in file order.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if the grammar cannot be loaded, parsing is
/// aborted, or the tree contains syntax errors.
pub fn extract(
    file_path: &Path,
    source: &[u8],
    language: &Language,
    spec: &'static GrammarSpec,
) -> Result<Vec<Symbol>, Error> {
    let tree = parse_source(file_path, source, language)?;
    let root = tree.root_node();

    if root.has_error() {
        let (line, reason) = first_syntax_error(root).map_or_else(
            || return (1, "syntax error".to_string()),
            |node| return (one_based_line(node.start_position().row), describe_syntax_error(node)),
        );
        return Err(Error::ParseFailed {
            file: file_path.to_path_buf(),
            line,
            reason,
        });
    }

    let mut walker = SymbolWalker {
        source,
        spec,
        symbols: Vec::new(),
    };
    walker.visit_children(root, None);
    return Ok(walker.symbols);
}

/// Parse source bytes into a tree-sitter tree.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if the language cannot be set or parsing fails.
fn parse_source(file_path: &Path, source: &[u8], language: &Language) -> Result<Tree, Error> {
    let mut parser = Parser::new();
    parser.set_language(language).map_err(|e| {
        return Error::ParseFailed {
            file: file_path.to_path_buf(),
            line: 1,
            reason: e.to_string(),
        };
    })?;

    return parser.parse(source, None).ok_or_else(|| {
        return Error::ParseFailed {
            file: file_path.to_path_buf(),
            line: 1,
            reason: "tree-sitter returned None".to_string(),
        };
    });
}

/// Depth-first search for the first ERROR or MISSING node.
fn first_syntax_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_syntax_error(child) {
            return Some(found);
        }
    }
    return None;
}

/// Human-readable description of an error node.
fn describe_syntax_error(node: Node<'_>) -> String {
    if node.is_missing() {
        return format!("missing `{}`", node.kind());
    }
    let column = node.start_position().column.saturating_add(1);
    return format!("unexpected syntax at column {column}");
}

/// Convert a zero-based tree-sitter row to a one-based line number.
fn one_based_line(row: usize) -> u32 {
    return u32::try_from(row).unwrap_or(u32::MAX).saturating_add(1);
}

/// One-based last line of a node. A node ending at column 0 of a later row
/// only owns the newline of the row before it.
fn last_line(node: Node<'_>) -> u32 {
    let start = node.start_position();
    let end = node.end_position();
    if end.column == 0 && end.row > start.row {
        return one_based_line(end.row.saturating_sub(1));
    }
    return one_based_line(end.row);
}

/// Accumulates symbols during a pre-order walk.
struct SymbolWalker<'s> {
    /// Raw source bytes.
    source: &'s [u8],
    /// Grammar table for this language.
    spec: &'static GrammarSpec,
    /// Symbols found so far, in file order.
    symbols: Vec<Symbol>,
}

impl SymbolWalker<'_> {
    /// Visit each named child, unwrapping wrapper nodes.
    fn visit_children(&mut self, node: Node<'_>, parent: Option<usize>) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            let wrapped = self
                .spec
                .wrapped_field(child.kind())
                .and_then(|field| return child.child_by_field_name(field));
            match wrapped {
                Some(inner) => self.visit_declaration(inner, child, parent),
                None => self.visit_declaration(child, child, parent),
            }
        }
    }

    /// Record `node` if it is a declaration, then descend into it.
    /// `range_node` supplies the line range and leading docs (the wrapper, if any).
    fn visit_declaration(&mut self, node: Node<'_>, range_node: Node<'_>, parent: Option<usize>) {
        let Some(rule) = self.spec.rule_for(node.kind()).copied() else {
            self.visit_children(node, parent);
            return;
        };
        if rule.scoped && !self.is_container_scope(parent) {
            self.visit_children(node, parent);
            return;
        }

        match rule.name {
            NameSource::Declarators => self.record_declarators(node, range_node, parent),
            NameSource::Field(field) => {
                let name = node
                    .child_by_field_name(field)
                    .map(|n| return self.text(n.start_byte(), n.end_byte()).trim().to_string())
                    .filter(|n| return !n.is_empty());
                let Some(name) = name else {
                    self.visit_children(node, parent);
                    return;
                };
                let kind = self.effective_kind(&rule, node, parent);
                let idx = self.push(name, kind, node, range_node, parent);
                self.visit_children(node, Some(idx));
            },
            NameSource::Heading => {
                let Some(name) = self.heading_text(node) else {
                    self.visit_children(node, parent);
                    return;
                };
                let idx = self.push(name, rule.kind, node, range_node, parent);
                self.visit_children(node, Some(idx));
            },
        }
    }

    /// Emit one symbol per `variable_declarator`. With a single declarator the
    /// whole statement is the range so the symbol covers `const x = ...;`.
    fn record_declarators(&mut self, node: Node<'_>, range_node: Node<'_>, parent: Option<usize>) {
        let mut cursor = node.walk();
        let declarators: Vec<Node<'_>> = node
            .named_children(&mut cursor)
            .filter(|c| return c.kind() == "variable_declarator")
            .collect();
        let single = declarators.len() == 1;

        for declarator in declarators {
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            // Destructuring patterns have no single name.
            if name_node.kind() != "identifier" {
                continue;
            }
            let name = self.text(name_node.start_byte(), name_node.end_byte()).to_string();
            let kind = match declarator.child_by_field_name("value").map(|v| return v.kind()) {
                Some("arrow_function" | "function_expression" | "function" | "generator_function") => {
                    SymbolKind::Function
                },
                _ => SymbolKind::Variable,
            };
            let range = if single { range_node } else { declarator };
            let idx = self.push(name, kind, declarator, range, parent);
            self.visit_children(declarator, Some(idx));
        }
    }

    /// Functions directly inside a container are methods.
    fn effective_kind(&self, rule: &Rule, node: Node<'_>, parent: Option<usize>) -> SymbolKind {
        let base = rule.refine.map_or(rule.kind, |refine| return refine(node));
        if base == SymbolKind::Function && self.parent_kind(parent).is_some_and(SymbolKind::is_container) {
            return SymbolKind::Method;
        }
        return base;
    }

    /// Top level, or directly inside a container symbol.
    fn is_container_scope(&self, parent: Option<usize>) -> bool {
        return match self.parent_kind(parent) {
            None => true,
            Some(kind) => kind.is_container(),
        };
    }

    /// Kind of the symbol at `parent`, if there is one.
    fn parent_kind(&self, parent: Option<usize>) -> Option<SymbolKind> {
        return parent.and_then(|idx| return self.symbols.get(idx)).map(|s| return s.kind);
    }

    /// Append a symbol and return its index.
    fn push(
        &mut self,
        name: String,
        kind: SymbolKind,
        node: Node<'_>,
        range_node: Node<'_>,
        parent: Option<usize>,
    ) -> usize {
        let signature = self.signature(node, range_node);
        let own_row = range_node.start_position().row;
        let (docstring, first_row) = match self.spec.docs {
            DocStyle::Comments => self.leading_block(range_node),
            DocStyle::Nothing => (None, own_row),
            DocStyle::PythonString => (self.python_docstring(node), own_row),
        };
        self.symbols.push(Symbol {
            docstring,
            end_line: last_line(range_node),
            kind,
            name,
            parent,
            signature,
            start_line: one_based_line(first_row.min(own_row)),
        });
        return self.symbols.len().saturating_sub(1);
    }

    /// Source text between two byte offsets, lossily decoded.
    fn text(&self, start: usize, end: usize) -> Cow<'_, str> {
        let bytes = self.source.get(start..end).unwrap_or_default();
        return String::from_utf8_lossy(bytes);
    }

    /// Declaration header: everything before the body, on one line.
    fn signature(&self, node: Node<'_>, range_node: Node<'_>) -> Option<String> {
        let start = range_node.start_byte();
        let body_start = if self.spec.body_field.is_empty() {
            None
        } else {
            node.child_by_field_name(self.spec.body_field).map(|b| return b.start_byte())
        };
        let raw = match body_start {
            Some(body) if body > start => self.text(start, body).into_owned(),
            _ => self
                .text(start, range_node.end_byte())
                .lines()
                .next()
                .unwrap_or_default()
                .to_string(),
        };
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let trimmed = collapsed.trim_end_matches(['{', ':', ' ']).trim();
        if trimmed.is_empty() {
            return None;
        }
        return Some(trimmed.chars().take(MAX_SIGNATURE_CHARS).collect());
    }

    /// Doc comments and attributes directly above the declaration.
    ///
    /// Returns the cleaned comment text and the first row of the block, so
    /// the symbol's range carries its own `///` lines and `#[...]` attributes.
    fn leading_block(&self, range_node: Node<'_>) -> (Option<String>, usize) {
        let anchor = doc_anchor(range_node);
        let mut lines: Vec<String> = Vec::new();
        let mut first_row = anchor.start_position().row;
        let mut sibling = anchor.prev_named_sibling();

        while let Some(node) = sibling {
            let is_attribute = self.spec.attributes.contains(&node.kind());
            if !is_attribute && !node.kind().contains("comment") {
                break;
            }
            // `last_line` is one-based, so it equals the zero-based row after the node.
            let row_after = usize::try_from(last_line(node)).unwrap_or(usize::MAX);
            if (!is_attribute && row_after < first_row) || is_trailing(node) {
                break;
            }
            if !is_attribute {
                let text = self.text(node.start_byte(), node.end_byte());
                if text.starts_with("#!") {
                    break;
                }
                let cleaned: Vec<String> = text.lines().map(strip_comment_markers).collect();
                for line in cleaned.into_iter().rev() {
                    lines.push(line);
                }
            }
            first_row = node.start_position().row;
            sibling = node.prev_named_sibling();
        }

        lines.reverse();
        return (join_doc_lines(&lines), first_row);
    }

    /// Python docstring: first body statement when it is a bare string.
    fn python_docstring(&self, node: Node<'_>) -> Option<String> {
        let body = node.child_by_field_name("body")?;
        let mut cursor = body.walk();
        let first = body.named_children(&mut cursor).next()?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let mut inner = first.walk();
        let literal = first.named_children(&mut inner).next()?;
        if literal.kind() != "string" {
            return None;
        }
        let raw = self.text(literal.start_byte(), literal.end_byte());
        let unquoted = raw
            .trim_start_matches(['r', 'R', 'u', 'U', 'b', 'B', 'f', 'F'])
            .trim_start_matches("\"\"\"")
            .trim_start_matches("'''")
            .trim_end_matches("\"\"\"")
            .trim_end_matches("'''")
            .trim_matches(['"', '\'']);
        let lines: Vec<String> = unquoted.lines().map(|l| return l.trim().to_string()).collect();
        return join_doc_lines(&lines);
    }

    /// Heading text of a markdown section.
    fn heading_text(&self, section: Node<'_>) -> Option<String> {
        let mut cursor = section.walk();
        let heading = section
            .named_children(&mut cursor)
            .find(|c| return c.kind() == "atx_heading" || c.kind() == "setext_heading")?;
        let text = match heading.child_by_field_name("heading_content") {
            Some(content) => self.text(content.start_byte(), content.end_byte()).into_owned(),
            None => self
                .text(heading.start_byte(), heading.end_byte())
                .lines()
                .next()
                .unwrap_or_default()
                .trim_start_matches('#')
                .to_string(),
        };
        let trimmed = text.trim().trim_end_matches('#').trim();
        if trimmed.is_empty() {
            return None;
        }
        return Some(trimmed.to_string());
    }
}

/// Node whose preceding siblings hold the docs. Go specs sit inside a
/// `*_declaration` that starts on the same row and carries the comment.
fn doc_anchor(node: Node<'_>) -> Node<'_> {
    let mut anchor = node;
    while anchor.prev_named_sibling().is_none() {
        let Some(parent) = anchor.parent() else {
            break;
        };
        if !parent.kind().ends_with("_declaration")
            || parent.start_position().row != anchor.start_position().row
        {
            break;
        }
        anchor = parent;
    }
    return anchor;
}

/// A node that starts on the last line of the node before it.
fn is_trailing(node: Node<'_>) -> bool {
    return node.prev_named_sibling().is_some_and(|prev| {
        return usize::try_from(last_line(prev)).is_ok_and(|line| return line > node.start_position().row);
    });
}

/// Strip `///`, `//!`, `//`, `#`, `/**`, `*/`, and leading `*` from one comment line.
fn strip_comment_markers(line: &str) -> String {
    let mut text = line.trim();
    for marker in ["///", "//!", "//", "/**", "/*"] {
        if let Some(rest) = text.strip_prefix(marker) {
            text = rest;
            break;
        }
    }
    if let Some(rest) = text.strip_prefix('#') {
        text = rest;
    }
    text = text.strip_suffix("*/").unwrap_or(text).trim();
    text = text.strip_prefix('*').unwrap_or(text);
    return text.trim().to_string();
}

/// Join cleaned doc lines, dropping blank lines at either end.
fn join_doc_lines(lines: &[String]) -> Option<String> {
    let first = lines.iter().position(|l| return !l.is_empty())?;
    let last = lines.iter().rposition(|l| return !l.is_empty())?;
    let joined = lines.get(first..=last)?.join("\n");
    return Some(joined);
}
