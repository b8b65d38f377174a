//! Lightweight export-surface scan of JavaScript / TypeScript text
//!
//! Not a parser: the text is tokenized just enough to skip strings,
//! template literals, regular expressions and comments, then top-level
//! `import` / `export` statements are pattern matched. Anything it does
//! not understand is ignored, so the scan never fails.

use super::surface::{Binding, EdgeKind, ImportRequest, SurfaceRecord};
use crate::location::SourceLocation;

#[derive(Debug, Clone, PartialEq)]
enum TokKind {
    Ident(String),
    Str(String),
    Punct(char),
    Number,
    Template,
    Regex,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokKind,
    /// Bracket nesting depth the token sits at
    depth: usize,
    line: usize,
    column: usize,
    start: usize,
    end: usize,
}

struct Lexer<'a> {
    chars: Vec<(usize, char)>,
    text: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    depth: usize,
    tokens: Vec<Token>,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Keywords after which `/` starts a regular expression
const REGEX_PRECEDERS: [&str; 8] = ["return", "typeof", "case", "do", "else", "in", "of", "yield"];

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.char_indices().collect(),
            text,
            pos: 0,
            line: 1,
            column: 1,
            depth: 0,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.pos).map_or(self.text.len(), |(i, _)| *i)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokKind, depth: usize, line: usize, column: usize, start: usize) {
        let end = self.offset();
        self.tokens.push(Token {
            kind,
            depth,
            line,
            column,
            start,
            end,
        });
    }

    fn regex_allowed(&self) -> bool {
        match self.tokens.last().map(|t| &t.kind) {
            None => true,
            Some(TokKind::Punct(c)) => !matches!(c, ')' | ']' | '}'),
            Some(TokKind::Ident(word)) => REGEX_PRECEDERS.contains(&word.as_str()),
            Some(_) => false,
        }
    }

    fn run(mut self) -> Vec<Token> {
        while let Some(c) = self.peek() {
            let (line, column, start) = (self.line, self.column, self.offset());
            match c {
                _ if c.is_whitespace() => {
                    self.bump();
                }
                '/' if self.peek_at(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek_at(1) == Some('*') => self.skip_block_comment(),
                '/' if self.regex_allowed() => {
                    self.skip_regex();
                    self.push(TokKind::Regex, self.depth, line, column, start);
                }
                '"' | '\'' => {
                    let value = self.read_string(c);
                    self.push(TokKind::Str(value), self.depth, line, column, start);
                }
                '`' => {
                    self.skip_template();
                    self.push(TokKind::Template, self.depth, line, column, start);
                }
                '(' | '[' | '{' => {
                    self.bump();
                    self.push(TokKind::Punct(c), self.depth, line, column, start);
                    self.depth += 1;
                }
                ')' | ']' | '}' => {
                    self.bump();
                    self.depth = self.depth.saturating_sub(1);
                    self.push(TokKind::Punct(c), self.depth, line, column, start);
                }
                _ if is_ident_start(c) => {
                    let mut word = String::new();
                    while let Some(c) = self.peek().filter(|c| is_ident_continue(*c)) {
                        word.push(c);
                        self.bump();
                    }
                    self.push(TokKind::Ident(word), self.depth, line, column, start);
                }
                _ if c.is_ascii_digit() => {
                    while self.peek().is_some_and(|c| is_ident_continue(c) || c == '.') {
                        self.bump();
                    }
                    self.push(TokKind::Number, self.depth, line, column, start);
                }
                _ => {
                    self.bump();
                    self.push(TokKind::Punct(c), self.depth, line, column, start);
                }
            }
        }
        self.tokens
    }

    fn skip_line_comment(&mut self) {
        while self.peek().is_some_and(|c| c != '\n') {
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) {
        self.bump();
        self.bump();
        while let Some(c) = self.bump() {
            if c == '*' && self.peek() == Some('/') {
                self.bump();
                return;
            }
        }
    }

    fn read_string(&mut self, quote: char) -> String {
        self.bump();
        let mut value = String::new();
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    if let Some(escaped) = self.bump() {
                        value.push(escaped);
                    }
                }
                '\n' => break,
                _ if c == quote => break,
                _ => value.push(c),
            }
        }
        value
    }

    fn skip_template(&mut self) {
        self.bump();
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                '`' => return,
                '$' if self.peek() == Some('{') => {
                    self.bump();
                    self.skip_interpolation();
                }
                _ => {}
            }
        }
    }

    /// Skip `…}` of a `${…}` including nested braces, strings and templates
    fn skip_interpolation(&mut self) {
        let mut braces = 1usize;
        while let Some(c) = self.peek() {
            match c {
                '{' => {
                    braces += 1;
                    self.bump();
                }
                '}' => {
                    self.bump();
                    braces -= 1;
                    if braces == 0 {
                        return;
                    }
                }
                '"' | '\'' => {
                    self.read_string(c);
                }
                '`' => self.skip_template(),
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn skip_regex(&mut self) {
        self.bump();
        let mut in_class = false;
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => break,
                '\n' => return,
                _ => {}
            }
        }
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
    }
}

/// Surface of a native module
pub fn scan_native(file_path: &str, text: &str) -> SurfaceRecord {
    let tokens = Lexer::new(text).run();
    let mut scanner = Scanner {
        file_path,
        tokens: &tokens,
        record: SurfaceRecord::default(),
    };
    let mut i = 0;
    while i < tokens.len() {
        let at_statement = tokens[i].depth == 0
            && !matches!(i.checked_sub(1).map(|p| &tokens[p].kind), Some(TokKind::Punct('.')));
        i = match &tokens[i].kind {
            TokKind::Ident(word) if at_statement && word == "import" => scanner.import(i),
            TokKind::Ident(word) if at_statement && word == "export" => scanner.export(i),
            _ => i + 1,
        };
    }
    scanner.record
}

struct Scanner<'t> {
    file_path: &'t str,
    tokens: &'t [Token],
    record: SurfaceRecord,
}

impl<'t> Scanner<'t> {
    fn kind(&self, i: usize) -> Option<&'t TokKind> {
        let tokens: &'t [Token] = self.tokens;
        tokens.get(i).map(|t| &t.kind)
    }

    fn is_word(&self, i: usize, word: &str) -> bool {
        matches!(self.kind(i), Some(TokKind::Ident(w)) if w == word)
    }

    fn is_punct(&self, i: usize, c: char) -> bool {
        self.kind(i) == Some(&TokKind::Punct(c))
    }

    fn ident(&self, i: usize) -> Option<&'t str> {
        match self.kind(i) {
            Some(TokKind::Ident(w)) => Some(w),
            _ => None,
        }
    }

    /// Identifier or string module-export name (`"a-b" as x`)
    fn export_name(&self, i: usize) -> Option<&'t str> {
        match self.kind(i) {
            Some(TokKind::Ident(w)) | Some(TokKind::Str(w)) => Some(w),
            _ => None,
        }
    }

    fn location(&self, i: usize) -> SourceLocation {
        let t = &self.tokens[i];
        SourceLocation::new(self.file_path, t.line, t.column)
    }

    /// `from "spec"` at `i`: (specifier, span, index after)
    fn from_clause(&self, i: usize) -> Option<(String, (usize, usize), usize)> {
        if !self.is_word(i, "from") {
            return None;
        }
        match self.tokens.get(i + 1) {
            Some(Token {
                kind: TokKind::Str(spec),
                start,
                end,
                ..
            }) => Some((spec.clone(), (*start, *end), i + 2)),
            _ => None,
        }
    }

    /// `{ a, b as c, type d }` starting at the `{`; returns bindings and index after `}`
    fn brace_list(&self, open: usize) -> (Vec<Binding>, usize) {
        let mut bindings = Vec::new();
        let mut i = open + 1;
        while i < self.tokens.len() && !self.is_punct(i, '}') {
            if self.is_punct(i, ',') {
                i += 1;
                continue;
            }
            // `type X` entries are erased at runtime
            if self.is_word(i, "type") && self.export_name(i + 1).is_some() && !self.is_word(i + 1, "as") {
                i += if self.is_word(i + 2, "as") { 4 } else { 2 };
                continue;
            }
            let Some(name) = self.export_name(i) else {
                i += 1;
                continue;
            };
            if self.is_word(i + 1, "as") {
                if let Some(alias) = self.export_name(i + 2) {
                    bindings.push(Binding::new(name, alias));
                    i += 3;
                    continue;
                }
            }
            bindings.push(Binding::new(name, name));
            i += 1;
        }
        (bindings, i + 1)
    }

    fn import(&mut self, at: usize) -> usize {
        let location = self.location(at);
        let mut i = at + 1;
        // `import(…)`, `import.meta`
        if self.is_punct(i, '(') || self.is_punct(i, '.') {
            return i;
        }
        if let Some(Token {
            kind: TokKind::Str(spec),
            start,
            end,
            ..
        }) = self.tokens.get(i)
        {
            let request = ImportRequest::side_effect(spec, location).with_span(*start, *end);
            self.record.imports.push(request);
            return i + 1;
        }
        // `import type …` is erased at runtime
        if self.is_word(i, "type") && !self.is_word(i + 1, "from") && !self.is_punct(i + 1, ',') {
            return i + 1;
        }

        let mut default_local = None;
        let mut namespace_local = None;
        let mut named = Vec::new();
        loop {
            if let Some((spec, (start, end), next)) = self.from_clause(i) {
                let mut bindings = Vec::new();
                if let Some(local) = default_local {
                    bindings.push(Binding::new("default", local));
                }
                bindings.append(&mut named);
                if let Some(ns) = namespace_local {
                    let request = ImportRequest::namespace(&spec, ns, location.clone()).with_span(start, end);
                    self.record.imports.push(request);
                }
                if !bindings.is_empty() || namespace_local.is_none() {
                    let request = ImportRequest::named(&spec, bindings, location).with_span(start, end);
                    self.record.imports.push(request);
                }
                return next;
            }
            if self.is_punct(i, ',') {
                i += 1;
            } else if self.is_punct(i, '{') {
                let (bindings, next) = self.brace_list(i);
                named = bindings;
                i = next;
            } else if self.is_punct(i, '*') && self.is_word(i + 1, "as") {
                namespace_local = self.ident(i + 2);
                i += 3;
            } else if let Some(local) = self.ident(i) {
                // `import x = require(…)` is not an ES import
                if self.is_punct(i + 1, '=') {
                    return i + 1;
                }
                default_local = Some(local);
                i += 1;
            } else {
                return i.max(at + 1);
            }
        }
    }

    fn export(&mut self, at: usize) -> usize {
        let location = self.location(at);
        let i = at + 1;
        match self.kind(i) {
            Some(TokKind::Ident(word)) => match word.as_str() {
                "default" => {
                    self.record.exports.has_default = true;
                    i + 1
                }
                "async" if self.is_word(i + 1, "function") => self.declared_function(i + 2),
                "function" => self.declared_function(i + 1),
                "class" | "enum" | "namespace" => self.declared_name(i + 1),
                "abstract" if self.is_word(i + 1, "class") => self.declared_name(i + 2),
                "const" if self.is_word(i + 1, "enum") => self.declared_name(i + 2),
                "const" | "let" | "var" => self.declared_variables(i + 1),
                // `export type`, `export interface`, `export declare`: no runtime surface
                _ => i + 1,
            },
            Some(TokKind::Punct('{')) => {
                let (bindings, mut next) = self.brace_list(i);
                for binding in &bindings {
                    self.record.exports.add_name(&binding.local);
                }
                if let Some((spec, (start, end), after)) = self.from_clause(next) {
                    let mut request = ImportRequest::named(&spec, bindings, location)
                        .reexport()
                        .with_span(start, end);
                    if request.kind == EdgeKind::Default {
                        request.kind = EdgeKind::Named;
                    }
                    self.record.imports.push(request);
                    next = after;
                }
                next
            }
            Some(TokKind::Punct('*')) => {
                let (namespace, at_from) = if self.is_word(i + 1, "as") {
                    (self.export_name(i + 2).map(str::to_string), i + 3)
                } else {
                    (None, i + 1)
                };
                let Some((spec, (start, end), after)) = self.from_clause(at_from) else {
                    return at_from;
                };
                let mut request = ImportRequest::namespace(&spec, "", location)
                    .reexport()
                    .with_span(start, end);
                request.namespace = namespace.clone();
                match namespace {
                    Some(ns) => self.record.exports.add_name(&ns),
                    None => self.record.exports.star_reexports.push(spec),
                }
                self.record.imports.push(request);
                after
            }
            _ => i,
        }
    }

    fn declared_function(&mut self, i: usize) -> usize {
        let i = if self.is_punct(i, '*') { i + 1 } else { i };
        self.declared_name(i)
    }

    fn declared_name(&mut self, i: usize) -> usize {
        if let Some(name) = self.ident(i) {
            let name = name.to_string();
            self.record.exports.add_name(&name);
        }
        i + 1
    }

    /// `const a = 1, { b, c: d } = obj, [e] = arr`
    fn declared_variables(&mut self, start: usize) -> usize {
        let tokens: &'t [Token] = self.tokens;
        let depth = tokens.get(start).map_or(0, |t| t.depth);
        let mut i = start;
        let mut expect_binding = true;
        while i < tokens.len() {
            let token = &tokens[i];
            if token.depth < depth {
                break;
            }
            if token.depth == depth {
                match &token.kind {
                    TokKind::Punct(';') => return i + 1,
                    TokKind::Punct(',') => {
                        expect_binding = true;
                        i += 1;
                        continue;
                    }
                    TokKind::Ident(word)
                        if matches!(
                            word.as_str(),
                            "export" | "import" | "const" | "let" | "var" | "function" | "class"
                        ) && i > start =>
                    {
                        return i;
                    }
                    _ => {}
                }
            }
            if expect_binding && token.depth == depth {
                expect_binding = false;
                match &token.kind {
                    TokKind::Ident(name) => {
                        let name = name.clone();
                        self.record.exports.add_name(&name);
                    }
                    TokKind::Punct('{') | TokKind::Punct('[') => {
                        i = self.pattern_names(i);
                        continue;
                    }
                    _ => {}
                }
            }
            i += 1;
        }
        i
    }

    /// Names bound by a destructuring pattern starting at `open`
    fn pattern_names(&mut self, open: usize) -> usize {
        let tokens: &'t [Token] = self.tokens;
        let depth = tokens[open].depth;
        let mut i = open + 1;
        let mut in_default = false;
        while i < tokens.len() {
            let token = &tokens[i];
            if token.depth == depth && matches!(token.kind, TokKind::Punct('}') | TokKind::Punct(']')) {
                return i + 1;
            }
            match &token.kind {
                TokKind::Punct('=') => in_default = true,
                TokKind::Punct(',') => in_default = false,
                TokKind::Ident(name) if !in_default => {
                    let next = self.kind(i + 1);
                    let binds = matches!(
                        next,
                        Some(TokKind::Punct(',')) | Some(TokKind::Punct('}')) | Some(TokKind::Punct(']'))
                            | Some(TokKind::Punct('='))
                    );
                    if binds {
                        let name = name.clone();
                        self.record.exports.add_name(&name);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        i
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::surface::{EdgeKind, EdgeOrigin};

    fn names(record: &SurfaceRecord) -> Vec<&str> {
        record.exports.names.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_declarations() {
        let record = scan_native(
            "/lib.js",
            r#"
export function f() {}
export async function g() {}
export function* gen() {}
export class C {}
export const a = 1, b = compute(1, 2);
export let { c, d: e, ...rest } = obj;
export var [p, , q = 3] = arr;
"#,
        );
        assert_eq!(names(&record), vec!["C", "a", "b", "c", "e", "f", "g", "gen", "p", "q", "rest"]);
        assert!(!record.exports.has_default);
    }

    #[test]
    fn test_default_and_lists() {
        let record = scan_native(
            "/lib.js",
            "const x = 1, y = 2;\nexport { x, y as why };\nexport default { x };",
        );
        assert_eq!(names(&record), vec!["why", "x"]);
        assert!(record.exports.has_default);

        let record = scan_native("/lib.js", "const v = 1; export { v as default };");
        assert!(record.exports.has_default);
        assert!(record.exports.names.is_empty());
    }

    #[test]
    fn test_reexports() {
        let record = scan_native(
            "/index.js",
            r#"export { f, f as g } from "./impl.js";
export * from './all.js';
export * as ns from "./ns.js";"#,
        );
        assert_eq!(names(&record), vec!["f", "g", "ns"]);
        assert_eq!(record.exports.star_reexports, vec!["./all.js"]);
        assert_eq!(record.imports.len(), 3);
        assert!(record.imports.iter().all(|r| r.origin == EdgeOrigin::ReExport));
        assert_eq!(record.imports[0].requested(), vec!["f", "f"]);
        assert!(record.imports[1].is_star_reexport());
    }

    #[test]
    fn test_imports_with_spans() {
        let text = r#"import "./side.js";
import def, { a, b as c } from "./mod.ql";
import * as ns from './ns.ts';
import type { T } from "./types.ts";
const lazy = import("./lazy.js");
"#;
        let record = scan_native("/main.js", text);
        let kinds: Vec<_> = record.imports.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![EdgeKind::SideEffect, EdgeKind::Named, EdgeKind::Namespace]);

        let named = &record.imports[1];
        assert_eq!(named.requested(), vec!["default", "a", "b"]);
        assert_eq!(named.location.line, 2);
        let (start, end) = named.span.unwrap();
        assert_eq!(&text[start..end], "\"./mod.ql\"");

        let (start, end) = record.imports[2].span.unwrap();
        assert_eq!(&text[start..end], "'./ns.ts'");
    }

    #[test]
    fn test_default_plus_namespace() {
        let record = scan_native("/m.js", "import d, * as all from './x.js';");
        assert_eq!(record.imports.len(), 2);
        assert_eq!(record.imports[0].kind, EdgeKind::Namespace);
        assert_eq!(record.imports[1].kind, EdgeKind::Default);
    }

    #[test]
    fn test_skips_strings_comments_templates_and_nested_code() {
        let record = scan_native(
            "/tricky.js",
            r#"
// export const commented = 1;
/* export function hidden() {} */
const s = "export const inString = 1";
const t = `export ${ `nested ${ "}" }` } const inTemplate = 1`;
const r = /export const inRegex = "/g;
function inner() { export const notTopLevel = 1; }
obj.export = 2;
export const visible = 1;
"#,
        );
        assert_eq!(names(&record), vec!["visible"]);
    }

    #[test]
    fn test_typescript_type_exports_are_ignored() {
        let record = scan_native(
            "/types.ts",
            "export type A = string;\nexport interface B { x: number }\nexport enum Color { Red }\nexport const enum Dir { Up }",
        );
        assert_eq!(names(&record), vec!["Color", "Dir"]);
    }
}
