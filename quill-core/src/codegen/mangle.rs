//! Guest identifier → JavaScript identifier

use once_cell::sync::Lazy;
use std::collections::HashSet;

static RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
        "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
        "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let",
        "new", "null", "package", "private", "protected", "public", "return", "static", "super",
        "switch", "this", "throw", "true", "try", "typeof", "undefined", "var", "void", "while",
        "with", "yield",
    ]
    .into_iter()
    .collect()
});

/// Whether `name` is a JavaScript reserved word
pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(name)
}

/// Mangle one guest identifier (no dots)
///
/// `foo-bar` → `foo_bar`, `empty?` → `empty_p`, `set!` → `set_x`
pub fn mangle(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '-' => out.push('_'),
            '?' => out.push_str("_p"),
            '!' => out.push_str("_x"),
            '*' => out.push_str("_star"),
            '+' => out.push_str("_plus"),
            '<' => out.push_str("_lt"),
            '>' => out.push_str("_gt"),
            '=' => out.push_str("_eq"),
            '/' => out.push_str("_slash"),
            '%' => out.push_str("_pct"),
            '&' => out.push_str("_amp"),
            c if c.is_alphanumeric() || c == '_' || c == '$' => out.push(c),
            c => out.push_str(&format!("_u{:x}", c as u32)),
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if is_reserved(&out) {
        out.push('_');
    }
    out
}

/// Mangle an export name; `default` stays as is
pub fn mangle_export(name: &str) -> String {
    if name == "default" {
        name.to_string()
    } else {
        mangle(name)
    }
}
