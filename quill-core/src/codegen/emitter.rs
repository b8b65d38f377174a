//! Guest forms → JavaScript text

use super::mangle::{mangle, mangle_export};
use crate::error::{CompileError, CompileResult};
use crate::reader::{Sexp, SexpKind};
use std::collections::{BTreeMap, HashSet};

/// Symbols passed through untouched
const PASSTHROUGH: [&str; 3] = ["this", "undefined", "arguments"];

const ARITHMETIC: [&str; 5] = ["+", "-", "*", "/", "%"];
const COMPARISON: [&str; 6] = ["=", "!=", "<", ">", "<=", ">="];

/// One emitted top-level statement
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub code: String,
    /// Name the statement defines, for the source map
    pub name: Option<String>,
}

pub struct Emitter<'a> {
    /// Imported local → expression read at each use
    deferred: &'a BTreeMap<String, String>,
    scopes: Vec<HashSet<String>>,
    indent: usize,
}

fn error(form: &Sexp, message: impl Into<String>) -> CompileError {
    CompileError::codegen(message, Some(form.location()))
}

fn quote_str(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

impl<'a> Emitter<'a> {
    pub fn new(deferred: &'a BTreeMap<String, String>) -> Self {
        Self {
            deferred,
            scopes: vec![HashSet::new()],
            indent: 0,
        }
    }

    /// Translate one top-level form; `None` for forms with no runtime code
    pub fn top_level(&mut self, form: &Sexp) -> CompileResult<Option<Statement>> {
        match form.head() {
            Some("import") => Ok(None),
            Some("export") => self.export(form),
            _ => self.statement(form).map(Some),
        }
    }

    fn export(&mut self, form: &Sexp) -> CompileResult<Option<Statement>> {
        let items = form.as_list().unwrap_or_default();
        match items.get(1).map(|s| &s.kind) {
            // `export … from` is planned by interop
            Some(SexpKind::Symbol(s)) if s == "*" => Ok(None),
            Some(SexpKind::Vector(_)) if items.len() == 4 => Ok(None),
            Some(SexpKind::Symbol(s)) if s == "default" => {
                let value = items
                    .get(2)
                    .ok_or_else(|| error(form, "export default needs a value"))?;
                Ok(Some(Statement {
                    code: format!("export default {};", self.expr(value)?),
                    name: Some("default".to_string()),
                }))
            }
            Some(SexpKind::Vector(bindings)) => {
                let mut specifiers = Vec::new();
                let mut i = 0;
                while i < bindings.len() {
                    let local = bindings[i]
                        .as_symbol()
                        .ok_or_else(|| error(&bindings[i], "export entries must be symbols"))?;
                    let (exported, step) = match bindings.get(i + 1) {
                        Some(a) if a.is_symbol("as") => {
                            let alias = bindings
                                .get(i + 2)
                                .and_then(Sexp::as_symbol)
                                .ok_or_else(|| error(a, "'as' must be followed by a symbol"))?;
                            (alias, 3)
                        }
                        _ => (local, 1),
                    };
                    if self.deferred.contains_key(local) && !self.is_local(local) {
                        return Err(error(
                            form,
                            format!(
                                "'{}' is imported from the same cycle group; re-export it with (export [..] from \"spec\")",
                                local
                            ),
                        ));
                    }
                    let (local, exported) = (mangle(local), mangle_export(exported));
                    specifiers.push(if local == exported {
                        local
                    } else {
                        format!("{} as {}", local, exported)
                    });
                    i += step;
                }
                Ok(Some(Statement {
                    code: format!("export {{ {} }};", specifiers.join(", ")),
                    name: None,
                }))
            }
            Some(SexpKind::List(_)) => {
                let inner = self.statement(&items[1])?;
                Ok(Some(Statement {
                    code: format!("export {}", inner.code),
                    name: inner.name,
                }))
            }
            _ => Err(error(form, "malformed export")),
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn pad(&self) -> String {
        "  ".repeat(self.indent)
    }

    /// A form in statement position
    pub fn statement(&mut self, form: &Sexp) -> CompileResult<Statement> {
        let items = form.as_list().unwrap_or_default();
        match form.head() {
            Some(kw @ ("def" | "let" | "var")) => {
                let name = items
                    .get(1)
                    .and_then(Sexp::as_symbol)
                    .ok_or_else(|| error(form, format!("{} needs a name", kw)))?;
                if items.len() > 3 {
                    return Err(error(form, format!("{} takes a name and one value", kw)));
                }
                self.declare(name);
                let keyword = if kw == "var" { "let" } else { "const" };
                let value = match items.get(2) {
                    Some(value) => self.expr(value)?,
                    None => "undefined".to_string(),
                };
                Ok(Statement {
                    code: format!("{} {} = {};", keyword, mangle(name), value),
                    name: Some(name.to_string()),
                })
            }
            Some("fn") if items.get(1).and_then(Sexp::as_symbol).is_some() => {
                let name = items[1].as_symbol().unwrap_or_default();
                self.declare(name);
                let code = self.function(form, &items[1..])?;
                Ok(Statement {
                    code,
                    name: Some(name.to_string()),
                })
            }
            Some("return") => {
                let code = match items.get(1) {
                    Some(value) => format!("return {};", self.expr(value)?),
                    None => "return;".to_string(),
                };
                Ok(Statement { code, name: None })
            }
            Some("import" | "export") => Err(error(form, "import and export are only allowed at the top level")),
            _ => Ok(Statement {
                code: format!("{};", self.expr(form)?),
                name: None,
            }),
        }
    }

    /// `name? [params] body…` into a function declaration or arrow
    fn function(&mut self, form: &Sexp, rest: &[Sexp]) -> CompileResult<String> {
        let (name, rest) = match rest.first().and_then(Sexp::as_symbol) {
            Some(name) => (Some(name), &rest[1..]),
            None => (None, rest),
        };
        let params = rest
            .first()
            .and_then(Sexp::as_vector)
            .ok_or_else(|| error(form, "fn needs a parameter vector"))?;

        let mut scope = HashSet::new();
        let mut rendered = Vec::new();
        let mut rest_param = false;
        for param in params {
            let p = param
                .as_symbol()
                .ok_or_else(|| error(param, "parameters must be symbols"))?;
            if p == "&" {
                rest_param = true;
                continue;
            }
            scope.insert(p.to_string());
            rendered.push(if rest_param {
                format!("...{}", mangle(p))
            } else {
                mangle(p)
            });
        }

        self.scopes.push(scope);
        let body = self.body(&rest[1..]);
        self.scopes.pop();
        let body = body?;

        let params = rendered.join(", ");
        Ok(match name {
            Some(name) => format!("function {}({}) {}", mangle(name), params, body),
            None => format!("({}) => {}", params, body),
        })
    }

    /// `{ … return last; }`
    fn body(&mut self, forms: &[Sexp]) -> CompileResult<String> {
        self.indent += 1;
        let lines = self.body_lines(forms);
        self.indent -= 1;
        let lines = lines?;
        if lines.is_empty() {
            return Ok("{}".to_string());
        }
        Ok(format!("{{\n{}\n{}}}", lines.join("\n"), self.pad()))
    }

    fn body_lines(&mut self, forms: &[Sexp]) -> CompileResult<Vec<String>> {
        let pad = self.pad();
        let mut lines = Vec::with_capacity(forms.len());
        for (i, form) in forms.iter().enumerate() {
            let last = i + 1 == forms.len();
            if last && !is_statement_form(form) {
                lines.push(format!("{}return {};", pad, self.expr(form)?));
            } else {
                lines.push(format!("{}{}", pad, self.statement(form)?.code));
            }
        }
        Ok(lines)
    }

    /// A form in expression position
    pub fn expr(&mut self, form: &Sexp) -> CompileResult<String> {
        match &form.kind {
            SexpKind::Number(text) => Ok(text.clone()),
            SexpKind::Str(text) => Ok(quote_str(text)),
            SexpKind::Keyword(name) => Ok(quote_str(name)),
            SexpKind::Bool(b) => Ok(b.to_string()),
            SexpKind::Nil => Ok("null".to_string()),
            SexpKind::Symbol(name) => Ok(self.symbol(name)),
            SexpKind::Vector(items) => {
                let items = items
                    .iter()
                    .map(|item| self.expr(item))
                    .collect::<CompileResult<Vec<_>>>()?;
                Ok(format!("[{}]", items.join(", ")))
            }
            SexpKind::Map(items) => self.map(form, items),
            SexpKind::List(items) => self.list(form, items),
        }
    }

    fn symbol(&self, name: &str) -> String {
        if PASSTHROUGH.contains(&name) {
            return name.to_string();
        }
        let mut parts = name.split('.');
        let first = parts.next().unwrap_or_default();
        let head = match self.deferred.get(first) {
            Some(access) if !self.is_local(first) => access.clone(),
            _ if PASSTHROUGH.contains(&first) => first.to_string(),
            _ => mangle(first),
        };
        parts.fold(head, |acc, part| format!("{}.{}", acc, mangle(part)))
    }

    fn map(&mut self, form: &Sexp, items: &[Sexp]) -> CompileResult<String> {
        if items.len() % 2 != 0 {
            return Err(error(form, "map literal needs an even number of forms"));
        }
        let mut entries = Vec::new();
        for pair in items.chunks(2) {
            let key = match &pair[0].kind {
                SexpKind::Keyword(k) | SexpKind::Str(k) => quote_str(k),
                SexpKind::Number(n) => n.clone(),
                _ => format!("[{}]", self.expr(&pair[0])?),
            };
            entries.push(format!("{}: {}", key, self.expr(&pair[1])?));
        }
        if entries.is_empty() {
            return Ok("{}".to_string());
        }
        Ok(format!("{{ {} }}", entries.join(", ")))
    }

    fn args(&mut self, items: &[Sexp]) -> CompileResult<Vec<String>> {
        items.iter().map(|item| self.expr(item)).collect()
    }

    fn list(&mut self, form: &Sexp, items: &[Sexp]) -> CompileResult<String> {
        let Some(first) = items.first() else {
            return Ok("null".to_string());
        };
        let rest = &items[1..];
        let head = first.as_symbol().unwrap_or_default();
        match head {
            "fn" => self.function(form, rest).map(|f| format!("({})", f)),
            "if" => {
                if rest.len() < 2 || rest.len() > 3 {
                    return Err(error(form, "if takes a test, a branch and an optional else branch"));
                }
                let otherwise = match rest.get(2) {
                    Some(e) => self.expr(e)?,
                    None => "null".to_string(),
                };
                Ok(format!("({} ? {} : {})", self.expr(&rest[0])?, self.expr(&rest[1])?, otherwise))
            }
            "do" => match rest {
                [] => Ok("null".to_string()),
                [only] if !is_statement_form(only) => self.expr(only),
                _ => {
                    self.scopes.push(HashSet::new());
                    let body = self.body(rest);
                    self.scopes.pop();
                    Ok(format!("(() => {})()", body?))
                }
            },
            "set!" => {
                let [place, value] = rest else {
                    return Err(error(form, "set! takes a place and a value"));
                };
                if place.as_symbol().is_none() && place.head() != Some("get") {
                    return Err(error(place, "set! target must be a symbol or (get obj key)"));
                }
                Ok(format!("({} = {})", self.expr(place)?, self.expr(value)?))
            }
            "get" => {
                let [object, key] = rest else {
                    return Err(error(form, "get takes an object and a key"));
                };
                Ok(format!("{}[{}]", self.expr(object)?, self.expr(key)?))
            }
            "new" => {
                let ctor = rest
                    .first()
                    .ok_or_else(|| error(form, "new needs a constructor"))?;
                let args = self.args(&rest[1..])?;
                Ok(format!("(new {}({}))", self.expr(ctor)?, args.join(", ")))
            }
            "quote" => {
                let [datum] = rest else {
                    return Err(error(form, "quote takes one form"));
                };
                Ok(quote_datum(datum))
            }
            "not" => {
                let [value] = rest else {
                    return Err(error(form, "not takes one argument"));
                };
                Ok(format!("(!{})", self.expr(value)?))
            }
            "and" | "or" => {
                if rest.is_empty() {
                    return Ok((head == "and").to_string());
                }
                let op = if head == "and" { " && " } else { " || " };
                Ok(format!("({})", self.args(rest)?.join(op)))
            }
            op if ARITHMETIC.contains(&op) => self.arithmetic(form, op, rest),
            op if COMPARISON.contains(&op) => {
                if rest.len() < 2 {
                    return Err(error(form, format!("{} needs at least two arguments", op)));
                }
                let js = match op {
                    "=" => "===",
                    "!=" => "!==",
                    other => other,
                };
                let args = self.args(rest)?;
                let pairs: Vec<String> = args
                    .windows(2)
                    .map(|w| format!("{} {} {}", w[0], js, w[1]))
                    .collect();
                Ok(format!("({})", pairs.join(" && ")))
            }
            "def" | "let" | "var" | "return" => Err(error(
                form,
                format!("{} is only allowed in statement position", head),
            )),
            "import" | "export" => Err(error(form, "import and export are only allowed at the top level")),
            method if method.starts_with('.') && method.len() > 1 => {
                let object = rest
                    .first()
                    .ok_or_else(|| error(form, format!("{} needs a receiver", method)))?;
                let args = self.args(&rest[1..])?;
                Ok(format!("{}.{}({})", self.expr(object)?, mangle(&method[1..]), args.join(", ")))
            }
            _ => {
                let callee = self.expr(first)?;
                let callee = if first.as_list().is_some() && !callee.starts_with('(') {
                    format!("({})", callee)
                } else {
                    callee
                };
                Ok(format!("{}({})", callee, self.args(rest)?.join(", ")))
            }
        }
    }

    fn arithmetic(&mut self, form: &Sexp, op: &str, rest: &[Sexp]) -> CompileResult<String> {
        match (op, rest) {
            ("+", []) => Ok("0".to_string()),
            ("*", []) => Ok("1".to_string()),
            (_, []) => Err(error(form, format!("{} needs arguments", op))),
            ("-", [only]) => Ok(format!("(-{})", self.expr(only)?)),
            ("/", [only]) => Ok(format!("(1 / {})", self.expr(only)?)),
            (_, [only]) => self.expr(only),
            _ => Ok(format!("({})", self.args(rest)?.join(&format!(" {} ", op)))),
        }
    }
}

/// Definitions, returns and named functions only make sense as statements
fn is_statement_form(form: &Sexp) -> bool {
    match form.head() {
        Some("def" | "let" | "var" | "return") => true,
        Some("fn") => form
            .as_list()
            .and_then(|items| items.get(1))
            .and_then(Sexp::as_symbol)
            .is_some(),
        _ => false,
    }
}

/// Quoted data: symbols become strings, lists become arrays
fn quote_datum(datum: &Sexp) -> String {
    match &datum.kind {
        SexpKind::Symbol(s) | SexpKind::Keyword(s) | SexpKind::Str(s) => quote_str(s),
        SexpKind::Number(n) => n.clone(),
        SexpKind::Bool(b) => b.to_string(),
        SexpKind::Nil => "null".to_string(),
        SexpKind::List(items) | SexpKind::Vector(items) => format!(
            "[{}]",
            items.iter().map(quote_datum).collect::<Vec<_>>().join(", ")
        ),
        SexpKind::Map(items) => {
            let entries: Vec<String> = items
                .chunks(2)
                .map(|pair| {
                    let value = pair.get(1).map(quote_datum).unwrap_or_else(|| "null".to_string());
                    format!("{}: {}", quote_datum(&pair[0]), value)
                })
                .collect();
            format!("{{ {} }}", entries.join(", "))
        }
    }
}
