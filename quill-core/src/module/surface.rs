//! Import/export surfaces

use crate::error::{CompileError, CompileResult};
use crate::fingerprint::Fingerprinter;
use crate::location::SourceLocation;
use crate::reader::{Sexp, SexpKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Requested-binding marker of a side-effect-only import
pub const SIDE_EFFECT_MARKER: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    Named,
    Namespace,
    Default,
    SideEffect,
}

/// Whether an edge comes from an import or from an `export … from` form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeOrigin {
    Import,
    ReExport,
}

/// `imported as local` (for re-exports: `imported as exported`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binding {
    pub imported: String,
    pub local: String,
}

impl Binding {
    pub fn new(imported: &str, local: &str) -> Self {
        Self {
            imported: imported.to_string(),
            local: local.to_string(),
        }
    }
}

/// One import (or re-export) site before its target is resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub specifier: String,
    pub kind: EdgeKind,
    pub origin: EdgeOrigin,
    /// Named and default bindings; a single wildcard for side-effect imports
    pub bindings: Vec<Binding>,
    /// Local name of a namespace import, or `ns` in `export * as ns from`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub location: SourceLocation,
    /// Byte range of the quoted specifier in native source text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<(usize, usize)>,
}

impl ImportRequest {
    pub fn side_effect(specifier: &str, location: SourceLocation) -> Self {
        Self {
            specifier: specifier.to_string(),
            kind: EdgeKind::SideEffect,
            origin: EdgeOrigin::Import,
            bindings: vec![Binding::new(SIDE_EFFECT_MARKER, SIDE_EFFECT_MARKER)],
            namespace: None,
            location,
            span: None,
        }
    }

    pub fn namespace(specifier: &str, local: &str, location: SourceLocation) -> Self {
        Self {
            specifier: specifier.to_string(),
            kind: EdgeKind::Namespace,
            origin: EdgeOrigin::Import,
            bindings: Vec::new(),
            namespace: Some(local.to_string()),
            location,
            span: None,
        }
    }

    /// Named import; a lone `default` binding becomes a default import
    pub fn named(specifier: &str, bindings: Vec<Binding>, location: SourceLocation) -> Self {
        let kind = match bindings.as_slice() {
            [only] if only.imported == "default" => EdgeKind::Default,
            [] => EdgeKind::SideEffect,
            _ => EdgeKind::Named,
        };
        if kind == EdgeKind::SideEffect {
            return Self::side_effect(specifier, location);
        }
        Self {
            specifier: specifier.to_string(),
            kind,
            origin: EdgeOrigin::Import,
            bindings,
            namespace: None,
            location,
            span: None,
        }
    }

    pub fn reexport(mut self) -> Self {
        self.origin = EdgeOrigin::ReExport;
        self
    }

    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.span = Some((start, end));
        self
    }

    /// Names requested from the target (`*` for side effects, empty for namespaces)
    pub fn requested(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.imported.as_str()).collect()
    }

    /// Source name → local name
    pub fn alias_map(&self) -> BTreeMap<&str, &str> {
        self.bindings
            .iter()
            .map(|b| (b.imported.as_str(), b.local.as_str()))
            .collect()
    }

    pub fn is_star_reexport(&self) -> bool {
        self.origin == EdgeOrigin::ReExport && self.kind == EdgeKind::Namespace && self.namespace.is_none()
    }
}

/// What a module exposes to importers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSurface {
    /// Named exports, `default` excluded
    pub names: BTreeSet<String>,
    pub has_default: bool,
    /// Specifiers of `export * from` forms
    pub star_reexports: Vec<String>,
}

impl ExportSurface {
    pub fn add_name(&mut self, name: &str) {
        if name == "default" {
            self.has_default = true;
        } else {
            self.names.insert(name.to_string());
        }
    }

    /// Fingerprint of the export signature (names, default flag, star re-exports)
    pub fn signature_fingerprint(&self) -> String {
        let mut fp = Fingerprinter::new("export-signature");
        for name in &self.names {
            fp.field(name);
        }
        fp.field(if self.has_default { "default:1" } else { "default:0" });
        let mut stars = self.star_reexports.clone();
        stars.sort();
        for star in &stars {
            fp.field("*").field(star);
        }
        fp.finish()
    }
}

/// Exports plus raw imports of one module, cached by content fingerprint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceRecord {
    pub exports: ExportSurface,
    pub imports: Vec<ImportRequest>,
}

/// Surface of a guest module from its (desugared) top-level forms
pub fn extract_guest(forms: &[Sexp]) -> CompileResult<SurfaceRecord> {
    let mut record = SurfaceRecord::default();
    for form in forms {
        match form.head() {
            Some("import") => record.imports.push(parse_import(form)?),
            Some("export") => parse_export(form, &mut record)?,
            _ => {}
        }
    }
    Ok(record)
}

fn import_error(form: &Sexp, message: &str) -> CompileError {
    CompileError::parse(
        message,
        form.location(),
        Some("write (import \"spec\"), (import name from \"spec\") or (import [a b as c] from \"spec\")"),
    )
}

fn export_error(form: &Sexp, message: &str) -> CompileError {
    CompileError::parse(
        message,
        form.location(),
        Some("write (export [a b as c]), (export default expr), (export [a] from \"spec\") or (export * from \"spec\")"),
    )
}

/// `from "spec"` at `items[at..]`
fn from_clause<'a>(items: &'a [Sexp], at: usize) -> Option<&'a str> {
    match items.get(at..) {
        Some([from, spec]) if from.is_symbol("from") => spec.as_str(),
        _ => None,
    }
}

/// `[a b as c default as d]`
fn parse_binding_vector(vector: &Sexp) -> Result<Vec<Binding>, String> {
    let items = vector.as_vector().ok_or("expected a binding vector")?;
    let mut bindings = Vec::new();
    let mut i = 0;
    while i < items.len() {
        let name = items[i]
            .as_symbol()
            .ok_or_else(|| format!("expected a name, found {}", items[i]))?;
        if items.get(i + 1).is_some_and(|s| s.is_symbol("as")) {
            let alias = items
                .get(i + 2)
                .and_then(Sexp::as_symbol)
                .ok_or_else(|| format!("expected a name after '{} as'", name))?;
            bindings.push(Binding::new(name, alias));
            i += 3;
        } else {
            bindings.push(Binding::new(name, name));
            i += 1;
        }
    }
    Ok(bindings)
}

fn parse_import(form: &Sexp) -> CompileResult<ImportRequest> {
    let items = form.as_list().unwrap_or_default();
    let location = form.location();
    match items.len() {
        2 => items[1]
            .as_str()
            .map(|spec| ImportRequest::side_effect(spec, location))
            .ok_or_else(|| import_error(form, "import expects a string specifier")),
        4 => {
            let spec = from_clause(items, 2)
                .ok_or_else(|| import_error(form, "import expects 'from \"spec\"'"))?;
            match &items[1].kind {
                SexpKind::Symbol(local) => Ok(ImportRequest::namespace(spec, local, location)),
                SexpKind::Vector(_) => {
                    let bindings = parse_binding_vector(&items[1]).map_err(|m| import_error(form, &m))?;
                    Ok(ImportRequest::named(spec, bindings, location))
                }
                _ => Err(import_error(form, "import expects a name or a binding vector")),
            }
        }
        _ => Err(import_error(form, "malformed import")),
    }
}

fn parse_export(form: &Sexp, record: &mut SurfaceRecord) -> CompileResult<()> {
    let items = form.as_list().unwrap_or_default();
    let location = form.location();
    match items.get(1).map(|s| &s.kind) {
        Some(SexpKind::Symbol(s)) if s == "default" && items.len() == 3 => {
            record.exports.has_default = true;
        }
        Some(SexpKind::Symbol(s)) if s == "*" => {
            let (namespace, at) = match items.get(2) {
                Some(as_sym) if as_sym.is_symbol("as") => {
                    let ns = items
                        .get(3)
                        .and_then(Sexp::as_symbol)
                        .ok_or_else(|| export_error(form, "expected a name after '* as'"))?;
                    (Some(ns.to_string()), 4)
                }
                _ => (None, 2),
            };
            let spec = from_clause(items, at)
                .ok_or_else(|| export_error(form, "export * expects 'from \"spec\"'"))?;
            let mut request = ImportRequest::namespace(spec, "", location).reexport();
            request.namespace = namespace.clone();
            match namespace {
                Some(ns) => record.exports.add_name(&ns),
                None => record.exports.star_reexports.push(spec.to_string()),
            }
            record.imports.push(request);
        }
        Some(SexpKind::Vector(_)) => {
            let bindings = parse_binding_vector(&items[1]).map_err(|m| export_error(form, &m))?;
            for binding in &bindings {
                record.exports.add_name(&binding.local);
            }
            match items.len() {
                2 => {}
                4 => {
                    let spec = from_clause(items, 2)
                        .ok_or_else(|| export_error(form, "expected 'from \"spec\"'"))?;
                    let mut request = ImportRequest::named(spec, bindings, location).reexport();
                    // `(export [default] from …)` is still a named re-export
                    if request.kind == EdgeKind::Default {
                        request.kind = EdgeKind::Named;
                    }
                    record.imports.push(request);
                }
                _ => return Err(export_error(form, "malformed export")),
            }
        }
        Some(SexpKind::List(inner)) if items.len() == 2 => {
            let head = items[1].head().unwrap_or_default();
            let name = inner.get(1).and_then(Sexp::as_symbol);
            match (head, name) {
                ("fn" | "defn" | "def" | "let" | "var", Some(name)) => record.exports.add_name(name),
                _ => return Err(export_error(form, "only named definitions can be exported inline")),
            }
        }
        _ => return Err(export_error(form, "malformed export")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{desugar_forms, parser::read_forms};

    fn surface(text: &str) -> SurfaceRecord {
        let forms = desugar_forms(read_forms("/m.ql", text).unwrap()).unwrap();
        extract_guest(&forms).unwrap()
    }

    #[test]
    fn test_import_forms() {
        let record = surface(
            r#"(import "./effects.js")
               (import ns from "./ns.ql")
               (import [a b as c] from "./named.ql")
               (import [default as d] from "./dflt.js")"#,
        );
        let kinds: Vec<_> = record.imports.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![EdgeKind::SideEffect, EdgeKind::Namespace, EdgeKind::Named, EdgeKind::Default]
        );
        assert_eq!(record.imports[0].requested(), vec![SIDE_EFFECT_MARKER]);
        assert!(record.imports[1].requested().is_empty());
        assert_eq!(record.imports[1].namespace.as_deref(), Some("ns"));
        assert_eq!(record.imports[2].alias_map().get("b"), Some(&"c"));
        assert_eq!(record.imports[3].alias_map().get("default"), Some(&"d"));
        assert_eq!(record.imports[2].location.line, 3);
    }

    #[test]
    fn test_export_forms() {
        let record = surface(
            r#"(defn helper [] 1)
               (export (defn api [] (helper)))
               (def x 1)
               (export [x helper as h])
               (export default x)
               (export [f f as g] from "./lib.js")
               (export * from "./all.ql")"#,
        );
        let names: Vec<_> = record.exports.names.iter().cloned().collect();
        assert_eq!(names, vec!["api", "f", "g", "h", "x"]);
        assert!(record.exports.has_default);
        assert_eq!(record.exports.star_reexports, vec!["./all.ql"]);

        let reexports: Vec<_> = record
            .imports
            .iter()
            .filter(|r| r.origin == EdgeOrigin::ReExport)
            .collect();
        assert_eq!(reexports.len(), 2);
        assert_eq!(reexports[0].requested(), vec!["f", "f"]);
        assert!(reexports[1].is_star_reexport());
    }

    #[test]
    fn test_export_star_as_namespace() {
        let record = surface(r#"(export * as util from "./util.ql")"#);
        assert!(record.exports.names.contains("util"));
        assert!(record.exports.star_reexports.is_empty());
        assert_eq!(record.imports[0].namespace.as_deref(), Some("util"));
    }

    #[test]
    fn test_malformed_import_is_located() {
        let forms = read_forms("/m.ql", "\n(import [a as] from \"./x.ql\")").unwrap();
        let err = extract_guest(&forms).unwrap_err();
        let CompileError::Parse { location, suggestion, .. } = err else {
            panic!("expected parse error");
        };
        assert_eq!(location.line, 2);
        assert!(suggestion.is_some());
    }

    #[test]
    fn test_signature_ignores_order_but_not_names() {
        let mut a = ExportSurface::default();
        a.add_name("x");
        a.add_name("y");
        let mut b = ExportSurface::default();
        b.add_name("y");
        b.add_name("x");
        assert_eq!(a.signature_fingerprint(), b.signature_fingerprint());

        b.add_name("default");
        assert_ne!(a.signature_fingerprint(), b.signature_fingerprint());
    }

    #[test]
    fn test_record_round_trips_through_json() {
        let record = surface(r#"(import [a] from "./a.ql") (export [a])"#);
        let json = serde_json::to_string(&record).unwrap();
        let back: SurfaceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
