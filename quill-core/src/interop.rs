//! Cross-module export interop
//!
//! Namespace imports are normalized through one routine whatever the
//! target's source kind: start from the target's default export when it is
//! an object or a function, otherwise from an empty record, then copy every
//! named export except `default` onto it.
//!
//! [`wrap_namespace`] states those semantics over JSON values and
//! [`NAMESPACE_HELPER`] is the same routine as emitted JavaScript.

use crate::codegen::mangle::{mangle, mangle_export};
use crate::module::{EdgeKind, EdgeOrigin, ImportRequest};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Eager namespace wrapper, emitted once per artifact that needs it
pub const NAMESPACE_HELPER: &str = "const __quill_ns = (m) => {
  const d = m.default;
  const ns = typeof d === \"function\" ? d
    : d !== null && typeof d === \"object\" && !Array.isArray(d) ? Object.assign({}, d)
    : {};
  for (const k of Object.keys(m)) {
    if (k !== \"default\") ns[k] = m[k];
  }
  return ns;
};";

/// Lazy namespace wrapper for imports into a legal cycle group
///
/// Every property read rebuilds the wrapper, so bindings initialized after
/// the importer ran are still observed.
pub const LIVE_NAMESPACE_HELPER: &str = "const __quill_ns_live = (m) => new Proxy({}, {
  get: (_, k) => __quill_ns(m)[k],
  has: (_, k) => k in __quill_ns(m),
  ownKeys: () => Reflect.ownKeys(__quill_ns(m)),
  getOwnPropertyDescriptor: (_, k) => {
    const ns = __quill_ns(m);
    return k in ns ? { value: ns[k], enumerable: true, configurable: true, writable: false } : undefined;
  },
});";

/// Reference semantics of the namespace wrapper
///
/// `module` maps export names to values, `default` included.
pub fn wrap_namespace(module: &Map<String, Value>) -> Value {
    let mut ns = match module.get("default") {
        Some(Value::Object(default)) => default.clone(),
        _ => Map::new(),
    };
    for (name, value) in module {
        if name != "default" {
            ns.insert(name.clone(), value.clone());
        }
    }
    Value::Object(ns)
}

/// How a namespace wrapper is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NamespacePlan {
    /// Built once, right after the imports
    Eager,
    /// Rebuilt on access; used inside legal cycle groups
    Live,
}

impl NamespacePlan {
    pub fn for_edge(in_cycle_group: bool) -> Self {
        if in_cycle_group {
            NamespacePlan::Live
        } else {
            NamespacePlan::Eager
        }
    }

    /// Expression wrapping the module namespace object `module_var`
    pub fn wrap(&self, module_var: &str) -> String {
        match self {
            NamespacePlan::Eager => format!("__quill_ns({})", module_var),
            NamespacePlan::Live => format!("__quill_ns_live({})", module_var),
        }
    }
}

/// What the importer needs to know about one import target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetShape {
    /// Specifier as written into the artifact
    pub specifier: String,
    pub has_default: bool,
    /// Guest targets export mangled names
    pub is_guest: bool,
    /// Target shares a legal cycle group with the importer
    pub same_group: bool,
}

/// Import, re-export and binding code for one guest module
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteropPlan {
    pub imports: Vec<String>,
    /// Statements that must run after the imports
    pub prelude: Vec<String>,
    pub exports: Vec<String>,
    /// Guest local name → expression evaluated at each use
    pub deferred: BTreeMap<String, String>,
    pub helpers: BTreeSet<NamespacePlan>,
    slots: usize,
}

fn quote(specifier: &str) -> String {
    serde_json::to_string(specifier).unwrap_or_else(|_| format!("\"{}\"", specifier))
}

impl InteropPlan {
    pub fn new() -> Self {
        Self::default()
    }

    fn module_slot(&mut self, specifier: &str) -> String {
        let var = format!("__q_m{}", self.slots);
        self.slots += 1;
        self.imports
            .push(format!("import * as {} from {};", var, quote(specifier)));
        var
    }

    fn imported_name(target: &TargetShape, name: &str) -> String {
        if target.is_guest {
            mangle_export(name)
        } else {
            name.to_string()
        }
    }

    /// Plan one edge of the importer
    pub fn add_edge(&mut self, request: &ImportRequest, target: &TargetShape) {
        match request.origin {
            EdgeOrigin::ReExport => self.add_reexport(request, target),
            EdgeOrigin::Import => self.add_import(request, target),
        }
    }

    fn add_import(&mut self, request: &ImportRequest, target: &TargetShape) {
        let namespace = NamespacePlan::for_edge(target.same_group);
        match request.kind {
            EdgeKind::SideEffect => self
                .imports
                .push(format!("import {};", quote(&target.specifier))),
            EdgeKind::Namespace => {
                let var = self.module_slot(&target.specifier);
                let local = request.namespace.as_deref().unwrap_or_default();
                self.helpers.insert(namespace);
                self.prelude
                    .push(format!("const {} = {};", mangle(local), namespace.wrap(&var)));
            }
            EdgeKind::Named | EdgeKind::Default if target.same_group => {
                let var = self.module_slot(&target.specifier);
                for binding in &request.bindings {
                    let access = if binding.imported == "default" && !target.has_default {
                        self.helpers.insert(NamespacePlan::Live);
                        NamespacePlan::Live.wrap(&var)
                    } else {
                        member(&var, &Self::imported_name(target, &binding.imported))
                    };
                    self.deferred.insert(binding.local.clone(), access);
                }
            }
            EdgeKind::Named | EdgeKind::Default => {
                let mut specifiers = Vec::new();
                for binding in &request.bindings {
                    let local = mangle(&binding.local);
                    if binding.imported == "default" && !target.has_default {
                        // No default export: the namespace wrapper stands in
                        let var = self.module_slot(&target.specifier);
                        self.helpers.insert(NamespacePlan::Eager);
                        self.prelude
                            .push(format!("const {} = {};", local, NamespacePlan::Eager.wrap(&var)));
                        continue;
                    }
                    let imported = Self::imported_name(target, &binding.imported);
                    specifiers.push(if imported == local {
                        local
                    } else {
                        format!("{} as {}", imported, local)
                    });
                }
                if !specifiers.is_empty() {
                    self.imports.push(format!(
                        "import {{ {} }} from {};",
                        specifiers.join(", "),
                        quote(&target.specifier)
                    ));
                }
            }
        }
    }

    fn add_reexport(&mut self, request: &ImportRequest, target: &TargetShape) {
        let from = quote(&target.specifier);
        if request.kind == EdgeKind::Namespace {
            self.exports.push(match &request.namespace {
                Some(ns) => format!("export * as {} from {};", mangle_export(ns), from),
                None => format!("export * from {};", from),
            });
            return;
        }
        let mut specifiers = Vec::new();
        for binding in &request.bindings {
            let exported = mangle_export(&binding.local);
            if binding.imported == "default" && !target.has_default {
                let var = self.module_slot(&target.specifier);
                let local = format!("{}_ns", var);
                self.helpers.insert(NamespacePlan::Eager);
                self.prelude
                    .push(format!("const {} = {};", local, NamespacePlan::Eager.wrap(&var)));
                self.exports.push(format!("export {{ {} as {} }};", local, exported));
                continue;
            }
            let imported = Self::imported_name(target, &binding.imported);
            specifiers.push(if imported == exported {
                exported
            } else {
                format!("{} as {}", imported, exported)
            });
        }
        if !specifiers.is_empty() {
            self.exports
                .push(format!("export {{ {} }} from {};", specifiers.join(", "), from));
        }
    }

    /// Helper definitions followed by imports and prelude
    pub fn header(&self) -> Vec<String> {
        let mut lines = Vec::new();
        lines.extend(self.imports.iter().cloned());
        if !self.helpers.is_empty() {
            lines.push(NAMESPACE_HELPER.to_string());
        }
        if self.helpers.contains(&NamespacePlan::Live) {
            lines.push(LIVE_NAMESPACE_HELPER.to_string());
        }
        lines.extend(self.prelude.iter().cloned());
        lines
    }
}

fn member(object: &str, name: &str) -> String {
    let plain = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if plain {
        format!("{}.{}", object, name)
    } else {
        format!("{}[{}]", object, quote(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::SourceLocation;
    use crate::module::Binding;
    use serde_json::json;

    fn target(specifier: &str, has_default: bool) -> TargetShape {
        TargetShape {
            specifier: specifier.to_string(),
            has_default,
            is_guest: false,
            same_group: false,
        }
    }

    fn loc() -> SourceLocation {
        SourceLocation::new("/app/main.ql", 1, 1)
    }

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_wrapper_named_only() {
        let ns = wrap_namespace(&as_map(json!({ "x": 1, "y": 2 })));
        assert_eq!(ns, json!({ "x": 1, "y": 2 }));
    }

    #[test]
    fn test_wrapper_default_plus_named() {
        let ns = wrap_namespace(&as_map(json!({ "default": { "x": 1 }, "y": 2 })));
        assert_eq!(ns, json!({ "x": 1, "y": 2 }));
    }

    #[test]
    fn test_wrapper_primitive_default_is_dropped() {
        let ns = wrap_namespace(&as_map(json!({ "default": 42, "y": 2 })));
        assert_eq!(ns, json!({ "y": 2 }));
    }

    #[test]
    fn test_namespace_import() {
        let mut plan = InteropPlan::new();
        plan.add_edge(&ImportRequest::namespace("./b.js", "b-mod", loc()), &target("./b.js", false));
        assert_eq!(plan.imports, vec![r#"import * as __q_m0 from "./b.js";"#]);
        assert_eq!(plan.prelude, vec!["const b_mod = __quill_ns(__q_m0);"]);
        let header = plan.header().join("\n");
        assert!(header.contains("const __quill_ns = (m)"));
        assert!(!header.contains("__quill_ns_live = "));
    }

    #[test]
    fn test_named_import_of_guest_target_is_mangled() {
        let mut plan = InteropPlan::new();
        let request = ImportRequest::named(
            "./util.ql",
            vec![Binding::new("empty?", "empty?"), Binding::new("to-str", "str")],
            loc(),
        );
        let shape = TargetShape {
            is_guest: true,
            ..target("./util.js", false)
        };
        plan.add_edge(&request, &shape);
        assert_eq!(
            plan.imports,
            vec![r#"import { empty_p, to_str as str } from "./util.js";"#]
        );
    }

    #[test]
    fn test_default_without_default_export_uses_wrapper() {
        let mut plan = InteropPlan::new();
        let request = ImportRequest::named("./lib.js", vec![Binding::new("default", "lib")], loc());
        plan.add_edge(&request, &target("./lib.js", false));
        assert_eq!(plan.prelude, vec!["const lib = __quill_ns(__q_m0);"]);

        let mut plan = InteropPlan::new();
        plan.add_edge(&request, &target("./lib.js", true));
        assert_eq!(plan.imports, vec![r#"import { default as lib } from "./lib.js";"#]);
    }

    #[test]
    fn test_same_group_named_import_is_deferred() {
        let mut plan = InteropPlan::new();
        let request = ImportRequest::named("./b.js", vec![Binding::new("f", "g")], loc());
        let shape = TargetShape {
            same_group: true,
            ..target("./b.js", false)
        };
        plan.add_edge(&request, &shape);
        assert_eq!(plan.deferred.get("g").map(String::as_str), Some("__q_m0.f"));
        assert!(plan.prelude.is_empty());
    }

    #[test]
    fn test_aliased_reexport_keeps_both_names() {
        let mut plan = InteropPlan::new();
        let request = ImportRequest::named(
            "./lib.js",
            vec![Binding::new("f", "f"), Binding::new("f", "g")],
            loc(),
        )
        .reexport();
        plan.add_edge(&request, &target("./lib.js", false));
        assert_eq!(plan.exports, vec![r#"export { f, f as g } from "./lib.js";"#]);
    }

    #[test]
    fn test_star_reexports_and_side_effects() {
        let mut plan = InteropPlan::new();
        plan.add_edge(
            &ImportRequest::namespace("./all.ql", "", loc()).reexport(),
            &target("./all.js", false),
        );
        let mut as_ns = ImportRequest::namespace("./u.ql", "", loc()).reexport();
        as_ns.namespace = Some("util".to_string());
        plan.add_edge(&as_ns, &target("./u.js", false));
        plan.add_edge(&ImportRequest::side_effect("./fx.js", loc()), &target("./fx.js", false));
        assert_eq!(
            plan.exports,
            vec![r#"export * from "./all.js";"#, r#"export * as util from "./u.js";"#]
        );
        assert_eq!(plan.imports, vec![r#"import "./fx.js";"#]);
    }

    #[test]
    fn test_member_access_quotes_odd_names() {
        assert_eq!(member("m", "plain"), "m.plain");
        assert_eq!(member("m", "with-dash"), r#"m["with-dash"]"#);
    }
}
