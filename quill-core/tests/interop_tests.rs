//! Namespace normalization and re-export code across module kinds

mod common;

use common::{assert_success, emitted, Project};
use quill_core::interop::{wrap_namespace, NAMESPACE_HELPER};
use quill_core::DiagnosticKind;
use serde_json::json;

#[test]
fn test_namespace_shape_does_not_depend_on_default_export() {
    // `export default { a }` plus `export { b }` against plain `export { a, b }`
    let with_default = json!({ "default": { "a": 1 }, "b": 2 });
    let named_only = json!({ "a": 1, "b": 2 });
    assert_eq!(
        wrap_namespace(with_default.as_object().unwrap()),
        wrap_namespace(named_only.as_object().unwrap())
    );
}

#[test]
fn test_namespace_imports_use_one_wrapper_for_every_kind() {
    let project = Project::new(&[
        ("main.ql", concat!(
            r#"(import * as obj from "./obj.js") "#,
            r#"(import * as named from "./named.js") "#,
            r#"(import * as guest from "./guest.ql") "#,
            "(obj.a named.a guest.a)"
        )),
        ("obj.js", "const a = 1;\nexport default { a };\nexport const b = 2;\n"),
        ("named.js", "export const a = 1;\nexport const b = 2;\n"),
        ("guest.ql", "(export (def a 1)) (export (def b 2))"),
    ]);
    let run = project.compile("r1", &["./main.ql"]);
    assert_success(&run);

    let code = &emitted(&run, "main.ql").code;
    assert!(code.contains(NAMESPACE_HELPER));
    assert_eq!(code.matches("const __quill_ns = ").count(), 1);
    assert!(code.contains("const obj = __quill_ns(__q_m0);"));
    assert!(code.contains("const named = __quill_ns(__q_m1);"));
    assert!(code.contains("const guest = __quill_ns(__q_m2);"));
}

#[test]
fn test_default_import_without_default_export_gets_namespace() {
    let project = Project::new(&[
        ("main.ql", r#"(import [default as lib] from "./lib.js") (lib.x)"#),
        ("lib.js", "export const x = () => 1;\n"),
    ]);
    let run = project.compile("r1", &["./main.ql"]);
    assert_success(&run);

    let code = &emitted(&run, "main.ql").code;
    assert!(code.starts_with("import * as __q_m0 from \"./lib.js\";"));
    assert!(code.contains("const lib = __quill_ns(__q_m0);"));
}

#[test]
fn test_aliased_reexport_exposes_both_names() {
    let project = Project::new(&[
        ("api.ql", r#"(export [f f as g] from "./impl.ql")"#),
        ("impl.ql", "(export (defn f [] 1))"),
        ("main.js", "import { f, g } from './api.ql';\nconsole.log(f === g);\n"),
    ]);
    let run = project.compile("r1", &["./main.js"]);
    assert_success(&run);

    let api = &emitted(&run, "api.ql").code;
    assert!(api.contains("export { f, f as g } from \"./impl.js\";"));
    assert!(run
        .graph
        .node(run.graph.lookup(&common::local("api.ql")).unwrap())
        .surface
        .names
        .contains("g"));
}

#[test]
fn test_star_reexport_names_are_visible_to_importers() {
    let project = Project::new(&[
        ("main.ql", r#"(import [deep] from "./index.ql") (deep)"#),
        ("index.ql", r#"(export * from "./deep.js")"#),
        ("deep.js", "export function deep() { return 1; }\n"),
    ]);
    let run = project.compile("r1", &["./main.ql"]);
    assert_success(&run);
    assert!(emitted(&run, "index.ql")
        .code
        .starts_with("export * from \"./deep.js\";"));
}

#[test]
fn test_guest_names_are_mangled_consistently() {
    let project = Project::new(&[
        ("main.ql", r#"(import [empty? add-one] from "./util.ql") (empty? (add-one 1))"#),
        ("util.ql", "(export (defn empty? [x] (= x 0))) (export (defn add-one [x] (+ x 1)))"),
    ]);
    let run = project.compile("r1", &["./main.ql"]);
    assert_success(&run);

    assert!(emitted(&run, "util.ql").code.contains("export function empty_p(x)"));
    let main = &emitted(&run, "main.ql").code;
    assert!(main.starts_with("import { empty_p, add_one } from \"./util.js\";"));
    assert!(main.contains("empty_p(add_one(1));"));
}

#[test]
fn test_native_module_imports_mangled_guest_names() {
    let project = Project::new(&[
        ("main.js", "import { add_one, empty_p } from './util.ql';\nconsole.log(empty_p(add_one(1)));\n"),
        ("util.ql", "(export (defn add-one [x] (+ x 1))) (export (defn empty? [x] (= x 0)))"),
    ]);
    let run = project.compile("r1", &["./main.js"]);
    assert_success(&run);

    assert!(emitted(&run, "util.ql").code.contains("export function add_one(x)"));
    assert!(emitted(&run, "main.js")
        .code
        .starts_with("import { add_one, empty_p } from \"./util.js\";"));
}

#[test]
fn test_native_module_is_told_the_mangled_names() {
    let project = Project::new(&[
        ("main.js", "import { addOne } from './util.ql';\n"),
        ("util.ql", "(export (defn add-one [x] (+ x 1)))"),
    ]);
    let run = project.compile("r1", &["./main.js"]);

    let reports = run.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, DiagnosticKind::ExportSurface);
    assert_eq!(reports[0].suggestion.as_deref(), Some("available exports: add_one"));
}
