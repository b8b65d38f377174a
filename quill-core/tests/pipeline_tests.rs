//! End-to-end compilation tests

mod common;

use common::{assert_success, emitted, order, position, Project};
use quill_core::module::{RegistryKind, StaticRegistry};
use quill_core::{DiagnosticKind, ModuleIdentity, ModuleState};
use quill_vfs::VirtualFileSystem;
use std::path::Path;
use std::sync::Arc;

#[test]
fn test_dependencies_compile_before_dependents() {
    let project = Project::new(&[
        ("main.ql", r#"(import [a] from "./a.ql") (import [b] from "./b.ql") (a b)"#),
        ("a.ql", r#"(import [c] from "./c.ql") (export (defn a [x] (c x)))"#),
        ("b.ql", r#"(import [c] from "./c.ql") (export (def b (c 1)))"#),
        ("c.ql", "(export (defn c [x] x))"),
    ]);
    let run = project.compile("r1", &["./main.ql"]);
    assert_success(&run);

    let order = order(&run);
    assert_eq!(order.len(), 4);
    assert!(position(&order, "c.ql") < position(&order, "a.ql"));
    assert!(position(&order, "c.ql") < position(&order, "b.ql"));
    assert!(position(&order, "a.ql") < position(&order, "main.ql"));
    assert!(position(&order, "b.ql") < position(&order, "main.ql"));
    assert!(run.graph.nodes().all(|n| n.state == ModuleState::Compiled));
}

#[test]
fn test_artifacts_mirror_the_source_tree() {
    let project = Project::new(&[
        ("main.ql", r#"(import [shout] from "./lib/text")"#),
        ("lib/text.ql", r#"(import [upper] from "../util/case.js") (export (defn shout [s] (upper s)))"#),
        ("util/case.js", "export const upper = (s) => s.toUpperCase();"),
    ]);
    let run = project.compile("r1", &["./main.ql"]);
    assert_success(&run);

    assert!(project
        .artifact("r1", "main.js")
        .starts_with("import { shout } from \"./lib/text.js\";"));
    assert!(project
        .artifact("r1", "lib/text.js")
        .starts_with("import { upper } from \"../util/case.js\";"));
    assert_eq!(
        project.artifact("r1", "util/case.js"),
        "export const upper = (s) => s.toUpperCase();"
    );
    assert_eq!(run.run_dir, std::path::PathBuf::from("/app/.quill-cache/r1"));
}

#[test]
fn test_native_specifiers_are_rewritten() {
    let project = Project::new(&[
        ("main.js", "import { two } from './two.ql';\nimport './side';\nconsole.log(two);\n"),
        ("two.ql", "(export (def two 2))"),
        ("side.js", "globalThis.touched = true;"),
    ]);
    let run = project.compile("r1", &["./main.js"]);
    assert_success(&run);
    assert_eq!(
        emitted(&run, "main.js").code,
        "import { two } from \"./two.js\";\nimport \"./side.js\";\nconsole.log(two);\n"
    );
}

#[test]
fn test_guest_artifact_carries_source_map() {
    let project = Project::new(&[("main.ql", "(def x 1)\n(export [x])")]);
    let run = project.compile("r1", &["./main.ql"]);
    assert_success(&run);

    let code = &emitted(&run, "main.ql").code;
    let map = quill_core::codegen::sourcemap::decode_inline(code).expect("no inline map");
    assert_eq!(map.sources, vec!["/app/main.ql"]);
    assert_eq!(map.file, "main.js");
    assert_eq!(map.mappings, "AAAAA;AACA");
}

#[test]
fn test_source_maps_can_be_disabled() {
    let mut project = Project::new(&[("main.ql", "(def x 1)")]);
    project.config.emit_source_maps = false;
    let run = project.compile("r1", &["./main.ql"]);
    assert_eq!(emitted(&run, "main.ql").code, "const x = 1;\n");
}

#[test]
fn test_missing_export_is_located_at_import() {
    let project = Project::new(&[
        ("main.ql", "(def a 1)\n(import [nope] from \"./lib.ql\")"),
        ("lib.ql", "(export (def yes 1))"),
    ]);
    let run = project.compile("r1", &["./main.ql"]);
    assert_eq!(run.exit_code(), 1);

    let reports = run.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, DiagnosticKind::ExportSurface);
    assert_eq!((reports[0].file_path.as_str(), reports[0].line), ("/app/main.ql", 2));
    assert!(reports[0].message.contains("nope"));

    // the target itself is fine and still emitted
    emitted(&run, "lib.ql");
    assert!(run.artifact(&common::local("main.ql")).is_none());
}

#[test]
fn test_parse_error_has_position_and_suggestion() {
    let project = Project::new(&[("main.ql", "(def a 1)\n(def b (+ a 1)")]);
    let run = project.compile("r1", &["./main.ql"]);

    let reports = run.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, DiagnosticKind::Parse);
    assert_eq!(reports[0].file_path, "/app/main.ql");
    assert_eq!(reports[0].line, 2);
    assert!(reports[0].suggestion.is_some());
}

#[test]
fn test_unrelated_entries_survive_failures() {
    let project = Project::new(&[
        ("bad.ql", r#"(import [x] from "./missing.ql")"#),
        ("good.ql", "(export (def ok true))"),
    ]);
    let run = project.compile("r1", &["./bad.ql", "./good.ql"]);

    assert_eq!(run.diagnostics.len(), 1);
    assert_eq!(run.diagnostics[0].kind, DiagnosticKind::Resolution);
    assert_eq!(run.diagnostics[0].location.line, 1);
    emitted(&run, "good.ql");
}

#[test]
fn test_codegen_failure_skips_every_ancestor() {
    let project = Project::new(&[
        ("main.ql", r#"(import [b] from "./b.ql") (b)"#),
        ("b.ql", r#"(import [c] from "./c.ql") (export (defn b [] (c)))"#),
        ("c.ql", "(export (defn c [] 1))\n(not 1 2)"),
        ("side.ql", "(def ok 1)"),
    ]);
    let run = project.compile("r1", &["./main.ql", "./side.ql"]);

    let reports = run.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, DiagnosticKind::Codegen);
    assert_eq!((reports[0].file_path.as_str(), reports[0].line), ("/app/c.ql", 2));

    // nothing above the failure may import an artifact that was never written
    for path in ["c.ql", "b.ql", "main.ql"] {
        assert!(run.artifact(&common::local(path)).is_none(), "{} was emitted", path);
        let id = run.graph.lookup(&common::local(path)).unwrap();
        assert_eq!(run.graph.node(id).state, ModuleState::Failed);
    }
    assert!(!project.vfs.exists(Path::new("/app/.quill-cache/r1/main.js")));
    emitted(&run, "side.ql");
}

#[test]
fn test_registry_import_is_pinned() {
    let project = Project::new(&[(
        "main.ql",
        r#"(import [default as pad] from "npm:left-pad") (pad "x" 3)"#,
    )]);
    let compiler = project.compiler().with_registry(Arc::new(StaticRegistry::new().with_package(
        RegistryKind::Npm,
        "left-pad",
        "1.3.0",
        "export default function leftPad(s, n) { return s.padStart(n); }",
    )));
    let run = project.compile_with(&compiler, "r1", &["./main.ql"]);
    assert_success(&run);

    assert!(emitted(&run, "main.ql")
        .code
        .starts_with("import { default as pad } from \"npm:left-pad@1.3.0\";"));
    assert_eq!(run.stats.fetches, 1);

    // remote modules are compiled without an artifact of their own
    let remote = run
        .graph
        .nodes()
        .find(|n| n.identity.is_remote())
        .expect("remote node");
    assert_eq!(remote.state, ModuleState::Compiled);
    assert_eq!(run.artifacts.len(), 1);
}

#[test]
fn test_unknown_package_is_a_resolution_error() {
    let project = Project::new(&[("main.ql", "\n(import [x] from \"npm:surely-not-a-package\")")]);
    let compiler = project
        .compiler()
        .with_registry(Arc::new(StaticRegistry::new()));
    let run = project.compile_with(&compiler, "r1", &["./main.ql"]);

    let reports = run.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, DiagnosticKind::Resolution);
    assert_eq!((reports[0].file_path.as_str(), reports[0].line, reports[0].column), ("/app/main.ql", 2, 1));
    assert!(reports[0].message.contains("surely-not-a-package"));
}

#[test]
fn test_missing_entry_is_reported_against_project() {
    let project = Project::new(&[]);
    let run = project.compile("r1", &["./main.ql"]);
    assert_eq!(run.exit_code(), 1);
    assert_eq!(run.diagnostics[0].kind, DiagnosticKind::Resolution);
    assert!(run.graph.is_empty());
    assert!(run.graph.lookup(&ModuleIdentity::local("/app/main.ql")).is_none());
}
