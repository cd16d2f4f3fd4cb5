use std::fs;
use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;

use super::*;
use crate::core::Priority;

const PROGRAM: &str = r#"
type Calc.Program {
    fn CreateWindow(args) {
        if len(args) > 0 { return window(get(args, 0)); }
        return window("Calculator", 320, 240);
    }
    fn Update(dt) { print("tick"); }
}
"#;

/// Records watch calls and what the registry looked like at that moment.
#[derive(Default)]
struct RecordingWatch {
    calls: Mutex<Vec<String>>,
}

impl SourceWatch for RecordingWatch {
    fn start_watching(&self, app: &AppId, dir: &Path) {
        self.calls
            .lock()
            .push(format!("start {} {}", app, dir.file_name().unwrap().to_string_lossy()));
    }

    fn stop_watching(&self, app: &AppId) {
        self.calls.lock().push(format!("stop {app}"));
    }
}

fn write_app(root: &Path, name: &str, manifest: &str, program: &str) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("manifest.json"), manifest).unwrap();
    if !program.is_empty() {
        fs::write(dir.join("Program.hd"), program).unwrap();
    }
    dir
}

fn calc_manifest() -> &'static str {
    r#"{ "appId": "CALC", "entryClass": "Calc.Program", "dependencies": ["list"] }"#
}

fn registry(watch: Arc<RecordingWatch>, releasable: bool) -> AppRegistry {
    AppRegistry::new(Arc::new(SourceCompiler::new("1.2.0")), watch, releasable)
}

#[test]
fn test_load_and_double_load() {
    let root = tempfile::tempdir().unwrap();
    let dir = write_app(root.path(), "calc", calc_manifest(), PROGRAM);
    let watch = Arc::new(RecordingWatch::default());
    let mut registry = registry(watch.clone(), true);

    assert!(registry.load(&dir));
    let id = AppId::from("calc");
    assert!(registry.is_loaded(&id));
    assert_eq!(registry.unit_name(&id), Some("CALC"));
    assert_eq!(registry.directory_of(&id), Some(dir.as_path()));

    assert!(registry.load(&dir));
    assert_eq!(registry.unit_name(&id), Some("CALC"));
    assert_eq!(*watch.calls.lock(), vec!["start CALC calc"]);
}

#[test]
fn test_load_rejects_bad_manifest() {
    let root = tempfile::tempdir().unwrap();
    let missing = root.path().join("nothing");
    fs::create_dir_all(&missing).unwrap();
    let broken = write_app(root.path(), "broken", "{ not json", PROGRAM);
    let no_entry = write_app(root.path(), "noentry", r#"{ "appId": "X" }"#, PROGRAM);

    let mut registry = registry(Arc::new(RecordingWatch::default()), true);
    assert!(!registry.load(&missing));
    assert!(!registry.load(&broken));
    assert!(!registry.load(&no_entry));
    assert!(registry.registered_ids().is_empty());
}

#[test]
fn test_load_without_sources_rolls_back() {
    let root = tempfile::tempdir().unwrap();
    let dir = write_app(root.path(), "empty", calc_manifest(), "");
    let watch = Arc::new(RecordingWatch::default());
    let mut registry = registry(watch.clone(), true);

    assert!(matches!(registry.try_load(&dir), Err(LoadError::NoSources(_))));
    assert!(!registry.is_registered(&AppId::from("CALC")));
    assert!(watch.calls.lock().is_empty());
}

#[test]
fn test_compile_failure_stays_watched_and_resolvable() {
    let root = tempfile::tempdir().unwrap();
    let dir = write_app(root.path(), "calc", calc_manifest(), "type Calc.Program { fn CreateWindow( }");
    let watch = Arc::new(RecordingWatch::default());
    let mut registry = registry(watch.clone(), true);

    let err = registry.try_load(&dir).unwrap_err();
    assert_eq!(err.diagnostics()[0].code, code::SYNTAX);

    let id = AppId::from("CALC");
    assert!(registry.is_registered(&id));
    assert!(!registry.is_loaded(&id));
    assert_eq!(registry.directory_of(&id), Some(dir.as_path()));
    assert!(registry.factory(&id).is_none());
    assert_eq!(watch.calls.lock().len(), 1);

    // fixing the source and reloading recovers
    fs::write(dir.join("Program.hd"), PROGRAM).unwrap();
    let mut scheduler = ProcessScheduler::default();
    assert!(registry.reload(&id, &mut scheduler).success);
    assert!(registry.is_loaded(&id));
}

#[test]
fn test_version_gate_blocks_load() {
    let root = tempfile::tempdir().unwrap();
    let manifest = r#"{ "appId": "NEW", "entryClass": "Calc.Program", "minHostVersion": "3.0" }"#;
    let dir = write_app(root.path(), "new", manifest, PROGRAM);
    let mut registry = registry(Arc::new(RecordingWatch::default()), true);

    let err = registry.try_load(&dir).unwrap_err();
    assert_eq!(err.diagnostics().len(), 1);
    assert_eq!(err.diagnostics()[0].code, code::VERSION);
}

#[test]
fn test_entry_point_rules() {
    let root = tempfile::tempdir().unwrap();
    let missing = write_app(
        root.path(),
        "missing",
        r#"{ "appId": "A", "entryClass": "A", "entryMethod": "Open" }"#,
        "type A { fn Start() { return window(\"a\"); } }",
    );
    let arity = write_app(
        root.path(),
        "arity",
        r#"{ "appId": "B", "entryClass": "B" }"#,
        "type B { fn CreateWindow(x, y) { return window(\"b\"); } }",
    );
    let zero = write_app(
        root.path(),
        "zero",
        r#"{ "appId": "C", "entryClass": "C" }"#,
        "type C { fn CreateWindow() { return window(\"c\"); } }",
    );
    let mut registry = registry(Arc::new(RecordingWatch::default()), false);

    assert!(matches!(registry.try_load(&missing), Err(LoadError::MissingEntry { .. })));
    assert!(matches!(
        registry.try_load(&arity),
        Err(LoadError::UnsupportedArity { arity: 2, .. })
    ));
    assert!(registry.load(&zero));

    let window = registry
        .create_window(&AppId::from("C"), &["ignored".into()])
        .unwrap()
        .unwrap();
    assert_eq!(window.title(), "c");
}

#[test]
fn test_create_window_passes_args_and_checks_shape() {
    let root = tempfile::tempdir().unwrap();
    let dir = write_app(root.path(), "calc", calc_manifest(), PROGRAM);
    let odd = write_app(
        root.path(),
        "odd",
        r#"{ "appId": "ODD", "entryClass": "Odd" }"#,
        "type Odd { fn CreateWindow() { return 42; } }",
    );
    let mut registry = registry(Arc::new(RecordingWatch::default()), true);
    assert!(registry.load(&dir));
    assert!(registry.load(&odd));

    let calc = AppId::from("CALC");
    let plain = registry.create_window(&calc, &[]).unwrap().unwrap();
    assert_eq!(plain.title(), "Calculator");
    let titled = registry.create_window(&calc, &["Scientific".into()]).unwrap().unwrap();
    assert_eq!(titled.title(), "Scientific");

    assert!(registry.create_window(&AppId::from("ODD"), &[]).unwrap().is_none());
    assert!(registry.create_window(&AppId::from("NOPE"), &[]).unwrap().is_none());
}

#[test]
fn test_reload_swaps_generation_and_stops_instances() {
    let root = tempfile::tempdir().unwrap();
    let dir = write_app(root.path(), "calc", calc_manifest(), PROGRAM);
    let mut registry = registry(Arc::new(RecordingWatch::default()), true);
    assert!(registry.load(&dir));

    let calc = AppId::from("CALC");
    let mut scheduler = ProcessScheduler::new(Priority::Normal);
    let pid = scheduler.start(calc.clone(), None);
    let window = registry.create_window(&calc, &[]).unwrap().unwrap();
    scheduler.open_window(pid, window);

    fs::write(
        dir.join("Program.hd"),
        PROGRAM.replace("\"Calculator\"", "\"Calculator II\""),
    )
    .unwrap();
    let outcome = registry.reload(&calc, &mut scheduler);
    assert!(outcome.success, "{:?}", outcome.diagnostics);
    assert!(scheduler.process(pid).is_none());

    let name = registry.unit_name(&calc).unwrap();
    assert!(name.starts_with("CALC_") && name.len() == "CALC_".len() + 8, "{name}");
    assert!(calc.owns_unit(name));

    let window = registry.create_window(&calc, &[]).unwrap().unwrap();
    assert_eq!(window.title(), "Calculator II");
}

#[test]
fn test_failed_reload_keeps_previous_generation() {
    let root = tempfile::tempdir().unwrap();
    let dir = write_app(root.path(), "calc", calc_manifest(), PROGRAM);
    let mut registry = registry(Arc::new(RecordingWatch::default()), true);
    assert!(registry.load(&dir));

    let calc = AppId::from("CALC");
    fs::write(dir.join("Program.hd"), "type Calc.Program { fn CreateWindow(args) { return nope(); } }").unwrap();

    let mut scheduler = ProcessScheduler::default();
    let outcome = registry.reload(&calc, &mut scheduler);
    assert!(!outcome.success);
    assert_eq!(outcome.diagnostics[0].code, code::UNKNOWN_FUNCTION);

    assert_eq!(registry.unit_name(&calc), Some("CALC"));
    assert_eq!(registry.directory_of(&calc), Some(dir.as_path()));
    let window = registry.create_window(&calc, &[]).unwrap().unwrap();
    assert_eq!(window.title(), "Calculator");
}

#[test]
fn test_reload_with_syntax_error_reports_location() {
    let root = tempfile::tempdir().unwrap();
    let dir = write_app(root.path(), "calc", calc_manifest(), PROGRAM);
    let mut registry = registry(Arc::new(RecordingWatch::default()), true);
    assert!(registry.load(&dir));

    let calc = AppId::from("CALC");
    fs::write(dir.join("Program.hd"), "type Calc.Program {\n  fn CreateWindow(args) {\n    return window(\"x\")\n  }\n}").unwrap();

    let outcome = registry.reload(&calc, &mut ProcessScheduler::default());
    assert!(!outcome.success);
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].code, code::SYNTAX);
    assert!(outcome.diagnostics[0].to_string().starts_with("Program.hd:4:"));
    assert_eq!(registry.unit_name(&calc), Some("CALC"));
}

#[test]
fn test_successful_reload_returns_warnings() {
    let root = tempfile::tempdir().unwrap();
    let dir = write_app(root.path(), "calc", calc_manifest(), PROGRAM);
    let mut registry = registry(Arc::new(RecordingWatch::default()), true);
    assert!(registry.load(&dir));

    let calc = AppId::from("CALC");
    fs::write(
        dir.join("manifest.json"),
        r#"{ "appId": "CALC", "entryClass": "Calc.Program", "dependencies": ["list", "graphics"] }"#,
    )
    .unwrap();

    let outcome = registry.reload(&calc, &mut ProcessScheduler::default());
    assert!(outcome.success, "{:?}", outcome.diagnostics);
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].code, code::UNKNOWN_LIBRARY);
    assert!(!outcome.diagnostics[0].is_error());
    assert!(outcome.diagnostics[0].message.contains("`graphics`"));
}

#[test]
fn test_open_window_keeps_retired_generation_alive() {
    let root = tempfile::tempdir().unwrap();
    let dir = write_app(root.path(), "calc", calc_manifest(), PROGRAM);
    let mut registry = registry(Arc::new(RecordingWatch::default()), true);
    assert!(registry.load(&dir));

    let calc = AppId::from("CALC");
    // a window held outside the scheduler survives the reload
    let mut old_window = registry.create_window(&calc, &[]).unwrap().unwrap();

    let mut scheduler = ProcessScheduler::default();
    assert!(registry.reload(&calc, &mut scheduler).success);
    assert_eq!(registry.retired_alive(), 1);
    assert!(registry.compiler().is_name_live("CALC"));

    old_window.update(Duration::from_millis(16)).unwrap();
    drop(old_window);
    assert_eq!(registry.retired_alive(), 0);
    assert!(!registry.compiler().is_name_live("CALC"));
}

#[test]
fn test_reload_unknown_app() {
    let mut registry = registry(Arc::new(RecordingWatch::default()), true);
    let outcome = registry.reload(&AppId::from("GHOST"), &mut ProcessScheduler::default());
    assert!(!outcome.success);
    assert!(outcome.diagnostics[0].message.contains("GHOST"));
}

#[test]
fn test_unregister_stops_watching() {
    let root = tempfile::tempdir().unwrap();
    let dir = write_app(root.path(), "calc", calc_manifest(), PROGRAM);
    let watch = Arc::new(RecordingWatch::default());
    let mut registry = registry(watch.clone(), true);
    assert!(registry.load(&dir));

    let calc = AppId::from("CALC");
    assert_eq!(registry.unregister(&calc), Some(dir));
    assert!(!registry.is_registered(&calc));
    assert_eq!(watch.calls.lock().last().map(String::as_str), Some("stop CALC"));
    assert_eq!(registry.unregister(&calc), None);
}

#[test]
fn test_load_all() {
    let root = tempfile::tempdir().unwrap();
    write_app(root.path(), "calc", calc_manifest(), PROGRAM);
    write_app(root.path(), "broken", "{", PROGRAM);
    fs::write(root.path().join("stray.txt"), "").unwrap();

    let mut registry = registry(Arc::new(RecordingWatch::default()), true);
    assert_eq!(registry.load_all(root.path()), 1);
    assert_eq!(registry.registered_ids(), vec![AppId::from("CALC")]);
}
