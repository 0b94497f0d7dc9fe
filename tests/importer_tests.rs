use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use tempfile::TempDir;

use rime::ast::Program;
use rime::evaluator::Evaluator;
use rime::importer::{FileModule, MemoryModule, Module};
use rime::lexer::tokenize;
use rime::parser::Parser;
use rime::value::{NativeFunction, Value};

fn parse(src: &str) -> Program {
    let tokens = tokenize(src).expect("lexing should pass");
    Parser::new(tokens)
        .parse_program()
        .expect("parsing should pass")
}

fn write_module(dir: &Path, name: &str, source: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("module dir creation should succeed");
    }
    fs::write(path, source).expect("module write should succeed");
}

fn evaluator_with_counter(base_dir: &Path) -> (Evaluator, Rc<RefCell<usize>>) {
    let count = Rc::new(RefCell::new(0usize));
    let sink = count.clone();
    let mut evaluator = Evaluator::with_base_dir(base_dir);
    evaluator.register_global(
        "mark_loaded",
        Value::Native(NativeFunction::new("mark_loaded", 0, move |_, _| {
            *sink.borrow_mut() += 1;
            Ok(Value::Nil)
        })),
    );
    (evaluator, count)
}

#[test]
fn import_populates_the_root_environment() {
    let dir = TempDir::new().expect("temp dir should be created");
    write_module(dir.path(), "math.rime", "var answer = 40;\nfun double(n) { return n * 2; }\n");

    let mut evaluator = Evaluator::with_base_dir(dir.path());
    let value = evaluator
        .evaluate(&parse("import(\"math\"); double(answer) + 4;"))
        .expect("evaluation should pass");
    assert_eq!(value, Value::Number(84.0));
}

#[test]
fn importing_the_same_module_twice_evaluates_it_once() {
    let dir = TempDir::new().expect("temp dir should be created");
    write_module(dir.path(), "tracked.rime", "mark_loaded();\n");

    let (mut evaluator, count) = evaluator_with_counter(dir.path());
    evaluator
        .evaluate(&parse("import(\"tracked\"); import(\"tracked\");"))
        .expect("evaluation should pass");
    assert_eq!(*count.borrow(), 1);

    // A direct import of the resolved file is the same module identity.
    let module = FileModule::new(dir.path().join("tracked.rime"));
    evaluator.import(&module).expect("import should pass");
    assert_eq!(*count.borrow(), 1);
}

#[test]
fn cyclic_imports_terminate_and_leave_both_loaded() {
    let dir = TempDir::new().expect("temp dir should be created");
    write_module(dir.path(), "a.rime", "import(\"b\");\nvar a_value = 1;\n");
    write_module(dir.path(), "b.rime", "import(\"a\");\nvar b_value = 2;\n");

    let mut evaluator = Evaluator::with_base_dir(dir.path());
    let value = evaluator
        .evaluate(&parse("import(\"a\"); a_value + b_value;"))
        .expect("evaluation should pass");
    assert_eq!(value, Value::Number(3.0));
}

#[test]
fn relative_imports_resolve_against_the_importing_module() {
    let dir = TempDir::new().expect("temp dir should be created");
    write_module(dir.path(), "lib/outer.rime", "import(\"inner\");\n");
    write_module(dir.path(), "lib/inner.rime", "var from_inner = 9;\n");

    let mut evaluator = Evaluator::with_base_dir(dir.path());
    let value = evaluator
        .evaluate(&parse("import(\"lib/outer\"); from_inner;"))
        .expect("evaluation should pass");
    assert_eq!(value, Value::Number(9.0));
}

#[test]
fn module_search_paths_extend_resolution() {
    let project = TempDir::new().expect("temp dir should be created");
    let library = TempDir::new().expect("temp dir should be created");
    write_module(library.path(), "shared/math.rime", "var answer = 40;\n");

    let mut evaluator = Evaluator::with_base_dir(project.path());
    evaluator.add_module_path(library.path());
    let value = evaluator
        .evaluate(&parse("import(\"shared/math\"); answer;"))
        .expect("evaluation should pass");
    assert_eq!(value, Value::Number(40.0));
}

#[test]
fn missing_module_reports_the_searched_paths() {
    let dir = TempDir::new().expect("temp dir should be created");
    let mut evaluator = Evaluator::with_base_dir(dir.path());
    let err = evaluator
        .evaluate(&parse("import(\"missing/mod\");"))
        .expect_err("missing module should fail");
    let rendered = err.to_string();
    assert!(rendered.contains("module 'missing/mod' was not found"));
    assert!(rendered.contains("missing/mod.rime"));
}

#[test]
fn parse_failure_inside_a_module_names_the_module() {
    let dir = TempDir::new().expect("temp dir should be created");
    write_module(dir.path(), "broken.rime", "var = 1;\n");

    let mut evaluator = Evaluator::with_base_dir(dir.path());
    let err = evaluator
        .evaluate(&parse("import(\"broken\");"))
        .expect_err("broken module should fail");
    let rendered = err.to_string();
    assert!(rendered.contains("broken"));
    assert!(rendered.contains("expected identifier after 'var'"));
}

#[test]
fn evaluation_failure_inside_a_module_names_the_module() {
    let dir = TempDir::new().expect("temp dir should be created");
    write_module(dir.path(), "faulty.rime", "var x = 1 / 0;\n");

    let mut evaluator = Evaluator::with_base_dir(dir.path());
    let err = evaluator
        .evaluate(&parse("import(\"faulty\");"))
        .expect_err("faulty module should fail");
    let rendered = err.to_string();
    assert!(rendered.contains("faulty"));
    assert!(rendered.contains("division by zero"));
}

#[test]
fn a_failed_module_can_be_retried() {
    // Marking happens after parsing, so a module that never parsed is
    // not considered imported.
    let dir = TempDir::new().expect("temp dir should be created");
    write_module(dir.path(), "flaky.rime", "var = 1;\n");

    let mut evaluator = Evaluator::with_base_dir(dir.path());
    evaluator
        .evaluate(&parse("import(\"flaky\");"))
        .expect_err("broken module should fail");

    write_module(dir.path(), "flaky.rime", "var fixed = 1;\n");
    let value = evaluator
        .evaluate(&parse("import(\"flaky\"); fixed;"))
        .expect("repaired module should import");
    assert_eq!(value, Value::Number(1.0));
}

#[test]
fn file_module_identity_is_the_canonical_path() {
    let dir = TempDir::new().expect("temp dir should be created");
    write_module(dir.path(), "m.rime", "var x = 1;\n");

    let direct = FileModule::new(dir.path().join("m.rime"));
    let dotted = FileModule::new(dir.path().join(".").join("m.rime"));
    assert_eq!(direct.identity(), dotted.identity());
    assert!(direct.path().ends_with("m.rime"));
    assert!(direct.source().expect("source should read").contains("var x"));
}

#[test]
fn memory_module_identity_and_source() {
    let module = MemoryModule::new("<repl>", "1 + 2;");
    assert_eq!(module.identity(), "<repl>");
    assert_eq!(module.source().expect("source should read"), "1 + 2;");
    assert!(module.enclosing_dir().is_none());
}
