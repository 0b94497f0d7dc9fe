use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use rime::ast::Program;
use rime::evaluator::{EvalError, Evaluator};
use rime::lexer::tokenize;
use rime::parser::Parser;
use rime::value::{NativeFunction, Value};

fn parse(src: &str) -> Program {
    let tokens = tokenize(src).expect("lexing should pass");
    Parser::new(tokens)
        .parse_program()
        .expect("parsing should pass")
}

fn eval_src(src: &str) -> Result<Value, EvalError> {
    let mut evaluator = Evaluator::new();
    evaluator.evaluate(&parse(src))
}

/// An evaluator plus a shared log written by a registered `record`
/// native, for observing evaluation order.
fn evaluator_with_recorder() -> (Evaluator, Rc<RefCell<Vec<String>>>) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let mut evaluator = Evaluator::new();
    evaluator.register_global(
        "record",
        Value::Native(NativeFunction::new("record", 1, move |_, args| {
            sink.borrow_mut().push(args[0].to_string());
            Ok(Value::Nil)
        })),
    );
    (evaluator, log)
}

#[test]
fn arithmetic_with_precedence() {
    let value = eval_src("var x = 1 + 2 * 3; x;").expect("evaluation should pass");
    assert_eq!(value, Value::Number(7.0));
}

#[test]
fn while_loop_grows_a_string() {
    let value = eval_src("var s = \"\"; while (s < \"aaa\") { s = s + \"a\"; } s;")
        .expect("evaluation should pass");
    assert_eq!(value, Value::string("aaa"));
}

#[test]
fn recursive_fibonacci() {
    let src = "\
        fun fib(n) { \
            if (n < 2) { return n; } \
            return fib(n - 1) + fib(n - 2); \
        } \
        fib(10);";
    let value = eval_src(src).expect("evaluation should pass");
    assert_eq!(value, Value::Number(55.0));
}

#[test]
fn map_literal_and_indexing() {
    let value = eval_src("var m = {\"a\": 1, \"b\": 2}; m[\"b\"] + m[\"a\"];")
        .expect("evaluation should pass");
    assert_eq!(value, Value::Number(3.0));
}

#[test]
fn duplicate_map_literal_key_fails() {
    let err = eval_src("{\"a\": 1, \"a\": 2};").expect_err("duplicate key should fail");
    assert!(err.to_string().contains("duplicate map key"));
}

#[test]
fn map_preserves_insertion_order() {
    let value = eval_src("str({\"b\": 1, \"a\": 2, \"c\": 3});").expect("evaluation should pass");
    assert_eq!(value, Value::string("{\"b\": 1, \"a\": 2, \"c\": 3}"));
}

#[test]
fn list_concatenation_allocates_a_fresh_list() {
    let value = eval_src("var xs = [1, 2, 3]; xs + [4];").expect("evaluation should pass");
    assert_eq!(
        value,
        Value::list(vec![
            Value::Number(1.0),
            Value::Number(2.0),
            Value::Number(3.0),
            Value::Number(4.0),
        ])
    );

    let value = eval_src("var xs = [1, 2, 3]; var ys = xs + [4]; len(xs);")
        .expect("evaluation should pass");
    assert_eq!(value, Value::Number(3.0));
}

#[test]
fn list_index_out_of_range_fails() {
    let err = eval_src("var xs = [1, 2, 3]; xs[5];").expect_err("should fail");
    assert!(err.to_string().contains("index out of range"));
}

#[test]
fn variables_declared_in_a_block_do_not_escape() {
    let err = eval_src("if (true) { var hidden = 5; } hidden;").expect_err("should fail");
    assert!(err.to_string().contains("symbol not declared: hidden"));
}

#[test]
fn assignment_in_a_block_mutates_the_outer_binding() {
    let value = eval_src("var x = 1; if (true) { x = 2; } x;").expect("evaluation should pass");
    assert_eq!(value, Value::Number(2.0));
}

#[test]
fn shadowed_binding_leaves_the_outer_one_alone() {
    let value = eval_src("var x = 1; if (true) { var x = 2; x = 3; } x;")
        .expect("evaluation should pass");
    assert_eq!(value, Value::Number(1.0));
}

#[test]
fn functions_are_first_class_and_close_over_their_scope() {
    let src = "\
        fun make_counter() { \
            var count = 0; \
            fun bump() { count = count + 1; return count; } \
            return bump; \
        } \
        var tick = make_counter(); \
        tick(); \
        tick();";
    let value = eval_src(src).expect("evaluation should pass");
    assert_eq!(value, Value::Number(2.0));
}

#[test]
fn functions_without_return_yield_nil() {
    let value = eval_src("fun f() { 42; } f();").expect("evaluation should pass");
    assert_eq!(value, Value::Nil);
}

#[test]
fn bare_return_yields_nil() {
    let value = eval_src("fun f() { return; } f();").expect("evaluation should pass");
    assert_eq!(value, Value::Nil);
}

#[test]
fn arity_mismatch_fails_without_running_the_body() {
    let (mut evaluator, log) = evaluator_with_recorder();
    let program = parse("fun f(a, b) { record(\"ran\"); } f(1);");
    let err = evaluator.evaluate(&program).expect_err("should fail");
    assert!(err.to_string().contains("2 expected, 1 provided"));
    assert!(log.borrow().is_empty());
}

#[test]
fn callee_falls_back_to_its_string_form() {
    let value = eval_src("fun greet() { return 5; } var name = \"greet\"; name();")
        .expect("evaluation should pass");
    assert_eq!(value, Value::Number(5.0));
}

#[test]
fn calling_a_plain_value_fails() {
    let err = eval_src("5();").expect_err("should fail");
    assert!(err.to_string().contains("number is not callable"));
}

#[test]
fn short_circuit_and_skips_the_right_operand() {
    let value = eval_src("false && boom();").expect("rhs must not be evaluated");
    assert_eq!(value, Value::Bool(false));

    let value = eval_src("0 && boom();").expect("falsy lhs decides");
    assert_eq!(value, Value::Bool(false));
}

#[test]
fn short_circuit_or_skips_the_right_operand() {
    let value = eval_src("true || boom();").expect("rhs must not be evaluated");
    assert_eq!(value, Value::Bool(true));

    let value = eval_src("\"x\" || boom();").expect("truthy lhs decides");
    assert_eq!(value, Value::Bool(true));
}

#[test]
fn logical_operators_return_bools() {
    let value = eval_src("1 && 2;").expect("evaluation should pass");
    assert_eq!(value, Value::Bool(true));
    let value = eval_src("0 || \"\";").expect("evaluation should pass");
    assert_eq!(value, Value::Bool(false));
}

#[test]
fn ternary_selects_by_truthiness() {
    let value = eval_src("var x = 5; x > 3 ? \"big\" : \"small\";").expect("evaluation should pass");
    assert_eq!(value, Value::string("big"));
    let value = eval_src("nil ? 1 : 2;").expect("evaluation should pass");
    assert_eq!(value, Value::Number(2.0));
}

#[test]
fn break_and_continue_affect_the_nearest_loop() {
    let src = "\
        var total = 0; \
        var i = 0; \
        while (i < 3) { \
            i = i + 1; \
            var j = 0; \
            while (j < 10) { \
                j = j + 1; \
                if (j == 2) { break; } \
            } \
            total = total + j; \
        } \
        total;";
    let value = eval_src(src).expect("evaluation should pass");
    assert_eq!(value, Value::Number(6.0));
}

#[test]
fn continue_skips_to_the_condition_retest() {
    let src = "\
        var i = 0; \
        var sum = 0; \
        while (i < 7) { \
            i = i + 1; \
            if (i == 3) { continue; } \
            if (i == 6) { break; } \
            sum = sum + i; \
        } \
        sum;";
    let value = eval_src(src).expect("evaluation should pass");
    assert_eq!(value, Value::Number(12.0));
}

#[test]
fn deferred_calls_run_in_lifo_order_at_function_exit() {
    let (mut evaluator, log) = evaluator_with_recorder();
    let program = parse(
        "fun f() { defer record(\"g\"); defer record(\"h\"); record(\"body\"); } f();",
    );
    evaluator.evaluate(&program).expect("evaluation should pass");
    assert_eq!(*log.borrow(), vec!["body", "h", "g"]);
}

#[test]
fn deferred_arguments_are_evaluated_at_defer_run_time() {
    let (mut evaluator, log) = evaluator_with_recorder();
    let program = parse("fun f() { var x = 1; defer record(x); x = 2; } f();");
    evaluator.evaluate(&program).expect("evaluation should pass");
    assert_eq!(*log.borrow(), vec!["2"]);
}

#[test]
fn nested_blocks_keep_their_own_defer_queues() {
    let (mut evaluator, log) = evaluator_with_recorder();
    let program = parse(
        "fun f() { \
            defer record(\"outer\"); \
            if (true) { defer record(\"inner\"); record(\"in-block\"); } \
            record(\"after-block\"); \
        } \
        f();",
    );
    evaluator.evaluate(&program).expect("evaluation should pass");
    assert_eq!(
        *log.borrow(),
        vec!["in-block", "inner", "after-block", "outer"]
    );
}

#[test]
fn assertions_pass_and_fail_with_the_expression_source() {
    eval_src("assert 1 + 1 == 2;").expect("assert should pass");

    let err = eval_src("assert 1 == 2;").expect_err("assert should fail");
    assert_eq!(err.to_string(), "evaluation error: assertion failed: 1 == 2");
}

#[test]
fn native_functions_cover_the_registered_table() {
    assert_eq!(eval_src("len(\"abc\");").unwrap(), Value::Number(3.0));
    assert_eq!(eval_src("len([1, 2]);").unwrap(), Value::Number(2.0));
    assert_eq!(eval_src("abs(-4);").unwrap(), Value::Number(4.0));
    assert_eq!(eval_src("min(3, 5);").unwrap(), Value::Number(3.0));
    assert_eq!(eval_src("max(3, 5);").unwrap(), Value::Number(5.0));
    assert_eq!(eval_src("str(42);").unwrap(), Value::string("42"));
    assert_eq!(eval_src("type(1) == type(2);").unwrap(), Value::Bool(true));
    assert_eq!(
        eval_src("type(1) == type(\"x\");").unwrap(),
        Value::Bool(false)
    );
    assert_eq!(eval_src("str(type(1));").unwrap(), Value::string("number"));
}

#[test]
fn registered_globals_are_usable_but_not_shadowable() {
    let mut evaluator = Evaluator::new();
    evaluator.register_global("answer", Value::Number(42.0));

    let value = evaluator
        .evaluate(&parse("answer;"))
        .expect("evaluation should pass");
    assert_eq!(value, Value::Number(42.0));

    let err = evaluator
        .evaluate(&parse("var answer = 1;"))
        .expect_err("global shadowing should fail");
    assert!(err.to_string().contains("cannot redeclare global"));

    let err = evaluator
        .evaluate(&parse("answer = 1;"))
        .expect_err("globals are not assignable");
    assert!(err.to_string().contains("symbol not declared"));
}
