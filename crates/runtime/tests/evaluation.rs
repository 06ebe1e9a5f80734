//! End-to-end evaluation through `Interp::do_string`
//!
//! Covers binding, calls, the fail/throw control model and the stacks a
//! trap must restore.

use reb_runtime::config::RuntimeConfig;
use reb_runtime::{Cell, Interp, Kind};

fn run(interp: &mut Interp, source: &str) -> Cell {
    match interp.do_string(source, "test") {
        Ok(value) => value,
        Err(err) => panic!("{source}: {}", interp.form_error(err)),
    }
}

fn fails_with(interp: &mut Interp, source: &str) -> String {
    match interp.do_string(source, "test") {
        Ok(value) => panic!("{source}: expected an error, got {}", interp.mold(&value)),
        Err(err) => interp.error_id(err).unwrap_or_default(),
    }
}

fn ints(interp: &Interp, block: &Cell) -> Vec<i64> {
    let (series, index) = block.array_at().unwrap();
    interp.heap.cells(series)[index..]
        .iter()
        .filter_map(Cell::as_integer)
        .collect()
}

#[test]
fn test_bind_to_the_context_of_a_word() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let value = run(&mut interp, "x: 10 blk: [x + 1] bind blk 'y do blk");
    assert_eq!(value.as_integer(), Some(11));
}

#[test]
fn test_function_call() {
    let mut interp = Interp::new(RuntimeConfig::default());
    assert_eq!(run(&mut interp, "f: func [x] [x + 1] f 41").as_integer(), Some(42));
}

#[test]
fn test_trap_returns_the_error() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let value = run(&mut interp, "trap [1 / 0]");
    assert_eq!(value.kind(), Kind::Error);
    let err = value.context_id().unwrap();
    assert_eq!(interp.error_id(err).as_deref(), Some("zero-divide"));
    assert_eq!(interp.error_type(err).as_deref(), Some("math"));
}

#[test]
fn test_attempt_gives_blank_on_failure() {
    let mut interp = Interp::new(RuntimeConfig::default());
    assert!(run(&mut interp, "attempt [1 / 0]").is_blank());
}

#[test]
fn test_break_with_value_ends_the_loop() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let value = run(&mut interp, "for-each x [1 2 3] [if x = 2 [break/with 99]]");
    assert_eq!(value.as_integer(), Some(99));
}

#[test]
fn test_remove_each_edits_in_place() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let removed = run(&mut interp, "b: [1 2 3 4] remove-each x b [even? x]");
    assert_eq!(removed.as_integer(), Some(2));
    let b = run(&mut interp, "b");
    assert_eq!(ints(&interp, &b), vec![1, 3]);
}

#[test]
fn test_catch_throw() {
    let mut interp = Interp::new(RuntimeConfig::default());
    assert_eq!(run(&mut interp, "catch [throw 7]").as_integer(), Some(7));
}

#[test]
fn test_bind_into_object() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let value = run(&mut interp, "bind b: [a] make object! [a: 5] do b");
    assert_eq!(value.as_integer(), Some(5));
}

#[test]
fn test_nested_calls() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let value = run(&mut interp, "f: func [x] [g x] g: func [y] [y * 2] f 21");
    assert_eq!(value.as_integer(), Some(42));
}

#[test]
fn test_relative_word_after_its_call_ends() {
    let mut interp = Interp::new(RuntimeConfig::default());
    assert_eq!(
        fails_with(&mut interp, "f: func [x] [[x]] b: f 1 do b"),
        "no-relative"
    );
    // the same block is fine while a call of `f` is running
    let value = run(&mut interp, "g: func [x] [do [x]] g 3");
    assert_eq!(value.as_integer(), Some(3));
}

#[test]
fn test_recursion_reads_the_innermost_call() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let value = run(
        &mut interp,
        "fact: func [n] [either n <= 1 [1] [n * fact n - 1]] fact 10",
    );
    assert_eq!(value.as_integer(), Some(3_628_800));
}

#[test]
fn test_trap_restores_stacks() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let guards = interp.heap.guards_len();
    let manuals = interp.heap.manuals_len();

    let value = run(
        &mut interp,
        "deep: func [n] [either n = 0 [1 / 0] [append copy [] deep n - 1]] \
         trap [deep 25] trap [deep 3] attempt [deep 1] 'ok",
    );
    assert_eq!(value.kind(), Kind::Word);
    assert_eq!(interp.eval_depth(), 0);
    assert_eq!(interp.heap.guards_len(), guards);
    assert_eq!(interp.heap.manuals_len(), manuals);
    assert!(interp.binding_table_is_clean());
    assert!(interp.peak_depth() > 25);
}

#[test]
fn test_uncaught_failure_leaves_clean_state() {
    let mut interp = Interp::new(RuntimeConfig::default());
    assert_eq!(fails_with(&mut interp, "f: func [x] [x + undefined-word] f 1"), "no-value");
    assert_eq!(interp.eval_depth(), 0);
    // the interpreter keeps working after an uncaught failure
    assert_eq!(run(&mut interp, "f: func [x] [x] f 2").as_integer(), Some(2));
}

#[test]
fn test_unrecognized_throws_pass_through() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let value = run(
        &mut interp,
        "catch/name [f: func [] [throw/name 1 'outer] catch [f 2]] 'outer",
    );
    assert_eq!(value.as_integer(), Some(1));
    // loops and traps do not stop a throw either
    assert_eq!(run(&mut interp, "catch [loop 3 [trap [throw 5]]]").as_integer(), Some(5));
}

#[test]
fn test_break_is_local_to_its_loop() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let value = run(
        &mut interp,
        "n: 0 loop 3 [loop 10 [break] n: n + 1] n",
    );
    assert_eq!(value.as_integer(), Some(3));
    assert_eq!(fails_with(&mut interp, "break"), "no-catch");
    // trap does not intercept a break
    assert_eq!(fails_with(&mut interp, "trap [break]"), "no-catch");
}

#[test]
fn test_continue_skips_the_rest_of_the_body() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let value = run(
        &mut interp,
        "out: copy [] for-each x [1 2 3 4] [if even? x [continue] append out x] out",
    );
    assert_eq!(ints(&interp, &value), vec![1, 3]);
}

#[test]
fn test_objects_and_paths() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let value = run(
        &mut interp,
        "o: make object! [a: 1 get-a: does [a]] o/a: 7 o/get-a",
    );
    assert_eq!(value.as_integer(), Some(7));
    let value = run(&mut interp, "p: make o [b: a + 1] reduce [p/a p/b o/a]");
    assert_eq!(ints(&interp, &value), vec![7, 8, 7]);
}

#[test]
fn test_print_goes_to_captured_output() {
    let mut interp = Interp::new(RuntimeConfig::default());
    interp.capture_output();
    run(&mut interp, "print [\"sum:\" 1 + 2] print \"done\"");
    assert_eq!(interp.take_output(), "sum: 3\ndone\n");
}

#[test]
fn test_protecting_an_argument_locks_only_that_call() {
    let mut interp = Interp::new(RuntimeConfig::default());
    run(&mut interp, "f: func [x /lock] [if lock [protect bind 'x 'x] x: x + 1]");
    assert_eq!(run(&mut interp, "f 1").as_integer(), Some(2));
    assert_eq!(fails_with(&mut interp, "f/lock 1"), "locked-word");
    assert_eq!(run(&mut interp, "f 1").as_integer(), Some(2));
}
