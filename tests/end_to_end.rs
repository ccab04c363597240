//! Concrete end-to-end scenarios plus the tail-call stack-depth
//! property from the same section's invariant list. Each scenario runs a
//! whole chunk through [`State::do_string`] exactly the way an embedder
//! would, with [`q::stdlib::install`] providing the builtins the chunk
//! calls.

use q::{State, Value, VmOptions};

fn run(source: &str) -> Vec<Value> {
    let mut state = State::new(VmOptions::default());
    q::stdlib::install(&mut state);
    state.do_string(source, "=test").expect("script should run without error")
}

fn as_f64(v: &Value) -> f64 {
    v.as_number().unwrap_or_else(|| panic!("expected a number, got {}", v.display_string()))
}

fn as_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        other => panic!("expected a bool, got {}", other.display_string()),
    }
}

#[test]
fn numeric_for_sums_one_to_ten() {
    let results = run("s=0; for i=1,10 do s=s+i end; return s");
    assert_eq!(results.len(), 1);
    assert_eq!(as_f64(&results[0]), 55.0);
}

#[test]
fn upvalue_closure_counts_across_calls() {
    let results = run(
        "function mk() local c=0; return function() c=c+1; return c end end \
         f=mk(); return f(),f(),f()",
    );
    assert_eq!(results.iter().map(as_f64).collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
}

#[test]
fn add_metamethod_overrides_arithmetic() {
    let results = run(
        "v={}; setmetatable(v,{__add=function(a,b) return 42 end}); return v+v",
    );
    assert_eq!(results.len(), 1);
    assert_eq!(as_f64(&results[0]), 42.0);
}

#[test]
fn pcall_catches_a_thrown_string_with_source_prefix() {
    let results = run(
        "ok,err=pcall(function() error(\"boom\") end); return ok,tostring(err)",
    );
    assert_eq!(results.len(), 2);
    assert!(!as_bool(&results[0]));
    let msg = results[1].as_str().expect("error message should be a string").to_string();
    assert!(msg.contains("boom"), "message should mention the thrown value: {msg}");
    assert!(msg.contains("test:"), "message should carry the standard source prefix: {msg}");
}

#[test]
fn coroutine_resume_yield_round_trip() {
    let results = run(
        "co=g.create(function(x) g.yield(x+1); g.yield(x+2) end) \
         return g.resume(co,10), g.resume(co), g.resume(co)",
    );
    // resume(co,10) -> true, 11
    // resume(co)    -> true, 12
    // resume(co)    -> true  (body ran to completion, no further values)
    assert!(as_bool(&results[0]));
    assert_eq!(as_f64(&results[1]), 11.0);
    assert!(as_bool(&results[2]));
    assert_eq!(as_f64(&results[3]), 12.0);
    assert!(as_bool(&results[4]));
    assert_eq!(results.len(), 5);
}

#[test]
fn tokenizer_matches_every_flag_to_a_value() {
    let (tokens, flags) = q::tokenizer::parse(
        r#"-in the --cap 'Library, or watch-devil "in the details"' -hyp "molly-coddle" -the  video --fox 55 -stage 'Tutorial.'"#,
    )
    .unwrap();

    assert_eq!(flags.get("in").map(String::as_str), Some("the"));
    assert_eq!(flags.get("cap").map(String::as_str), Some(r#"Library, or watch-devil "in the details""#));
    assert_eq!(flags.get("hyp").map(String::as_str), Some("molly-coddle"));
    assert_eq!(flags.get("the").map(String::as_str), Some("video"));
    assert_eq!(flags.get("fox").map(String::as_str), Some("55"));
    assert_eq!(flags.get("stage").map(String::as_str), Some("Tutorial."));
    assert_eq!(tokens.len(), 12);
}

#[test]
fn multi_assign_from_argless_multret_function() {
    let results = run(
        "local function two() return 1,2 end \
         local a,b=two() \
         return a,b",
    );
    assert_eq!(results.len(), 2);
    assert_eq!(as_f64(&results[0]), 1.0);
    assert_eq!(as_f64(&results[1]), 2.0);
}

#[test]
fn and_with_local_left_operand_leaves_local_untouched() {
    let results = run(
        "local x=5 \
         local y=x and 99 \
         return x,y",
    );
    assert_eq!(results.len(), 2);
    assert_eq!(as_f64(&results[0]), 5.0);
    assert_eq!(as_f64(&results[1]), 99.0);
}

#[test]
fn tail_recursion_a_million_deep_does_not_overflow() {
    let results = run(
        "local function loop(n, acc) \
           if n == 0 then return acc end \
           return loop(n - 1, acc + 1) \
         end \
         return loop(1000000, 0)",
    );
    assert_eq!(results.len(), 1);
    assert_eq!(as_f64(&results[0]), 1_000_000.0);
}
