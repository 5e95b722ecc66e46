//! End-to-end behavior of the interpreter core through its public API.

use ember::*;
use pretty_assertions::assert_eq;
use std::rc::Rc;

#[test]
fn text_survives_list_view() {
    let value = Value::from("  a {b  c}   d ");
    assert_eq!(value.as_str(), "  a {b  c}   d ");

    let list = value.as_list().expect("list");
    assert_eq!(list.len(), 3);
    assert_eq!(value.as_str(), "  a {b  c}   d ");
}

#[test]
fn list_round_trip() {
    let items = vec![Value::from("a"), Value::from("b c"), Value::empty(), Value::from("{")];
    let value = Value::from(items.clone());
    assert_eq!(value.as_str(), "a {b c} {} \\{");

    let reparsed = Value::from(value.as_str()).as_list().expect("list");
    assert_eq!(&*reparsed, &items);
}

#[test]
fn builder_invalidates_list_view() {
    let mut value = Value::from("a b");
    assert_eq!(value.as_list().expect("list").len(), 2);

    let mut text = value.builder();
    text.push_str(" c");
    text.done();

    assert_eq!(value.as_str(), "a b c");
    assert_eq!(value.as_list().expect("list").len(), 3);
}

#[test]
fn link_chains_are_bounded() {
    let mut stack = CallStack::new();
    let global = stack.global_id();

    stack.set(global, "v0", Value::from("end")).expect("set");
    for i in 1..=3 {
        let prev = format!("v{}", i - 1);
        stack
            .link(global, &format!("v{}", i), global, &prev, LinkMode::Create)
            .expect("link");
    }

    stack.set_max_redirects(3);
    assert_eq!(stack.get(global, "v3").expect("get").as_str(), "end");

    stack.set_max_redirects(2);
    let err = stack.get(global, "v3").unwrap_err();
    assert!(matches!(err, EmberError::TooManyRedirects { .. }));
}

#[test]
fn unset_link_removes_only_alias() {
    let mut stack = CallStack::new();
    let b = stack.global_id();
    let frame = stack.new_procedure_frame("a", &[]);
    let a = stack.push(frame);

    stack.link(a, "x", b, "y", LinkMode::Create).expect("link");
    stack.set(b, "y", Value::from(5)).expect("set");
    stack
        .unset(a, "x", VarFlags::empty(), UnsetLinkPolicy::AliasOnly)
        .expect("unset");

    let err = stack.get(a, "x").unwrap_err();
    assert!(matches!(err, EmberError::Undefined { .. }));
    assert_eq!(stack.get(b, "y").expect("get").as_str(), "5");
}

#[test]
fn unset_link_policy_can_remove_target() {
    let mut interp = Interp::new();
    interp.set_unset_link_policy(UnsetLinkPolicy::Target);

    interp
        .eval("set y 5; proc p {} { upvar y x; unset x }; p", &mut ())
        .expect("eval");
    assert!(!interp.exists("y"));
}

#[test]
fn link_rejects_existing_value_and_cycles() {
    let mut stack = CallStack::new();
    let global = stack.global_id();

    stack.set(global, "a", Value::from(1)).expect("set");
    stack.link(global, "b", global, "a", LinkMode::Create).expect("link");

    let err = stack
        .link(global, "a", global, "b", LinkMode::Create)
        .unwrap_err();
    assert!(matches!(err, EmberError::CycleDetected(_)));

    stack.set(global, "c", Value::from(2)).expect("set");
    let err = stack
        .link(global, "c", global, "a", LinkMode::Create)
        .unwrap_err();
    assert_eq!(err, EmberError::AlreadyExists("c".into()));

    stack.link(global, "c", global, "a", LinkMode::Replace).expect("replace");
    assert_eq!(stack.get(global, "c").expect("get").as_str(), "1");
}

#[test]
fn nested_evaluation_restores_depth() {
    let mut interp = Interp::new();
    let depth = interp.call_stack().depth();

    for script in ["set ok 1", "error boom", "scope create s; scope open s; error leaked"] {
        let frame = interp.new_tracking_frame("test", FrameFlags::EVAL);
        let _ = interp.with_frame(frame, |interp| interp.eval(script, &mut ()));
        assert_eq!(interp.call_stack().depth(), depth);
    }

    let argv = [Value::from("eval"), Value::from("scope open s\nerror again")];
    let err = interp.evaluate_script("eval", &argv, 1, &mut ()).unwrap_err();
    assert_eq!(err.value().as_str(), "again");
    assert_eq!(interp.call_stack().depth(), depth);
}

#[test]
fn iteration_ceiling() {
    let mut interp = Interp::new();
    interp.set_iteration_limit(Some(10));

    interp
        .eval("set tests 0; catch {for {} {[incr tests] > 0} {} {}} msg", &mut ())
        .expect("eval");
    assert_eq!(interp.scalar("msg").expect("msg").as_str(), "iteration limit 10 exceeded");
    assert_eq!(interp.get_int("tests").expect("tests"), 11);

    interp.set_iteration_limit(None);
    let value = interp
        .eval("set n 0; while {$n < 50} { incr n }", &mut ())
        .expect("eval");
    assert_eq!(value.as_str(), "");
    assert_eq!(interp.get_int("n").expect("n"), 50);
}

#[test]
fn eval_in_fresh_frame() {
    let mut interp = Interp::new();
    let frame = interp
        .call_stack_mut()
        .new_procedure_frame("fresh", &[]);
    let id = interp.push_frame(frame);

    let value = interp.eval("set a 1; incr a 5", &mut ()).expect("eval");
    assert_eq!(value.as_str(), "6");
    assert_eq!(interp.call_stack().get(id, "a").expect("a").as_str(), "6");

    interp.pop_frame();
    assert!(!interp.exists("a"));
}

#[test]
fn global_links_into_local_frame() {
    let mut interp = Interp::new();
    let frame = interp
        .call_stack_mut()
        .new_procedure_frame("local", &[]);
    interp.push_frame(frame);

    interp.eval("global x; set x 9", &mut ()).expect("eval");
    interp.pop_frame();

    assert_eq!(interp.scalar("x").expect("x").as_str(), "9");
}

#[test]
fn error_context_accumulates() {
    let mut interp = Interp::new();

    let script = "proc inner {} {\n    error {bad thing}\n}\nproc outer {} {\n    inner\n}\nouter";
    let err = interp.eval(script, &mut ()).unwrap_err();

    assert_eq!(err.value().as_str(), "bad thing");
    assert_eq!(
        err.error_info().as_str(),
        "bad thing\n    while executing\n\"error {bad thing}\"\n    (procedure \"inner\" line 2)\n    invoked from within\n\"inner\"\n    (procedure \"outer\" line 2)\n    invoked from within\n\"outer\""
    );
    assert_eq!(interp.scalar("errorInfo").expect("errorInfo"), err.error_info());
}

#[test]
fn logged_errors_get_no_engine_context() {
    let mut interp = Interp::new();

    let err = interp
        .eval("proc p {} { error msg {my own trace} }; p", &mut ())
        .unwrap_err();
    assert_eq!(err.error_info().as_str(), "my own trace");

    let err = interp
        .eval("proc q {} { return -code error -errorinfo {from return} msg }; q", &mut ())
        .unwrap_err();
    assert_eq!(err.error_info().as_str(), "from return");
}

#[test]
fn custom_codes_round_trip() {
    let mut interp = Interp::new();

    let err = interp
        .eval("proc p {} { return -code 7 payload }; p", &mut ())
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::Other(7));
    assert_eq!(err.value().as_str(), "payload");

    let value = interp.eval("catch p result", &mut ()).expect("catch");
    assert_eq!(value.as_str(), "7");
    assert_eq!(interp.scalar("result").expect("result").as_str(), "payload");
}

#[test]
fn loops_honor_break_and_continue() {
    let mut interp = Interp::new();

    let value = interp
        .eval(
            "set out {}
             foreach i {1 2 3 4 5 6} {
                 if {$i % 2 == 0} continue
                 if {$i > 4} break
                 lappend out $i
             }
             set out",
            &mut (),
        )
        .expect("eval");
    assert_eq!(value.as_str(), "1 3");

    let err = interp.eval("proc p {} { break }; p", &mut ()).unwrap_err();
    assert_eq!(err.value().as_str(), "invoked \"break\" outside of a loop");
}

#[test]
fn uplevel_and_upvar_levels() {
    let mut interp = Interp::new();

    interp
        .eval(
            "proc a {} { set v a; b }
             proc b {} { set v b; c }
             proc c {} { list [uplevel 1 {set v}] [uplevel 2 {set v}] [uplevel #1 {set v}] }",
            &mut (),
        )
        .expect("procs");
    assert_eq!(interp.eval("a", &mut ()).expect("a").as_str(), "b a a");

    let err = interp.eval("proc d {} { upvar 5 x y }; d", &mut ()).unwrap_err();
    assert_eq!(err.value().as_str(), "bad level \"5\"");
}

struct PrefixResolver;

impl Resolver for PrefixResolver {
    fn name(&self) -> &str {
        "prefix"
    }

    fn resolve_variable_frame(
        &self,
        stack: &CallStack,
        name: &str,
        _flags: VarFlags,
    ) -> Result<Resolution, EmberError> {
        match name.strip_prefix("cfg_") {
            Some(rest) if !rest.is_empty() => Ok(Resolution::Resolved {
                frame: stack.global_id(),
                name: name.into(),
            }),
            Some(_) => Err(EmberError::NameResolutionFailed {
                name: name.into(),
                reason: "empty setting name".into(),
            }),
            None => Ok(Resolution::Deferred),
        }
    }
}

#[test]
fn resolvers_run_before_local_lookup() {
    let mut interp = Interp::new();
    interp.add_resolver(10, Rc::new(PrefixResolver));
    assert_eq!(interp.resolver_names(), vec!["namespace", "prefix"]);

    interp
        .eval("proc p {} { set cfg_debug on; set local 1 }; p", &mut ())
        .expect("eval");
    assert_eq!(interp.scalar("cfg_debug").expect("cfg").as_str(), "on");
    assert!(!interp.exists("local"));

    let err = interp.eval("set cfg_ 1", &mut ()).unwrap_err();
    assert_eq!(err.value().as_str(), "can't resolve \"cfg_\": empty setting name");

    assert!(interp.remove_resolver("prefix"));
    interp.eval("proc q {} { set cfg_x 1 }; q", &mut ()).expect("eval");
    assert!(!interp.exists("cfg_x"));
}

#[test]
fn halt_from_another_thread() {
    let mut interp = Interp::new();
    let handle = interp.halt_handle();

    std::thread::spawn(move || handle.request())
        .join()
        .expect("thread");

    let err = interp.eval("while 1 {}", &mut ()).unwrap_err();
    assert_eq!(err.value().as_str(), "eval canceled");
    assert!(!interp.halt_requested());
}

#[test]
fn substitution_flags_are_independent() {
    let mut interp = Interp::new();
    interp.set_scalar("name", Value::from("ember")).expect("set");

    let text = Value::from("$name [string length $name]\\n");
    let flags = SubstFlags::VARIABLES | SubstFlags::BACKSLASHES;
    let value = interp.substitute(&text, flags, &mut ()).expect("subst");
    assert_eq!(value.as_str(), "ember [string length ember]\n");

    let value = interp
        .substitute(&text, SubstFlags::COMMANDS, &mut ())
        .expect("subst");
    assert_eq!(value.as_str(), "$name 5\\n");
}

#[test]
fn typed_views_report_conversion_errors() {
    let mut interp = Interp::new();
    interp.set_scalar("n", Value::from("12x")).expect("set");

    let err = interp.get_int("n").unwrap_err();
    assert_eq!(err.value().as_str(), "expected integer but got \"12x\"");

    interp.set_list("l", vec![Value::from(1), Value::from(2)]).expect("set");
    assert_eq!(interp.get_list("l").expect("list").len(), 2);
    assert_eq!(interp.eval("llength $l", &mut ()).expect("eval").as_str(), "2");
}
