//! # Standard Ember Command Definitions
//!
//! This module defines the standard Ember commands.  They are deliberately thin: each
//! one checks its arguments and then calls into the interpreter's frame, variable, and
//! evaluation APIs, which is where the interesting behavior lives.

use crate::check_args;
use crate::ember_err;
use crate::ember_opt_ok;
use crate::frame::FrameFlags;
use crate::frame::FrameId;
use crate::frame::LevelSpec;
use crate::frame::LinkMode;
use crate::interp::concat_args;
use crate::interp::Interp;
use crate::list;
use crate::resolver;
use crate::types::*;
use crate::value::Value;
use std::fs;

/// The standard command table: name, static flags, and implementation.
pub(crate) fn standard_commands<Ctx>() -> Vec<(&'static str, CommandFlags, CommandFunc<Ctx>)> {
    let safe = CommandFlags::STANDARD | CommandFlags::CORE | CommandFlags::SAFE;
    let host = merge_command_flags(safe, CommandFlags::UNSAFE);

    let mut table: Vec<(&'static str, CommandFlags, CommandFunc<Ctx>)> = Vec::new();
    let mut add = |name, flags, func: CommandFunc<Ctx>| table.push((name, flags, func));

    add("append", safe, cmd_append);
    add("array", safe, cmd_array);
    add("assert_eq", safe, cmd_assert_eq);
    add("break", safe, cmd_break);
    add("catch", safe, cmd_catch);
    add("continue", safe, cmd_continue);
    add("error", safe, cmd_error);
    add("eval", safe, cmd_eval);
    add("exit", host, cmd_exit);
    add("expr", safe, cmd_expr);
    add("for", safe, cmd_for);
    add("foreach", safe, cmd_foreach);
    add("global", safe, cmd_global);
    add("if", safe, cmd_if);
    add("incr", safe, cmd_incr);
    #[cfg(feature = "info")]
    add("info", safe, cmd_info);
    add("join", safe, cmd_join);
    add("lappend", safe, cmd_lappend);
    add("lindex", safe, cmd_lindex);
    add("list", safe, cmd_list);
    add("llength", safe, cmd_llength);
    add("lremove", safe, cmd_lremove);
    add("namespace", safe, cmd_namespace);
    add("proc", safe, cmd_proc);
    add("puts", host, cmd_puts);
    add("rename", safe, cmd_rename);
    add("return", safe, cmd_return);
    add("scope", safe, cmd_scope);
    add("set", safe, cmd_set);
    add("source", host, cmd_source);
    add("string", safe, cmd_string);
    add("subst", safe, cmd_subst);
    add("throw", safe, cmd_throw);
    add("unset", safe, cmd_unset);
    add("uplevel", safe, cmd_uplevel);
    add("upvar", safe, cmd_upvar);
    add("variable", safe, cmd_variable);
    add("while", safe, cmd_while);

    table
}

/// Handles the signal from a loop body: `Ok(true)` to keep looping, `Ok(false)` on
/// `break`, and anything else propagates.
fn loop_signal(result: EmberResult) -> Result<bool, Exception> {
    match result {
        Ok(_) => Ok(true),
        Err(exception) => match exception.code() {
            ResultCode::Break => Ok(false),
            ResultCode::Continue => Ok(true),
            _ => Err(exception),
        },
    }
}

/// # append *varName* ?*value* ...?
///
/// Appends one or more strings to a variable, creating it if need be.
pub fn cmd_append<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 0, "varName ?value value ...?")?;

    let mut value = if interp.var_exists(&argv[1]) {
        interp.var(&argv[1])?
    } else {
        Value::empty()
    };

    let mut text = value.builder();
    for item in &argv[2..] {
        text.push_str(item.as_str());
    }
    text.done();

    interp.set_var_return(&argv[1], value).map(Some)
}

/// # array *subcommand* ?*arg*...?
pub fn cmd_array<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberOptResult {
    let subcommands = [
        Subcommand("exists", cmd_array_exists),
        Subcommand("get", cmd_array_get),
        Subcommand("names", cmd_array_names),
        Subcommand("set", cmd_array_set),
        Subcommand("size", cmd_array_size),
        Subcommand("unset", cmd_array_unset),
    ];

    interp.call_subcommand(argv, 1, &subcommands, ctx)
}

fn cmd_array_exists<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "arrayName")?;
    ember_opt_ok!(interp.array_exists(argv[2].as_str()))
}

fn cmd_array_get<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "arrayName")?;
    ember_opt_ok!(interp.array_get(argv[2].as_str()))
}

fn cmd_array_names<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "arrayName")?;
    ember_opt_ok!(interp.array_names(argv[2].as_str()))
}

fn cmd_array_set<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 4, 4, "arrayName list")?;
    let kvlist = argv[3].as_list()?;
    interp.array_set(argv[2].as_str(), &kvlist)?;
    ember_opt_ok!()
}

fn cmd_array_size<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "arrayName")?;
    ember_opt_ok!(interp.array_size(argv[2].as_str()))
}

fn cmd_array_unset<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 4, "arrayName ?index?")?;

    match argv.get(3) {
        Some(index) => {
            let name = format!("{}({})", argv[2], index);
            interp.unset(&name, VarFlags::NO_COMPLAIN)?;
        }
        None => interp.array_unset(argv[2].as_str())?,
    }

    ember_opt_ok!()
}

/// # assert_eq *received* *expected*
///
/// Fails if the two values' string forms differ.  Used by test scripts.
pub fn cmd_assert_eq<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 3, 3, "received expected")?;

    if argv[1] == argv[2] {
        ember_opt_ok!()
    } else {
        ember_err!(
            "assertion failed: received \"{}\", expected \"{}\".",
            argv[1],
            argv[2]
        )
    }
}

/// # break
///
/// Breaks out of the enclosing loop.
pub fn cmd_break<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 1, 1, "")?;
    Err(Exception::ember_break())
}

/// # catch *script* ?*resultVarName*? ?*optionsVarName*?
///
/// Evaluates the script, returning the numeric result code.  The result (or error
/// message) and the `return` options may be saved in variables.  A pending halt
/// can't be caught.
pub fn cmd_catch<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 4, "script ?resultVarName? ?optionsVarName?")?;

    let result = interp.eval_tracked("catch", FrameFlags::CATCH, &argv[1], ctx);

    let (code, value) = match &result {
        Ok(value) => (ResultCode::Okay, value.clone()),
        Err(exception) if exception.is_error() && interp.halt_requested() => {
            return Err(exception.clone());
        }
        Err(exception) => (exception.code(), exception.value()),
    };

    let options = interp.return_options(&result);
    interp.reset_error_context();

    if let Some(var_name) = argv.get(2) {
        interp.set_var(var_name, value)?;
    }

    if let Some(var_name) = argv.get(3) {
        interp.set_var(var_name, options)?;
    }

    ember_opt_ok!(code.as_int())
}

/// # continue
///
/// Continues with the next iteration of the enclosing loop.
pub fn cmd_continue<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 1, 1, "")?;
    Err(Exception::ember_continue())
}

/// # error *message* ?*errorInfo*? ?*errorCode*?
///
/// Returns an error.  A non-empty `errorInfo` replaces the stack trace entirely: the
/// error is marked as logged, so no further context is added to it.
pub fn cmd_error<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 4, "message ?errorInfo? ?errorCode?")?;

    let msg = argv[1].clone();
    let error_code = argv.get(3).cloned().unwrap_or_else(|| Value::from("NONE"));

    match argv.get(2) {
        Some(info) if !info.is_empty() => {
            interp.mark_error_already_logged(true);
            Err(Exception::ember_err_with_info(msg, info, error_code))
        }
        _ => Err(Exception::throw(error_code, msg)),
    }
}

/// # eval *arg* ?*arg*...?
///
/// Concatenates the arguments and evaluates the result as a script.
pub fn cmd_eval<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 0, "arg ?arg ...?")?;
    interp.evaluate_script("eval", argv, 1, ctx).map(Some)
}

/// # exit ?*returnCode*?
///
/// Terminates the application by calling `std::process::exit()`.
pub fn cmd_exit<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 1, 2, "?returnCode?")?;

    let return_code: EmberInt = match argv.get(1) {
        Some(code) => code.as_int()?,
        None => 0,
    };

    std::process::exit(return_code as i32)
}

/// # expr *arg* ?*arg*...?
///
/// Concatenates the arguments and evaluates the result as an expression.
pub fn cmd_expr<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 0, "arg ?arg ...?")?;
    interp.evaluate_expression("expr", argv, 1, ctx).map(Some)
}

/// # for *start* *test* *next* *command*
///
/// A C-style `for` loop.
pub fn cmd_for<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 5, 5, "start test next command")?;

    let (start, test, next, body) = (&argv[1], &argv[2], &argv[3], &argv[4]);
    let mut count = 0;

    interp.eval_labeled("for", "initial command", start, ctx)?;

    while interp.expr_bool_tracked("for", "test expression", test, ctx)? {
        let result = interp.eval_body("for", body, ctx);
        if !loop_signal(result)? {
            break;
        }

        interp.eval_labeled("for", "loop-end command", next, ctx)?;
        interp.loop_tick(&mut count)?;
    }

    ember_opt_ok!()
}

/// # foreach *varList* *list* ?*varList* *list* ...? *body*
///
/// Loops over one or more lists in parallel, assigning successive elements to the
/// variables in each *varList*.
pub fn cmd_foreach<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 4, 0, "varList list ?varList list ...? command")?;

    if argv.len() % 2 != 0 {
        return ember_err!(
            "wrong # args: should be \"foreach varList list ?varList list ...? command\""
        );
    }

    let body = &argv[argv.len() - 1];
    let mut pairs = Vec::new();

    for pair in argv[1..argv.len() - 1].chunks(2) {
        let vars = pair[0].as_list()?;
        if vars.is_empty() {
            return ember_err!("foreach varlist is empty");
        }
        pairs.push((vars, pair[1].as_list()?));
    }

    let iterations = pairs
        .iter()
        .map(|(vars, items)| (items.len() + vars.len() - 1) / vars.len())
        .max()
        .unwrap_or(0);
    let mut count = 0;

    for i in 0..iterations {
        for (vars, items) in &pairs {
            for (j, var) in vars.iter().enumerate() {
                let item = items.get(i * vars.len() + j).cloned().unwrap_or_default();
                interp.set_var(var, item)?;
            }
        }

        let result = interp.eval_body("foreach", body, ctx);
        if !loop_signal(result)? {
            break;
        }

        interp.loop_tick(&mut count)?;
    }

    ember_opt_ok!()
}

/// # global ?*varName* ...?
///
/// Links each named global variable into the current scope.
pub fn cmd_global<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    for name in &argv[1..] {
        interp.global(name.as_str())?;
    }

    ember_opt_ok!()
}

/// # if *expr1* ?then? *body1* elseif *expr2* ?then? *body2* ... ?else? ?*bodyN*?
pub fn cmd_if<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 3, 0, "expression script ?elseif expression script ...? ?else script?")?;

    let mut argi = 1;

    while argi < argv.len() {
        // FIRST, evaluate the condition.
        let flag = interp.expr_bool_tracked("if", "test expression", &argv[argi], ctx)?;
        argi += 1;

        // NEXT, skip the optional "then".
        if argi < argv.len() && argv[argi].as_str() == "then" {
            argi += 1;
        }

        if argi >= argv.len() {
            return ember_err!(
                "wrong # args: no script following after \"{}\" argument",
                argv[argi - 1]
            );
        }

        if flag {
            return interp.eval_body("if", &argv[argi], ctx).map(Some);
        }
        argi += 1;

        // NEXT, check for an elseif or else clause.
        if argi >= argv.len() {
            return ember_opt_ok!();
        }

        match argv[argi].as_str() {
            "elseif" => argi += 1,
            "else" => {
                argi += 1;
                if argi >= argv.len() {
                    return ember_err!("wrong # args: no script following after \"else\" argument");
                }
                return interp.eval_body("if", &argv[argi], ctx).map(Some);
            }
            _ => {
                return interp.eval_body("if", &argv[argi], ctx).map(Some);
            }
        }
    }

    ember_err!("wrong # args: no expression after \"elseif\" argument")
}

/// # incr *varName* ?*increment*?
///
/// Increments an integer variable by a value, creating it if need be.
pub fn cmd_incr<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 3, "varName ?increment?")?;

    let increment: EmberInt = match argv.get(2) {
        Some(value) => value.as_int()?,
        None => 1,
    };

    let new_value = if interp.var_exists(&argv[1]) {
        match interp.var(&argv[1])?.as_int()?.checked_add(increment) {
            Some(sum) => sum,
            None => return ember_err!("integer value too large to represent"),
        }
    } else {
        increment
    };

    interp.set_var_return(&argv[1], new_value.into()).map(Some)
}

/// # info *subcommand* ?*arg*...?
#[cfg(feature = "info")]
pub fn cmd_info<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberOptResult {
    let subcommands = [
        Subcommand("args", cmd_info_args),
        Subcommand("body", cmd_info_body),
        Subcommand("cmdtype", cmd_info_cmdtype),
        Subcommand("commands", cmd_info_commands),
        Subcommand("complete", cmd_info_complete),
        Subcommand("default", cmd_info_default),
        Subcommand("exists", cmd_info_exists),
        Subcommand("frames", cmd_info_frames),
        Subcommand("globals", cmd_info_globals),
        Subcommand("level", cmd_info_level),
        Subcommand("locals", cmd_info_locals),
        Subcommand("procs", cmd_info_procs),
        Subcommand("vars", cmd_info_vars),
    ];

    interp.call_subcommand(argv, 1, &subcommands, ctx)
}

#[cfg(feature = "info")]
fn cmd_info_args<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "procname")?;
    interp.proc_args(argv[2].as_str()).map(Some)
}

#[cfg(feature = "info")]
fn cmd_info_body<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "procname")?;
    interp.proc_body(argv[2].as_str()).map(Some)
}

#[cfg(feature = "info")]
fn cmd_info_cmdtype<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "command")?;
    interp.command_type(argv[2].as_str()).map(Some)
}

#[cfg(feature = "info")]
fn cmd_info_commands<Ctx>(interp: &mut Interp<Ctx>, _: &[Value], _: &mut Ctx) -> EmberOptResult {
    ember_opt_ok!(interp.command_names())
}

#[cfg(feature = "info")]
fn cmd_info_complete<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "command")?;
    ember_opt_ok!(interp.complete(argv[2].as_str()))
}

/// # info default *procname* *arg* *varname*
///
/// Stores the argument's default value in the variable and returns 1, or returns 0
/// if the argument has no default.
#[cfg(feature = "info")]
fn cmd_info_default<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 5, 5, "procname arg varname")?;

    match interp.proc_default(argv[2].as_str(), argv[3].as_str())? {
        Some(value) => {
            interp.set_var(&argv[4], value)?;
            ember_opt_ok!(1)
        }
        None => {
            interp.set_var(&argv[4], Value::empty())?;
            ember_opt_ok!(0)
        }
    }
}

#[cfg(feature = "info")]
fn cmd_info_exists<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "varname")?;
    ember_opt_ok!(interp.var_exists(&argv[2]))
}

/// # info frames
///
/// Lists the visible frames from the global frame up, each as a `{kind name level}`
/// triple.
#[cfg(feature = "info")]
fn cmd_info_frames<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 2, 2, "")?;

    let frames: EmberList = interp
        .call_stack()
        .frames()
        .filter(|frame| !frame.flags().contains(FrameFlags::INVISIBLE))
        .map(|frame| {
            let flags = frame.flags();
            let kind = if flags.contains(FrameFlags::GLOBAL) {
                "global"
            } else if flags.contains(FrameFlags::PROCEDURE) {
                "proc"
            } else if flags.contains(FrameFlags::NAMESPACE) {
                "namespace"
            } else if flags.contains(FrameFlags::SCOPE) {
                "scope"
            } else if flags.contains(FrameFlags::UPLEVEL) {
                "uplevel"
            } else {
                "tracking"
            };

            Value::from(vec![
                Value::from(kind),
                Value::from(frame.name()),
                Value::from(frame.level()),
            ])
        })
        .collect();

    ember_opt_ok!(frames)
}

#[cfg(feature = "info")]
fn cmd_info_globals<Ctx>(interp: &mut Interp<Ctx>, _: &[Value], _: &mut Ctx) -> EmberOptResult {
    ember_opt_ok!(interp.vars_in_global_scope())
}

/// # info level ?*number*?
///
/// With no argument, the current level.  Otherwise the command words of the frame
/// at that level: positive numbers are absolute, zero and negative ones relative.
#[cfg(feature = "info")]
fn cmd_info_level<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 2, 3, "?number?")?;

    let number = match argv.get(2) {
        Some(number) => number.as_int()?,
        None => return ember_opt_ok!(interp.scope_level()),
    };

    let level = if number > 0 {
        LevelSpec::Absolute(number as usize)
    } else {
        LevelSpec::Relative(number.unsigned_abs() as usize)
    };

    let id = match interp.resolve_frame_for_level(&level) {
        Ok(id) if id != interp.call_stack().global_id() => id,
        _ => return ember_err!("bad level \"{}\"", argv[2]),
    };

    let args = interp
        .call_stack()
        .frame(id)
        .map(|frame| frame.args().to_vec())
        .unwrap_or_default();

    ember_opt_ok!(args)
}

#[cfg(feature = "info")]
fn cmd_info_locals<Ctx>(interp: &mut Interp<Ctx>, _: &[Value], _: &mut Ctx) -> EmberOptResult {
    ember_opt_ok!(interp.vars_in_local_scope())
}

#[cfg(feature = "info")]
fn cmd_info_procs<Ctx>(interp: &mut Interp<Ctx>, _: &[Value], _: &mut Ctx) -> EmberOptResult {
    ember_opt_ok!(interp.proc_names())
}

#[cfg(feature = "info")]
fn cmd_info_vars<Ctx>(interp: &mut Interp<Ctx>, _: &[Value], _: &mut Ctx) -> EmberOptResult {
    ember_opt_ok!(interp.vars_in_scope())
}

/// # join *list* ?*joinString*?
pub fn cmd_join<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 3, "list ?joinString?")?;

    let list = argv[1].as_list()?;
    let separator = argv.get(2).map(|sep| sep.as_str()).unwrap_or(" ");

    let items: Vec<&str> = list.iter().map(|v| v.as_str()).collect();
    ember_opt_ok!(items.join(separator))
}

/// # lappend *varName* ?*value* ...?
///
/// Appends values as list elements to the list stored in a variable.
pub fn cmd_lappend<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 0, "varName ?value ...?")?;

    let mut list: EmberList = if interp.var_exists(&argv[1]) {
        interp.var(&argv[1])?.as_list()?.to_vec()
    } else {
        Vec::new()
    };

    list.extend(argv[2..].iter().cloned());
    interp.set_var_return(&argv[1], list.into()).map(Some)
}

/// # lindex *list* ?*index* ...?
///
/// Returns an element from a list, descending into nested lists when several
/// indices (or an index list) are given.  Out-of-range indices produce the empty
/// string.
pub fn cmd_lindex<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 0, "list ?index ...?")?;

    let indices: EmberList = match argv.len() {
        2 => return ember_opt_ok!(argv[1].clone()),
        3 => argv[2].as_list()?.to_vec(),
        _ => argv[2..].to_vec(),
    };

    let mut value = argv[1].clone();

    for index in &indices {
        let list = value.as_list()?;
        match list::get_index(&list, index)? {
            Some(item) => value = item,
            None => return ember_opt_ok!(),
        }
    }

    ember_opt_ok!(value)
}

/// # list ?*arg*...?
pub fn cmd_list<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    ember_opt_ok!(&argv[1..])
}

/// # llength *list*
pub fn cmd_llength<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 2, "list")?;
    ember_opt_ok!(argv[1].as_list()?.len())
}

/// # lremove *list* ?*index* ...?
///
/// Returns a copy of the list with the element at the nested index path removed.
/// The enclosing lists are rebuilt; the original value is untouched.
pub fn cmd_lremove<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 0, "list ?index ...?")?;
    list::remove_path(&argv[1], &argv[2..]).map(Some)
}

/// # namespace *subcommand* ?*arg*...?
pub fn cmd_namespace<Ctx>(
    interp: &mut Interp<Ctx>,
    argv: &[Value],
    ctx: &mut Ctx,
) -> EmberOptResult {
    let subcommands = [
        Subcommand("current", cmd_namespace_current),
        Subcommand("delete", cmd_namespace_delete),
        Subcommand("eval", cmd_namespace_eval),
        Subcommand("exists", cmd_namespace_exists),
        Subcommand("qualifiers", cmd_namespace_qualifiers),
        Subcommand("tail", cmd_namespace_tail),
    ];

    interp.call_subcommand(argv, 1, &subcommands, ctx)
}

fn cmd_namespace_current<Ctx>(
    interp: &mut Interp<Ctx>,
    argv: &[Value],
    _: &mut Ctx,
) -> EmberOptResult {
    check_args(2, argv, 2, 2, "")?;
    ember_opt_ok!(interp.call_stack().current_namespace())
}

fn cmd_namespace_delete<Ctx>(
    interp: &mut Interp<Ctx>,
    argv: &[Value],
    _: &mut Ctx,
) -> EmberOptResult {
    for name in &argv[2..] {
        let path = resolver::absolute_path(interp.call_stack(), name.as_str());

        if !interp.call_stack_mut().delete_namespace(&path) {
            return ember_err!("unknown namespace \"{}\" in namespace delete command", name);
        }
    }

    ember_opt_ok!()
}

/// # namespace eval *namespace* *arg* ?*arg* ...?
///
/// Evaluates the script in the namespace, creating it if need be.
fn cmd_namespace_eval<Ctx>(
    interp: &mut Interp<Ctx>,
    argv: &[Value],
    ctx: &mut Ctx,
) -> EmberOptResult {
    check_args(2, argv, 4, 0, "name arg ?arg...?")?;

    let path = resolver::absolute_path(interp.call_stack(), argv[2].as_str());
    let stack = interp.call_stack_mut();
    let namespace = stack.create_namespace(&path);
    let frame = stack.new_namespace_eval_frame(&path, namespace);

    let script = concat_args(argv, 3);
    let result = interp.with_frame(frame, |interp| interp.eval_value(&script, ctx));

    result.map(Some).map_err(|mut exception| {
        let context = format!(
            "    (in namespace eval \"{}\" script line {})",
            path,
            interp.current_error_line()
        );
        interp.append_error_context(&mut exception, &context);
        exception
    })
}

fn cmd_namespace_exists<Ctx>(
    interp: &mut Interp<Ctx>,
    argv: &[Value],
    _: &mut Ctx,
) -> EmberOptResult {
    check_args(2, argv, 3, 3, "name")?;
    let path = resolver::absolute_path(interp.call_stack(), argv[2].as_str());
    ember_opt_ok!(interp.call_stack().namespace_exists(&path))
}

fn cmd_namespace_qualifiers<Ctx>(
    _: &mut Interp<Ctx>,
    argv: &[Value],
    _: &mut Ctx,
) -> EmberOptResult {
    check_args(2, argv, 3, 3, "string")?;

    match argv[2].as_str().rsplit_once("::") {
        Some((qualifiers, _)) => ember_opt_ok!(qualifiers),
        None => ember_opt_ok!(),
    }
}

fn cmd_namespace_tail<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "string")?;

    match argv[2].as_str().rsplit_once("::") {
        Some((_, tail)) => ember_opt_ok!(tail),
        None => ember_opt_ok!(argv[2].clone()),
    }
}

/// # proc *name* *args* *body*
///
/// Defines a procedure.
pub fn cmd_proc<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 4, 4, "name args body")?;

    let name = argv[1].as_str();
    let args = argv[2].as_list()?;

    // FIRST, validate the argument specifiers.
    for arg in args.iter() {
        let vec = arg.as_list()?;

        if vec.is_empty() || vec[0].is_empty() {
            return ember_err!("argument with no name");
        } else if vec.len() > 2 {
            return ember_err!("too many fields in argument specifier \"{}\"", arg);
        }
    }

    interp.add_proc(name, &args, &argv[3]);
    ember_opt_ok!()
}

/// # puts ?-nonewline? ?*channelId*? *string*
///
/// Outputs the string to `stdout` or `stderr`.
pub fn cmd_puts<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 4, "?-nonewline? ?channelId? string")?;

    let mut args = &argv[1..];
    let newline = if args.len() > 1 && args[0].as_str() == "-nonewline" {
        args = &args[1..];
        false
    } else {
        true
    };

    let (channel, text) = match args {
        [text] => ("stdout", text),
        [channel, text] => (channel.as_str(), text),
        _ => return ember_err!("wrong # args: should be \"puts ?-nonewline? ?channelId? string\""),
    };

    let end = if newline { "\n" } else { "" };

    match channel {
        "stdout" => print!("{}{}", text, end),
        "stderr" => eprint!("{}{}", text, end),
        _ => return ember_err!("can not find channel named \"{}\"", channel),
    }

    ember_opt_ok!()
}

/// # rename *oldName* *newName*
///
/// Renames the command called *oldName* to have the *newName*.  If the
/// *newName* is "", the command is destroyed.
pub fn cmd_rename<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 3, 3, "oldName newName")?;

    let old_name = argv[1].as_str();
    let new_name = argv[2].as_str();

    if !interp.has_command(old_name) {
        return ember_err!("can't rename \"{}\": command doesn't exist", old_name);
    }

    if new_name.is_empty() {
        interp.remove_command(old_name);
    } else {
        interp.rename_command(old_name, new_name);
    }

    ember_opt_ok!()
}

/// # return ?-code *code*? ?-level *level*? ?-errorcode *errorCode*? ?-errorinfo *errorInfo*? ?*value*?
///
/// Returns from a procedure with the given *value*, or the empty string.  `-code` may
/// be any symbolic or integer code; `-level` is how many procedure boundaries to
/// unwind before the code takes effect.
pub fn cmd_return<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 1, 0, "?options...? ?value?")?;

    // FIRST, the value is the odd argument out.
    let (opt_args, value) = if argv.len() % 2 == 0 {
        (&argv[1..argv.len() - 1], argv[argv.len() - 1].clone())
    } else {
        (&argv[1..], Value::empty())
    };

    // NEXT, process the options.
    let mut code = ResultCode::Okay;
    let mut level: usize = 1;
    let mut error_code = None;
    let mut error_info = None;

    for pair in opt_args.chunks(2) {
        let (opt, val) = (&pair[0], &pair[1]);

        match opt.as_str() {
            "-code" => code = ResultCode::from_value(val)?,
            "-errorcode" => error_code = Some(val.clone()),
            "-errorinfo" => error_info = Some(val.clone()),
            "-level" => match val.as_int() {
                Ok(num) if num >= 0 => level = num as usize,
                _ => {
                    return ember_err!(
                        "bad -level value: expected non-negative integer but got \"{}\"",
                        val
                    )
                }
            },
            _ => {
                return ember_err!(
                    "bad option \"{}\": must be -code, -errorcode, -errorinfo, or -level",
                    opt
                )
            }
        }
    }

    // NEXT, produce the signal.
    match code {
        ResultCode::Error => {
            if error_info.as_ref().map_or(false, |info| !info.is_empty()) {
                interp.mark_error_already_logged(true);
            }
            Err(Exception::ember_return_err(value, level, error_code, error_info))
        }
        ResultCode::Okay if level == 0 => Ok(Some(value)),
        code => Err(Exception::ember_return_ext(value, level, code)),
    }
}

/// # scope *subcommand* ?*arg*...?
///
/// Named scopes: persistent variable stores that a script can open over the current
/// level and close again.
pub fn cmd_scope<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberOptResult {
    let subcommands = [
        Subcommand("close", cmd_scope_close),
        Subcommand("create", cmd_scope_create),
        Subcommand("current", cmd_scope_current),
        Subcommand("destroy", cmd_scope_destroy),
        Subcommand("exists", cmd_scope_exists),
        Subcommand("list", cmd_scope_list),
        Subcommand("open", cmd_scope_open),
        Subcommand("set", cmd_scope_set),
        Subcommand("unset", cmd_scope_unset),
        Subcommand("vars", cmd_scope_vars),
    ];

    interp.call_subcommand(argv, 1, &subcommands, ctx)
}

fn scope_id<Ctx>(interp: &Interp<Ctx>, name: &Value) -> Result<FrameId, Exception> {
    match interp.call_stack().scope_frame(name.as_str()) {
        Some(id) => Ok(id),
        None => ember_err!("scope \"{}\" not found", name),
    }
}

/// # scope close ?*name*?
///
/// Closes the scope in use at the current level, which must be *name* if given.
fn cmd_scope_close<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 2, 3, "?name?")?;

    let stack = interp.call_stack();
    let id = stack.variable_frame();
    let open = match stack.frame(id) {
        Some(frame) if frame.flags().contains(FrameFlags::SCOPE) => frame.name().to_string(),
        _ => return ember_err!("no scope is open"),
    };

    if let Some(name) = argv.get(2) {
        if open != name.as_str() {
            return ember_err!("scope \"{}\" isn't the current scope", name);
        }
    }

    interp.call_stack_mut().remove(id);
    ember_opt_ok!()
}

/// # scope create ?*name*?
///
/// Creates a scope, generating a name if none is given, and returns its name.
fn cmd_scope_create<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 2, 3, "?name?")?;

    let name = match argv.get(2) {
        Some(name) => {
            if interp.call_stack().scope_exists(name.as_str()) {
                return ember_err!("scope \"{}\" already exists", name);
            }
            name.to_string()
        }
        None => {
            let mut serial = interp.call_stack().scope_names().len();
            loop {
                let candidate = format!("scope{}", serial);
                if !interp.call_stack().scope_exists(&candidate) {
                    break candidate;
                }
                serial += 1;
            }
        }
    };

    interp.call_stack_mut().create_scope(&name);
    ember_opt_ok!(name)
}

fn cmd_scope_current<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 2, 2, "")?;
    ember_opt_ok!(interp.call_stack().current_scope().unwrap_or_default())
}

fn cmd_scope_destroy<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "name")?;

    let name = argv[2].as_str();
    if interp.call_stack().scope_is_open(name) {
        return ember_err!("scope \"{}\" is open", name);
    }

    if !interp.call_stack_mut().delete_scope(name) {
        return ember_err!("scope \"{}\" not found", name);
    }

    ember_opt_ok!()
}

fn cmd_scope_exists<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "name")?;
    ember_opt_ok!(interp.call_stack().scope_exists(argv[2].as_str()))
}

fn cmd_scope_list<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 2, 2, "")?;
    ember_opt_ok!(&interp.call_stack().scope_names()[..])
}

/// # scope open *name*
///
/// Pushes a frame that uses the scope's variables at the current level.  The frame
/// stays until `scope close`, or until the enclosing evaluation ends.
fn cmd_scope_open<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "name")?;

    let scope = scope_id(interp, &argv[2])?;
    if interp.call_stack().scope_is_open(argv[2].as_str()) {
        return ember_err!("scope \"{}\" is already open", argv[2]);
    }

    let frame = interp
        .call_stack_mut()
        .new_scope_frame(argv[2].as_str(), scope);
    interp.push_frame(frame);
    ember_opt_ok!(argv[2].clone())
}

/// # scope set *name* *varName* ?*value*?
fn cmd_scope_set<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 4, 5, "name varName ?value?")?;

    let scope = scope_id(interp, &argv[2])?;
    let stack = interp.call_stack_mut();

    let value = match argv.get(4) {
        Some(value) => stack.set(scope, argv[3].as_str(), value.clone())?,
        None => stack.get(scope, argv[3].as_str())?,
    };

    ember_opt_ok!(value)
}

/// # scope unset *name* *varName*
fn cmd_scope_unset<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 4, 4, "name varName")?;

    let scope = scope_id(interp, &argv[2])?;
    let policy = interp.unset_link_policy();
    interp
        .call_stack_mut()
        .unset(scope, argv[3].as_str(), VarFlags::empty(), policy)?;
    ember_opt_ok!()
}

fn cmd_scope_vars<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "name")?;
    let scope = scope_id(interp, &argv[2])?;
    ember_opt_ok!(interp.call_stack().var_names(scope))
}

/// # set *varName* ?*newValue*?
///
/// Sets variable *varName* to *newValue*, returning the value.
/// If *newValue* is omitted, returns the variable's current value,
/// returning an error if the variable is unknown.
pub fn cmd_set<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 3, "varName ?newValue?")?;

    if argv.len() == 3 {
        interp.set_var_return(&argv[1], argv[2].clone()).map(Some)
    } else {
        interp.var(&argv[1]).map(Some)
    }
}

/// # source *fileName*
///
/// Sources the file, returning the result.
pub fn cmd_source<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 2, "fileName")?;

    let filename = argv[1].as_str();
    let script = match fs::read_to_string(filename) {
        Ok(script) => Value::from(script),
        Err(e) => return ember_err!("couldn't read file \"{}\": {}", filename, e),
    };

    let frame = interp.new_tracking_frame("source", FrameFlags::SOURCE);
    let result = interp.with_frame(frame, |interp| interp.eval_value(&script, ctx));

    result.map(Some).map_err(|mut exception| {
        let context = format!(
            "    (file \"{}\" line {})",
            filename,
            interp.current_error_line()
        );
        interp.append_error_context(&mut exception, &context);
        exception
    })
}

/// # string *subcommand* ?*arg*...?
pub fn cmd_string<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberOptResult {
    let subcommands = [
        Subcommand("cat", cmd_string_cat),
        Subcommand("compare", cmd_string_compare),
        Subcommand("equal", cmd_string_equal),
        Subcommand("first", cmd_string_first),
        Subcommand("index", cmd_string_index),
        Subcommand("length", cmd_string_length),
        Subcommand("range", cmd_string_range),
        Subcommand("repeat", cmd_string_repeat),
        Subcommand("tolower", cmd_string_tolower),
        Subcommand("toupper", cmd_string_toupper),
        Subcommand("trim", cmd_string_trim),
        Subcommand("trimleft", cmd_string_trimleft),
        Subcommand("trimright", cmd_string_trimright),
    ];

    interp.call_subcommand(argv, 1, &subcommands, ctx)
}

fn cmd_string_cat<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    let mut buff = String::new();

    for arg in &argv[2..] {
        buff.push_str(arg.as_str());
    }

    ember_opt_ok!(buff)
}

fn cmd_string_compare<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 4, 4, "string1 string2")?;

    let ordering: EmberInt = match argv[2].as_str().cmp(argv[3].as_str()) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    };

    ember_opt_ok!(ordering)
}

fn cmd_string_equal<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 4, 4, "string1 string2")?;
    ember_opt_ok!(argv[2] == argv[3])
}

fn cmd_string_first<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 4, 4, "needleString haystackString")?;

    let haystack = argv[3].as_str();
    let position: EmberInt = match haystack.find(argv[2].as_str()) {
        Some(byte) => haystack[..byte].chars().count() as EmberInt,
        None => -1,
    };

    ember_opt_ok!(position)
}

fn cmd_string_index<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 4, 4, "string charIndex")?;

    let chars: Vec<char> = argv[2].as_str().chars().collect();
    let index = list::parse_index(argv[3].as_str(), chars.len())?;

    if index < 0 || index as usize >= chars.len() {
        ember_opt_ok!()
    } else {
        ember_opt_ok!(chars[index as usize].to_string())
    }
}

fn cmd_string_length<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "string")?;
    ember_opt_ok!(argv[2].as_str().chars().count())
}

fn cmd_string_range<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 5, 5, "string first last")?;

    let chars: Vec<char> = argv[2].as_str().chars().collect();
    let len = chars.len() as EmberInt;
    let first = list::parse_index(argv[3].as_str(), chars.len())?.max(0);
    let last = list::parse_index(argv[4].as_str(), chars.len())?.min(len - 1);

    if first > last {
        return ember_opt_ok!();
    }

    let range: String = chars[first as usize..=last as usize].iter().collect();
    ember_opt_ok!(range)
}

fn cmd_string_repeat<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 4, 4, "string count")?;
    let count = argv[3].as_int()?.max(0) as usize;
    let text = argv[2].as_str();

    if text.len().checked_mul(count).map_or(true, |len| len > i32::MAX as usize) {
        return ember_err!("result of \"string repeat\" is too large");
    }

    ember_opt_ok!(text.repeat(count))
}

fn cmd_string_tolower<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "string")?;
    ember_opt_ok!(argv[2].as_str().to_lowercase())
}

fn cmd_string_toupper<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 3, "string")?;
    ember_opt_ok!(argv[2].as_str().to_uppercase())
}

fn trim_chars(argv: &[Value]) -> Option<Vec<char>> {
    argv.get(3).map(|chars| chars.as_str().chars().collect())
}

fn cmd_string_trim<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 4, "string ?chars?")?;

    match trim_chars(argv) {
        Some(chars) => ember_opt_ok!(argv[2].as_str().trim_matches(&chars[..])),
        None => ember_opt_ok!(argv[2].as_str().trim()),
    }
}

fn cmd_string_trimleft<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 4, "string ?chars?")?;

    match trim_chars(argv) {
        Some(chars) => ember_opt_ok!(argv[2].as_str().trim_start_matches(&chars[..])),
        None => ember_opt_ok!(argv[2].as_str().trim_start()),
    }
}

fn cmd_string_trimright<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(2, argv, 3, 4, "string ?chars?")?;

    match trim_chars(argv) {
        Some(chars) => ember_opt_ok!(argv[2].as_str().trim_end_matches(&chars[..])),
        None => ember_opt_ok!(argv[2].as_str().trim_end()),
    }
}

/// # subst ?-nobackslashes? ?-nocommands? ?-novariables? *string*
pub fn cmd_subst<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberOptResult {
    check_args(
        1,
        argv,
        2,
        0,
        "?-nobackslashes? ?-nocommands? ?-novariables? string",
    )?;

    let mut flags = SubstFlags::ALL;

    for opt in &argv[1..argv.len() - 1] {
        match opt.as_str() {
            "-nobackslashes" => flags.remove(SubstFlags::BACKSLASHES),
            "-nocommands" => flags.remove(SubstFlags::COMMANDS),
            "-novariables" => flags.remove(SubstFlags::VARIABLES),
            _ => {
                return ember_err!(
                    "bad option \"{}\": must be -nobackslashes, -nocommands, or -novariables",
                    opt
                )
            }
        }
    }

    interp
        .substitute(&argv[argv.len() - 1], flags, ctx)
        .map(Some)
}

/// # throw *type* *message*
///
/// Raises an error with a machine-readable error code, which must be a non-empty
/// list.
pub fn cmd_throw<Ctx>(_: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 3, 3, "type message")?;

    if argv[1].as_list()?.is_empty() {
        return ember_err!("type must be non-empty list");
    }

    Err(Exception::throw(argv[1].clone(), argv[2].clone()))
}

/// # unset ?-nocomplain? ?-notrace? ?--? ?*varName* ...?
///
/// Removes the variables.  Unsetting a link follows the interpreter's link policy.
pub fn cmd_unset<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 1, 0, "?-nocomplain? ?-notrace? ?--? ?varName varName ...?")?;

    let mut flags = VarFlags::empty();
    let mut argi = 1;

    while argi < argv.len() {
        match argv[argi].as_str() {
            "-nocomplain" => flags |= VarFlags::NO_COMPLAIN,
            "-notrace" => flags |= VarFlags::NO_TRACE,
            "--" => {
                argi += 1;
                break;
            }
            _ => break,
        }
        argi += 1;
    }

    for name in &argv[argi..] {
        interp.unset(name.as_str(), flags)?;
    }

    ember_opt_ok!()
}

/// # uplevel ?*level*? *arg* ?*arg* ...?
///
/// Evaluates the concatenated arguments in the variable context of the given level,
/// by default the caller's.
pub fn cmd_uplevel<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 0, "?level? command ?arg ...?")?;

    let (level, start) = if argv.len() > 2 && LevelSpec::looks_like_level(argv[1].as_str()) {
        (LevelSpec::parse(argv[1].as_str())?, 2)
    } else {
        (LevelSpec::Relative(1), 1)
    };

    let target = interp.resolve_frame_for_level(&level)?;
    let frame = interp
        .call_stack_mut()
        .new_uplevel_frame("uplevel", target);

    let script = concat_args(argv, start);
    let result = interp.with_frame(frame, |interp| interp.eval_value(&script, ctx));

    result.map(Some).map_err(|mut exception| {
        let context = format!(
            "    (\"uplevel\" body line {})",
            interp.current_error_line()
        );
        interp.append_error_context(&mut exception, &context);
        exception
    })
}

/// # upvar ?*level*? *otherVar* *myVar* ?*otherVar* *myVar* ...?
///
/// Links each *myVar* in the current scope to *otherVar* in the scope at the given
/// level, by default the caller's.
pub fn cmd_upvar<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 3, 0, "?level? otherVar localVar ?otherVar localVar ...?")?;

    let (level, start) = if LevelSpec::looks_like_level(argv[1].as_str()) {
        (LevelSpec::parse(argv[1].as_str())?, 2)
    } else {
        (LevelSpec::Relative(1), 1)
    };

    // Names come in pairs after the level.
    if argv.len() <= start || (argv.len() - start) % 2 != 0 {
        return ember_err!(
            "wrong # args: should be \"upvar ?level? otherVar localVar ?otherVar localVar ...?\""
        );
    }

    for pair in argv[start..].chunks(2) {
        interp.upvar(&level, pair[0].as_str(), pair[1].as_str())?;
    }

    ember_opt_ok!()
}

/// # variable ?*name* *value* ...? *name* ?*value*?
///
/// Creates variables in the current namespace, setting those given values.  Inside a
/// procedure each one is also linked into the procedure's scope.
pub fn cmd_variable<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], _: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 2, 0, "?name value...? name ?value?")?;

    let namespace = interp.call_stack().current_namespace();
    let in_proc = {
        let stack = interp.call_stack();
        stack
            .frame(stack.variable_frame())
            .map_or(false, |frame| frame.flags().contains(FrameFlags::PROCEDURE))
    };

    for pair in argv[1..].chunks(2) {
        let name = pair[0].as_str();
        let qualified = if name.contains("::") {
            name.to_string()
        } else if namespace == "::" {
            format!("::{}", name)
        } else {
            format!("{}::{}", namespace, name)
        };

        if let Some(value) = pair.get(1) {
            interp.set(&qualified, value.clone(), VarFlags::empty())?;
        }

        if in_proc {
            let tail = name.rsplit("::").next().unwrap_or(name);
            let global = interp.call_stack().global_id();
            interp.link(tail, global, &qualified, LinkMode::Create)?;
        }
    }

    ember_opt_ok!()
}

/// # while *test* *command*
///
/// A standard "while" loop.  *test* is a boolean expression; *command* is a script to
/// execute so long as the expression is true.
pub fn cmd_while<Ctx>(interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberOptResult {
    check_args(1, argv, 3, 3, "test command")?;

    let mut count = 0;

    while interp.expr_bool_tracked("while", "test expression", &argv[1], ctx)? {
        let result = interp.eval_body("while", &argv[2], ctx);
        if !loop_signal(result)? {
            break;
        }

        interp.loop_tick(&mut count)?;
    }

    ember_opt_ok!()
}
