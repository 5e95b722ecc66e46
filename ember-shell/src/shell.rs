//! Front ends for Ember applications: an interactive REPL and a script runner.

use ember::{Exception, Interp, Value};
use rustyline::{error::ReadlineError, history::MemHistory, Config, Editor};
use std::fs;
use tracing::debug;

/// Invokes an interactive REPL for the given interpreter, using `rustyline` line editing.
///
/// The REPL will display a default prompt to the user.  Press `^C` to terminate
/// the REPL, returning control to the caller.  Entering `exit` will also normally cause the
/// application to terminate (but the `exit` command can be removed or redefined by the
/// application).
///
/// A line that leaves a brace, bracket, or quote open is continued on the next line.
///
/// To change the prompt, set the `tcl_prompt1` variable to a script that returns
/// the desired prompt; `tcl_prompt2` does the same for continuation lines.
///
/// # Example
///
/// ```no_run
/// use ember::Interp;
///
/// // FIRST, create and initialize the interpreter.
/// let mut glob_ctx = ();
/// let mut interp = Interp::new();
///
/// // NOTE: commands can be added to the interpreter here.
///
/// // NEXT, invoke the REPL.
/// ember_shell::repl(&mut interp, &mut glob_ctx);
/// ```
pub fn repl<Ctx>(interp: &mut Interp<Ctx>, glob_ctx: &mut Ctx) {
    let mut rl = match Editor::<(), MemHistory>::with_history(Config::default(), MemHistory::new())
    {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("failed to init rustyline: {}", err);
            return;
        }
    };

    let mut pending = String::new();

    loop {
        let (var, default) = if pending.is_empty() {
            ("tcl_prompt1", "% ")
        } else {
            ("tcl_prompt2", "> ")
        };

        let readline = match prompt(interp, var, glob_ctx) {
            Some(prompt) => rl.readline(prompt.as_str()),
            None => rl.readline(default),
        };

        match readline {
            Ok(line) => {
                if !pending.is_empty() {
                    pending.push('\n');
                }
                pending.push_str(&line);

                if !interp.complete(&pending) {
                    continue;
                }

                let script = std::mem::take(&mut pending);
                let script = script.trim();
                if script.is_empty() {
                    continue;
                }

                if let Err(e) = rl.add_history_entry(script) {
                    eprintln!("History error: {e}");
                }

                match interp.eval(script, glob_ctx) {
                    Ok(value) => {
                        // Don't output empty values.
                        if !value.as_str().is_empty() {
                            println!("{}", value);
                        }
                    }
                    Err(exception) => report(&exception),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("I/O Error: {:?}", err);
                break;
            }
        }
    }
}

/// Evaluates the prompt script stored in the named variable, if there is one.
fn prompt<Ctx>(interp: &mut Interp<Ctx>, var: &str, glob_ctx: &mut Ctx) -> Option<Value> {
    let pscript = interp.scalar(var).ok()?;

    match interp.eval(pscript.as_str(), glob_ctx) {
        Ok(prompt) => Some(prompt),
        Err(exception) => {
            println!("{}", exception.value());
            None
        }
    }
}

/// Prints an uncaught error's message; with `EMBER_LOG` active the stack trace is
/// logged too.
fn report(exception: &Exception) {
    println!("{}", exception.value());

    if exception.is_error() {
        debug!(error_code = %exception.error_code(), "uncaught error\n{}", exception.error_info());
    }
}

/// Executes a script from a set of command line arguments.
///
/// `args[0]` is presumed to be the name of an Ember script file, with any subsequent
/// arguments being arguments to pass to the script.  The script will be be executed in
/// the context of the given interpreter.
///
/// # Script Variables
///
/// The calling information will be passed to the interpreter in the form of
/// variables:
///
/// * The variable `arg0` will be set to the `arg0` value.
/// * The variable `argv` will be set to a list containing the remainder of the
///   `argv` array.
///
/// If the script fails, its stack trace is printed to `stderr` and the process exits
/// with status 1.
///
/// # Example
///
/// ```no_run
/// use ember::Interp;
/// use std::env;
///
/// // FIRST, get the command line arguments.
/// let args: Vec<String> = env::args().collect();
///
/// // NEXT, create and initialize the interpreter.
/// let mut glob_ctx = ();
/// let mut interp = Interp::new();
///
/// // NOTE: commands can be added to the interpreter here.
///
/// // NEXT, evaluate the file, if any.
/// if args.len() > 1 {
///     ember_shell::script(&mut interp, &args[1..], &mut glob_ctx);
/// } else {
///     eprintln!("Usage: myshell *filename.tcl");
/// }
/// ```
pub fn script<Ctx>(interp: &mut Interp<Ctx>, args: &[String], glob_ctx: &mut Ctx) {
    let Some((arg0, argv)) = args.split_first() else {
        eprintln!("no script file given");
        return;
    };

    match fs::read_to_string(arg0) {
        Ok(script) => {
            if let Err(exception) = execute_script(interp, &script, arg0, argv, glob_ctx) {
                eprintln!("{}", exception.error_info());
                std::process::exit(1);
            }
        }
        Err(e) => println!("{}", e),
    }
}

/// Executes a script read from a file, with any command-line arguments, in
/// the context of the given interpreter.  The `script` is the text of the
/// script, `arg0` is the name of the script file, and `argv` contains the script
/// arguments.
fn execute_script<Ctx>(
    interp: &mut Interp<Ctx>,
    script: &str,
    arg0: &str,
    argv: &[String],
    ctx: &mut Ctx,
) -> Result<(), Exception> {
    debug!(script = arg0, argc = argv.len(), "run script");

    interp.set_scalar("arg0", Value::from(arg0))?;
    interp.set_scalar("argv", Value::from(argv))?;
    interp.eval(script, ctx)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_script_sets_args() {
        let mut interp = Interp::new();
        let argv = vec!["a".to_string(), "b c".to_string()];

        execute_script(&mut interp, "set n [llength $argv]", "demo.tcl", &argv, &mut ())
            .expect("script");

        assert_eq!(interp.scalar("arg0").expect("arg0").as_str(), "demo.tcl");
        assert_eq!(interp.scalar("n").expect("n").as_str(), "2");
    }

    #[test]
    fn test_execute_script_error_has_trace() {
        let mut interp = Interp::new();

        let err = execute_script(&mut interp, "set a 1\nerror boom", "demo.tcl", &[], &mut ())
            .unwrap_err();

        assert_eq!(
            err.error_info().as_str(),
            "boom\n    while executing\n\"error boom\""
        );
    }

    #[test]
    fn test_prompt_from_variable() {
        let mut interp = Interp::new();
        assert!(prompt(&mut interp, "tcl_prompt1", &mut ()).is_none());

        interp
            .set_scalar("tcl_prompt1", Value::from("return {ember> }"))
            .expect("set");
        let text = prompt(&mut interp, "tcl_prompt1", &mut ()).expect("prompt");
        assert_eq!(text.as_str(), "ember> ");
    }
}
