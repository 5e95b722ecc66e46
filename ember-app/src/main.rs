use ember::Interp;
use std::env;

fn main() {
    init_tracing();

    // FIRST, get the command line arguments.
    let args: Vec<String> = env::args().collect();

    // NEXT, create and initialize the interpreter.
    let mut interp = Interp::new();

    // NEXT, evaluate the file, if any; otherwise run the REPL.
    if args.len() > 1 {
        ember_shell::script(&mut interp, &args[1..], &mut ());
    } else {
        println!("Ember {}", env!("CARGO_PKG_VERSION"));
        ember_shell::repl(&mut interp, &mut ());
    }
}

/// Installs a stderr subscriber filtered by `EMBER_LOG`, or `RUST_LOG` if that's
/// unset.  With neither set, nothing is installed and logging costs nothing.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let directives = match env::var("EMBER_LOG").or_else(|_| env::var("RUST_LOG")) {
        Ok(directives) => directives,
        Err(_) => return,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .with(EnvFilter::new(directives))
        .init();

    tracing::debug!("tracing initialized");
}
