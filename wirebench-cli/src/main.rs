//! Wirebench binary entry point.

fn main() {
    match wirebench_cli::run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(wirebench_cli::EXIT_FAILURE);
        }
    }
}
