use std::process::ExitCode;

fn main() -> ExitCode {
    optiquote_cli::run()
}
