use std::process::ExitCode;

fn main() -> ExitCode {
    souk_cli::run()
}
