use std::process::ExitCode;

fn main() -> ExitCode {
    chainpolicy_cli::run()
}
