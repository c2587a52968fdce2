use std::process::ExitCode;

fn main() -> ExitCode {
    benchdrive_cli::run()
}
