use std::process::ExitCode;

fn main() -> ExitCode {
    cloudplan_cli::run()
}
