use std::process::ExitCode;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    relay_cli::run()
}
