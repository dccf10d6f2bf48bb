use ipsim::cli::initialize_from_arguments;
use std::process::ExitCode;

/// Without arguments, main runs the fragmentation simulation
#[tokio::main]
async fn main() -> ExitCode {
    println!("ipsim v{}", env!("CARGO_PKG_VERSION"));
    match initialize_from_arguments().await {
        Ok(status) => {
            println!("Done ({status:?})");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
