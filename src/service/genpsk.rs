//! Generate a fresh pre-shared key

use std::process::ExitCode;

use phantom_service::phantom::crypto;

/// Program entrance `main`
pub fn main() -> ExitCode {
    println!("{}", crypto::generate_psk());
    ExitCode::SUCCESS
}
