//! This is the binary running in the server environment
//!
//! All runtime configuration comes from a YAML file, see mod `config` in
//! `phantom-service`. The only command line options are the configuration
//! path and the two utility actions (version, PSK generation).

use std::process::ExitCode;

use clap::{Arg, ArgAction, Command};

use phantom_rust::{
    service::{genpsk, server},
    VERSION,
};

fn main() -> ExitCode {
    let mut app = Command::new("phantom-server")
        .about("A stateless encrypted UDP relay keyed by a pre-shared secret")
        .disable_version_flag(true)
        .arg(
            Arg::new("VERSION")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Print version and exit"),
        )
        .arg(
            Arg::new("GEN_PSK")
                .long("gen-psk")
                .action(ArgAction::SetTrue)
                .help("Generate a new PSK and exit"),
        );
    app = server::define_command_line_options(app);

    let matches = app.get_matches();

    if matches.get_flag("VERSION") {
        println!("phantom-server {VERSION}");
        return ExitCode::SUCCESS;
    }

    if matches.get_flag("GEN_PSK") {
        return genpsk::main();
    }

    server::main(&matches)
}
