//! Logging facilities
//!
//! Line-oriented `LEVEL HH:MM:SS message` logs on standard output.

use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};

/// Initializes the console logger with a `log_level` from configuration.
///
/// Accepts `debug`, `info` and `error`; anything else falls back to `info`.
pub fn init_with_level(level: &str) {
    let level = match level {
        "debug" => LevelFilter::Debug,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    };

    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{l} {d(%H:%M:%S)} {m}{n}")))
        .target(Target::Stdout)
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .build(Root::builder().appender("console").build(level))
        .expect("logging");

    log4rs::init_config(config).expect("logging");
}
