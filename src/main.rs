//! `undolog` - a durable, crash-safe undo/redo log for a key/value store.
//!
//! Usage: undolog [-d DIR] <command> [args...]

use std::path::PathBuf;

use log::info;

use undolog::Config;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let raw_args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();
    let mut positional: Vec<String> = Vec::new();

    let mut i = 1;
    while i < raw_args.len() {
        match raw_args[i].as_str() {
            "--data-dir" | "-d" => {
                if i + 1 < raw_args.len() {
                    config.data_dir = PathBuf::from(&raw_args[i + 1]);
                    i += 1;
                }
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    info!("undolog starting, data dir: {:?}", config.data_dir);

    let code = undolog::cli::run(&positional, &config);
    std::process::exit(code);
}
