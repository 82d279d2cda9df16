//! Command dispatch for the `undolog` binary.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::engine::OpLog;
use crate::error::{Error, Result};
use crate::wal::FileLog;
use crate::store::FileStore;
use crate::value::{State, Value};

/// One line per supported command, shown by `help` and on a bad argument.
const COMMANDS: &[(&str, &str)] = &[
    ("example", "run the bundled example in memory, print its trace"),
    ("create", "create a log and store file in the data directory"),
    ("set", "key=value [key=value ...]   set keys to values in the store"),
    ("get", "key [key ...]               read keys from the store"),
    ("undo", "                           undo the last action"),
    ("redo", "[n]                        redo action n (default: last undone)"),
    ("redos", "                          list actions redoable from the current tip"),
    ("changes", "                        list the linear history of committed actions"),
    ("history", "                        list every record ever written, including undo/redo"),
    ("compact", "                        collapse the log to its current linear history"),
    ("help", "                           this text"),
];

fn now() -> String {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_secs().to_string()
}

fn print_help() {
    for (name, desc) in COMMANDS {
        println!("{:<10} {}", name, desc);
    }
}

fn open_engine(config: &Config) -> Result<OpLog<FileLog, FileStore>> {
    let log = FileLog::open(config.log_path())?;
    let store = FileStore::open(config.store_path())?;
    let mut state = State::new();
    state.insert(
        "file".to_string(),
        Value::from(config.store_file_name.clone()),
    );
    let mut engine = OpLog::init(log, store, state)?;
    engine.recover(now())?;
    Ok(engine)
}

/// Parse `key=value` pairs from the remaining CLI args.
fn parse_assignments(args: &[String]) -> Result<Vec<(String, Value)>> {
    args.iter()
        .map(|arg| {
            let (key, value) = arg.split_once('=').ok_or_else(|| {
                Error::UserError(format!("expected key=value, got '{}'", arg))
            })?;
            Ok((key.to_string(), Value::from(value)))
        })
        .collect()
}

/// Run one CLI invocation. `args` is the command and its arguments
/// (`argv[1..]`); `config` resolves the data directory. Returns the
/// process exit code.
pub fn run(args: &[String], config: &Config) -> i32 {
    let command = args.first().map(String::as_str).unwrap_or("help");

    match dispatch(command, &args[1.min(args.len())..], config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    }
}

fn dispatch(command: &str, rest: &[String], config: &Config) -> Result<i32> {
    match command {
        "help" | "" => {
            print_help();
            Ok(0)
        }
        "example" => {
            crate::example::run();
            Ok(0)
        }
        "create" => {
            if config.log_path().exists() {
                return Err(Error::UserError(format!(
                    "log already exists at {}",
                    config.log_path().display()
                )));
            }
            let _ = open_engine(config)?;
            Ok(0)
        }
        "get" => {
            let engine = open_engine(config)?;
            for key in rest {
                if let Some(value) = engine.store().get(key) {
                    println!("{}:{}", key, value);
                }
            }
            Ok(0)
        }
        "set" => {
            let mut engine = open_engine(config)?;
            let assignments = parse_assignments(rest)?;
            let description = format!("set {}", rest.join(" "));
            engine.do_action(description, now(), |txn| {
                for (key, value) in assignments {
                    txn.set_store(key, value);
                }
                Ok(())
            })?;
            Ok(0)
        }
        "undo" => {
            let mut engine = open_engine(config)?;
            engine.undo(now())?;
            println!("undo");
            Ok(0)
        }
        "redo" => {
            let mut engine = open_engine(config)?;
            let n: i64 = match rest.first() {
                Some(s) => s
                    .parse()
                    .map_err(|_| Error::UserError(format!("invalid redo index '{}'", s)))?,
                None => -1,
            };
            engine.redo(n, now())?;
            println!("redo");
            Ok(0)
        }
        "redos" => {
            let engine = open_engine(config)?;
            for (i, (date, description)) in engine.redos()?.into_iter().enumerate() {
                println!("{} {} {}", i, date, description);
            }
            Ok(0)
        }
        "changes" => {
            let engine = open_engine(config)?;
            for (description, date, _state) in engine.linear_history()? {
                println!("{} {}", date, description);
            }
            Ok(0)
        }
        "history" => {
            let engine = open_engine(config)?;
            for (idx, op) in engine.history()? {
                println!(
                    "{} n={} {:?}: {}, {:?}",
                    idx, op.n, op.kind, op.description, op.state
                );
            }
            Ok(0)
        }
        "compact" => {
            let mut engine = open_engine(config)?;
            let compact_path = config.data_dir.join(format!("{}.compact", config.log_file_name));
            let new_log = FileLog::open(&compact_path)?;
            engine.compact(new_log, now())?;
            std::fs::rename(&compact_path, config.log_path())?;
            Ok(0)
        }
        other => Err(Error::UserError(format!(
            "unknown command '{}', try 'help'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_assignments_splits_on_equals() {
        let args = vec!["foo=1".to_string(), "bar=hello".to_string()];
        let parsed = parse_assignments(&args).unwrap();
        assert_eq!(parsed, vec![
            ("foo".to_string(), Value::from("1")),
            ("bar".to_string(), Value::from("hello")),
        ]);
    }

    #[test]
    fn parse_assignments_rejects_missing_equals() {
        let args = vec!["foo".to_string()];
        let err = parse_assignments(&args).unwrap_err();
        assert!(matches!(err, Error::UserError(_)));
    }

    #[test]
    fn create_then_set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        assert_eq!(dispatch("create", &[], &config).unwrap(), 0);
        assert_eq!(
            dispatch("set", &["foo=bar".to_string()], &config).unwrap(),
            0
        );
        let engine = open_engine(&config).unwrap();
        assert_eq!(engine.store().get("foo"), Some(Value::from("bar")));
    }

    #[test]
    fn undo_without_prior_action_is_a_user_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        dispatch("create", &[], &config).unwrap();
        let err = dispatch("undo", &[], &config).unwrap_err();
        assert!(matches!(err, Error::UserError(_)));
    }
}
