use std::{env, path::PathBuf, process::ExitCode};

use mallet::{EvaluationContext, MalletError};
use rustyline::{error::ReadlineError, DefaultEditor};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const HISTORY_FILE: &str = ".mallet-history";
const LOG_ENV: &str = "MALLET_LOG";

#[derive(Debug, Clone)]
enum ArgCmd {
    Repl,
    Run { path: String, args: Vec<String> },
    Help,
}

fn print_usage() {
    println!("mallet v{}\n", VERSION);
    println!("Usage:");
    println!("  mallet                     Start the REPL");
    println!("  mallet <file> [args...]    Load a file, binding the remaining arguments to *ARGV*");
    println!("  mallet -h                  Show this help message");
    println!();
    println!("Set {} (for example {}=debug) to control logging on stderr.", LOG_ENV, LOG_ENV);
}

fn parse_args(args: Vec<String>) -> Result<ArgCmd, String> {
    let mut args = args.into_iter().skip(1);

    match args.next() {
        None => Ok(ArgCmd::Repl),
        Some(arg) if arg == "-h" || arg == "--help" => Ok(ArgCmd::Help),
        Some(arg) if arg.starts_with('-') => Err(format!("Error: Unknown argument '{}'", arg)),
        Some(path) => Ok(ArgCmd::Run { path, args: args.collect() }),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn history_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| PathBuf::from(home).join(HISTORY_FILE))
}

fn repl() -> anyhow::Result<()> {
    let context = EvaluationContext::new()?;
    let mut editor = DefaultEditor::new()?;

    let history = history_path();
    if let Some(path) = &history {
        if editor.load_history(path).is_err() {
            debug!(path = %path.display(), "no history loaded");
        }
    }

    loop {
        let line = match editor.readline("user> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };

        if !line.trim().is_empty() {
            if let Err(err) = editor.add_history_entry(line.as_str()) {
                warn!(%err, "cannot add history entry");
            }
            if let Some(path) = &history {
                if let Err(err) = editor.save_history(path) {
                    warn!(path = %path.display(), %err, "cannot save history");
                }
            }
        }

        match context.rep(&line) {
            Ok(output) => println!("{}", output),
            Err(MalletError::NoTokens) => {}
            Err(err @ MalletError::SyntaxError(_)) => eprintln!("{}", err),
            Err(err) => println!("Error: {}", err),
        }
    }

    Ok(())
}

fn run_file(path: &str, args: &[String]) -> anyhow::Result<()> {
    let context = EvaluationContext::new()?;
    context.set_argv(args);
    context.load_file(path)?;
    Ok(())
}

fn main() -> ExitCode {
    init_logging();

    let command = match parse_args(env::args().collect()) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{}\n", message);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let result = match command {
        ArgCmd::Help => {
            print_usage();
            Ok(())
        }
        ArgCmd::Repl => repl(),
        ArgCmd::Run { path, args } => run_file(&path, &args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        std::iter::once("mallet").chain(values.iter().copied()).map(String::from).collect()
    }

    #[test]
    fn no_arguments_start_the_repl() {
        assert!(matches!(parse_args(args(&[])), Ok(ArgCmd::Repl)));
    }

    #[test]
    fn help_flag() {
        assert!(matches!(parse_args(args(&["-h"])), Ok(ArgCmd::Help)));
        assert!(matches!(parse_args(args(&["--help"])), Ok(ArgCmd::Help)));
    }

    #[test]
    fn file_arguments_follow_the_path() {
        match parse_args(args(&["script.mal", "a", "-b"])) {
            Ok(ArgCmd::Run { path, args }) => {
                assert_eq!(path, "script.mal");
                assert_eq!(args, vec!["a".to_owned(), "-b".to_owned()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(parse_args(args(&["--bogus"])).is_err());
    }
}
