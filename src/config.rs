use std::ffi::OsString;
use std::path::PathBuf;

use clap::{App, Arg, ArgMatches};

use crate::logger::LogLevel;

/// which collaborator lowers and runs accepted units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Interpreter,
    Llvm,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// script to read, stdin when `None`
    pub input: Option<PathBuf>,
    pub prompt: bool,
    pub backend: BackendKind,
    pub dump_ast: bool,
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: None,
            prompt: true,
            backend: BackendKind::Interpreter,
            dump_ast: false,
            log_level: LogLevel::default(),
        }
    }
}

fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("kaleido")
        .version(env!("CARGO_PKG_VERSION"))
        .about("interactive front end for a tiny expression language")
        .arg(
            Arg::with_name("FILE")
                .help("script to run; reads stdin when absent or '-'")
                .index(1),
        )
        .arg(
            Arg::with_name("no-prompt")
                .long("no-prompt")
                .help("never print the 'ready>' prompt"),
        )
        .arg(
            Arg::with_name("backend")
                .long("backend")
                .takes_value(true)
                .possible_values(&["interp", "llvm"])
                .default_value("interp")
                .help("how accepted units are lowered and run"),
        )
        .arg(
            Arg::with_name("dump-ast")
                .long("dump-ast")
                .help("print every accepted unit's syntax tree"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("log more; repeat for more detail"),
        )
        .arg(
            Arg::with_name("log-level")
                .long("log-level")
                .takes_value(true)
                .possible_values(LogLevel::NAMES)
                .conflicts_with("verbose")
                .help("explicit log level"),
        )
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Config, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = app().get_matches_from_safe(args)?;
        Ok(Config::from_matches(&matches))
    }

    fn from_matches(matches: &ArgMatches) -> Config {
        let input = matches
            .value_of_os("FILE")
            .filter(|path| *path != "-")
            .map(PathBuf::from);

        let backend = match matches.value_of("backend") {
            Some("llvm") => BackendKind::Llvm,
            _ => BackendKind::Interpreter,
        };

        let log_level = matches
            .value_of("log-level")
            .and_then(|level| level.parse().ok())
            .unwrap_or_else(|| LogLevel::from_verbosity(matches.occurrences_of("verbose")));

        Config {
            prompt: input.is_none() && !matches.is_present("no-prompt"),
            input,
            backend,
            dump_ast: matches.is_present("dump-ast"),
            log_level,
        }
    }
}
