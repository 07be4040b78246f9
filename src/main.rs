use std::path::Path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use polysort::{ExternalSorterBuilder, Strategy};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let variant: Variant = arg_parser.value_of_t_or_exit("variant");
    let dir: Option<&str> = arg_parser.value_of("dir");
    let memory = arg_parser.value_of("memory").expect("value is required");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));

    let input = arg_parser.value_of("input").expect("value is required");

    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_strategy(match variant {
            Variant::Natural => Strategy::Natural,
            Variant::ReplacementSelection => Strategy::ReplacementSelection,
            Variant::ParallelReplacementSelection => Strategy::ParallelReplacementSelection,
        })
        .with_memory_limit(
            memory.parse::<ByteSize>().expect("value is pre-validated").as_u64() as usize,
        );

    if let Some(threads) = threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }

    if let Some(dir) = dir {
        sorter_builder = sorter_builder.with_dir(Path::new(dir));
    }

    let sorter = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    match sorter.sort(Path::new(input)) {
        Ok(outcome) => {
            log::info!(
                "sorted data left in {} ({} initial runs, {} merge passes)",
                outcome.path.display(),
                outcome.initial_runs,
                outcome.passes,
            );
        }
        Err(err) => {
            log::error!("data sorting error: {}", err);
            process::exit(1);
        }
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Variant {
    Natural,
    ReplacementSelection,
    ParallelReplacementSelection,
}

impl Variant {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Variant::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Variant as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("polysort")
        .about("polyphase external sorter")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted")
                .takes_value(true)
                .default_value("input.txt"),
        )
        .arg(
            clap::Arg::new("variant")
                .short('s')
                .long("variant")
                .help("run generation and merge scheduling variant")
                .takes_value(true)
                .default_value("replacement-selection")
                .possible_values(Variant::possible_values()),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for parallel merging")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("dir")
                .short('d')
                .long("dir")
                .help("directory to be used to store bucket temp files")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("memory")
                .short('m')
                .long("memory")
                .help("phase-1 memory budget for replacement selection")
                .takes_value(true)
                .default_value("480MiB")
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Memory budget format incorrect: {}", err)),
                }),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
