use std::fs;
use std::io::{self, Write};
use std::process;

use bytesize::ByteSize;
use env_logger;
use log;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BATCH_SIZE: usize = 1 << 20;
const DAYS_IN_MONTH: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_millis()
        .init();

    let arg_parser = build_arg_parser();

    let output = arg_parser.value_of("output").expect("value is required");
    let size = arg_parser
        .value_of("size")
        .expect("value is required")
        .parse::<ByteSize>()
        .expect("value is pre-validated")
        .as_u64();
    let max_key: i64 = arg_parser.value_of_t_or_exit("max_key");
    let seed: Option<u64> = arg_parser
        .is_present("seed")
        .then(|| arg_parser.value_of_t_or_exit("seed"));

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    if let Err(err) = generate(output, size, max_key, &mut rng) {
        log::error!("data generation error: {}", err);
        process::exit(1);
    }

    log::info!("wrote about {} of keyed lines to {}", ByteSize(size), output);
}

fn generate(path: &str, target_bytes: u64, max_key: i64, rng: &mut StdRng) -> io::Result<()> {
    let mut out = fs::File::create(path)?;
    let mut written: u64 = 0;
    let mut buffer = String::with_capacity(BATCH_SIZE);

    while written < target_bytes {
        buffer.clear();
        while written + buffer.len() as u64 + 64 < target_bytes && buffer.len() + 64 < BATCH_SIZE {
            push_line(&mut buffer, max_key, rng);
        }
        if buffer.is_empty() {
            push_line(&mut buffer, max_key, rng);
        }
        out.write_all(buffer.as_bytes())?;
        written += buffer.len() as u64;
    }

    out.flush()
}

fn push_line(buffer: &mut String, max_key: i64, rng: &mut StdRng) {
    let key = rng.gen_range(0..=max_key);
    buffer.push_str(&key.to_string());
    buffer.push('-');

    let payload_len = rng.gen_range(1..=20);
    for _ in 0..payload_len {
        buffer.push(rng.gen_range(b'a'..=b'z') as char);
    }

    let year: u32 = rng.gen_range(2000..=2025);
    let month: usize = rng.gen_range(1..=12);
    let mut max_day = DAYS_IN_MONTH[month - 1];
    if month == 2 && is_leap(year) {
        max_day = 29;
    }
    let day = rng.gen_range(1..=max_day);
    buffer.push_str(&format!("-{:04}/{:02}/{:02}\n", year, month, day));
}

fn is_leap(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("datagen")
        .about("keyed line test-data generator")
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("file to generate")
                .takes_value(true)
                .default_value("input.txt"),
        )
        .arg(
            clap::Arg::new("size")
                .short('b')
                .long("size")
                .help("approximate output size")
                .takes_value(true)
                .default_value("1MiB")
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Size format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("max_key")
                .short('k')
                .long("max-key")
                .help("keys are drawn uniformly from 0..=max-key")
                .takes_value(true)
                .default_value("100"),
        )
        .arg(
            clap::Arg::new("seed")
                .short('s')
                .long("seed")
                .help("RNG seed for reproducible data")
                .takes_value(true),
        )
        .get_matches()
}
