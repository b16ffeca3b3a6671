use std::io::{self, BufWriter};

use troff2pdf::{run, Settings};

fn main() {
    let mut level = log::LevelFilter::Error;
    let mut unknown = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-d" => level = log::LevelFilter::Debug,
            "-w" => {
                if level != log::LevelFilter::Debug {
                    level = log::LevelFilter::Warn;
                }
            }
            _ => unknown.push(arg),
        }
    }
    // flags pick the default level; RUST_LOG still wins when set
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
    for arg in unknown {
        log::warn!("unknown flag `{}` ignored", arg);
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let output = BufWriter::new(stdout.lock());
    if let Err(err) = run(stdin.lock(), output, Settings::default()) {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}
