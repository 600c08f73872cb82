extern crate anyhow;
extern crate chrono;
extern crate chrono_tz;
extern crate flexi_logger;
extern crate getopts;
#[macro_use]
extern crate log;
extern crate reqwest;
#[macro_use]
extern crate serde_derive;

mod board;
mod clock;
mod config;
mod debug;
mod fetcher;
mod predictions;
mod result;
mod scheduler;
mod store;
mod structs;
mod timemath;

use anyhow::Context;

const DEFAULT_CONFIG: &str = "tracker.json";

fn start_logging(log_dir: Option<String>) -> result::TrackerResult<flexi_logger::LoggerHandle> {
    let logger = flexi_logger::Logger::try_with_env_or_str("info")
        .context("while parsing RUST_LOG")?;

    let logger = match log_dir {
        Some(dir) => logger
            .log_to_file(flexi_logger::FileSpec::default()
                         .directory(dir)
                         .basename("subwaytracker"))
            .rotate(flexi_logger::Criterion::Size(10 * 1024 * 1024),
                    flexi_logger::Naming::Numbers,
                    flexi_logger::Cleanup::KeepLogFiles(5))
            .duplicate_to_stderr(flexi_logger::Duplicate::Warn),
        None => logger.log_to_stderr(),
    };

    return Ok(logger.start().context("while starting logger")?);
}

fn print_board(store: &store::ResultStore, clock: &dyn clock::Clock, tz: chrono_tz::Tz) {
    let snapshot = store.latest();
    println!("{}", board::render_text(snapshot.as_deref(), &store.health(), clock.now(), tz));
}

fn run() -> result::TrackerResult<()> {
    let args: Vec<String> = std::env::args().collect();
    let mut opts = getopts::Options::new();
    opts.optopt("c", "config", "JSON config file (default tracker.json).", "FILE");
    opts.optflag("o", "one-shot", "poll once, print the board and exit");
    opts.optopt("p", "status-port", "Serve the status page on this port.", "PORT");
    opts.optopt("l", "log-dir", "Write rotated log files here.", "DIR");
    opts.optflag("h", "help", "print this help");

    let matches = opts.parse(&args[1..]).context("while parsing flags")?;
    if matches.opt_present("help") {
        print!("{}", opts.usage(&format!("Usage: {} [options]", args[0])));
        return Ok(());
    }

    let _logger = start_logging(matches.opt_str("log-dir"))?;

    let config_path = matches.opt_str("config").unwrap_or(DEFAULT_CONFIG.to_string());
    let config = config::Config::from_file(&config_path)
        .with_context(|| format!("while loading {}", config_path))?;
    let one_shot = matches.opt_present("one-shot");

    info!("Running. config={} one-shot={} directions={} ({}) / {} ({}) every {:?}",
          config_path, one_shot,
          config.directions[0].name, config.directions[0].stop,
          config.directions[1].name, config.directions[1].stop,
          config.poll_interval);

    let clock: std::sync::Arc<dyn clock::Clock> = std::sync::Arc::new(clock::SystemClock);
    let store = store::ResultStore::new();
    let scheduler = scheduler::PollScheduler::new(
        &config, fetcher::ArrivalFetcher::new(&config)?, store.clone(), clock.clone());

    if one_shot {
        match scheduler.poll_once() {
            None => return Err(result::make_error("a poll is already in flight")),
            Some(Err(err)) => return Err(err.into()),
            Some(Ok(_)) => {
                print_board(&store, clock.as_ref(), config.timezone);
                return Ok(());
            },
        }
    }

    if let Some(port) = matches.opt_str("status-port") {
        let server = debug::bind(&format!("0.0.0.0:{}", port), scheduler.clone(), config.timezone)?;
        std::thread::Builder::new()
            .name("status-server".to_string())
            .spawn(move || server.run())
            .context("while starting status server")?;
    }

    let updates = store.subscribe();
    scheduler.start();

    // Runs until the process is killed. Redraws on every publish, and at
    // least once per interval so countdowns and failure warnings stay
    // current. The store keeps the sender alive, so this never disconnects.
    loop {
        let _ = updates.recv_timeout(config.poll_interval);
        print_board(&store, clock.as_ref(), config.timezone);
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
