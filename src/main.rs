use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use msdwatch::{Settings, WatchService};

fn main() -> ExitCode {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("msdwatch: failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    msdwatch::logging::init_with_config(&settings.logging);

    if settings.watcher.paths.is_empty() {
        eprintln!("msdwatch: no watch paths configured; add [[watcher.paths]] to msdwatch.toml");
        return ExitCode::FAILURE;
    }

    let mut service = match WatchService::new(&settings) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("msdwatch: failed to start watching: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = service.start() {
        eprintln!("msdwatch: failed to start dispatcher: {e}");
        return ExitCode::FAILURE;
    }

    // Run until killed; emitters and the dispatcher do all the work.
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}
