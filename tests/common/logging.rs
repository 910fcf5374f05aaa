/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{io, sync::Once, thread};

use log::LevelFilter;

static LOGGER_INIT: Once = Once::new();

/// Print the crate's log lines at `level` and above to stdout, prefixed by the replica thread that
/// emitted them. Only the first call in a test binary takes effect.
pub(crate) fn setup_logger(level: LevelFilter) {
    LOGGER_INIT.call_once(|| {
        let _ = fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{:?} {:<5} {}: {}",
                    thread::current().id(),
                    record.level(),
                    record.target(),
                    message
                ))
            })
            .level(LevelFilter::Warn)
            .level_for("round_abci", level)
            .chain(io::stdout())
            .apply();
    })
}
