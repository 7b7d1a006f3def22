use std::panic;

use log::error;

/// Pretty backtraces plus a log entry before the default hook runs.
///
/// A panic inside a rayon worker is an internal bug; the partial output
/// directory is left as-is and the process exits non-zero.
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        error!("Panic: {panic_info}");
        log::logger().flush();

        default_hook(panic_info);

        std::process::exit(1);
    }));
}
