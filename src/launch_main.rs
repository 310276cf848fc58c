//! cmdshim-launch: the binary every rendered stub hands over to
//!
//! Exits with the delegated command's exit code, or dies by the same signal. Launcher
//! failures use shell conventions: 127 runtime not found, 126 cannot execute, 1
//! installation not found, 2 bad usage.

use cmdshim_launcher::{init_logging, run_launcher};

fn main() {
    init_logging();
    match run_launcher() {
        Ok(termination) => termination.reproduce(),
        Err(err) => {
            eprintln!("cmdshim: {err}");
            std::process::exit(err.exit_code());
        }
    }
}
