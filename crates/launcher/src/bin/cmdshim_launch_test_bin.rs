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
