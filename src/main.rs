use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = machseg::cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .with_writer(std::io::stderr)
        .init();
    if let Err(err) = machseg::run(&args) {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}
