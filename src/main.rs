use clap::Parser;
use qpg::cli::{self, Cli};
use qpg::observability::init_logging_with_level;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging_with_level(cli.verbose, cli.quiet) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let exit_code = cli::run(cli).await;
    std::process::exit(exit_code.as_i32());
}
