use clap::Parser;
use warden_cli::{Cli, init_logging, run};

#[tokio::main]
async fn main() {
    init_logging();
    let code = run(Cli::parse()).await;
    std::process::exit(code);
}
