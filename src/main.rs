use clap::Parser;
use pairtrain::cli::{self, command::Cli};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let code = cli::run(Cli::parse()).await;
    std::process::exit(code);
}
