use checker_cli::{cmd::Args, logger};
use clap::Parser;

#[tokio::main]
async fn main() {
    logger::init();
    let args = Args::parse();
    args.exec().await.unwrap_or_else(|e| {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    });
}
