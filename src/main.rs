/// Openloop - open-loop replay of workload traces against prediction services.
use clap::Parser;
use openloop::cli::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
