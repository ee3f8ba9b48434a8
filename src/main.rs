use clap::Parser;

mod agent;
mod authority;
mod cli;
mod commands;
mod error;
mod platform;
mod protection;
mod restriction;
mod schedule;

fn main() {
    let args = cli::Args::parse();

    if let Err(e) = commands::run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
