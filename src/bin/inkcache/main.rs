use anyhow::Result;
use clap::Parser;

mod cli;
mod cmd_clear;
mod cmd_pages;
mod cmd_status;

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Status { root, json } => cmd_status::exec(root, json),

        cli::Cmd::Pages { root, book, json } => cmd_pages::exec(root, book, json),

        cli::Cmd::Clear { root, book, all } => cmd_clear::exec(root, book, all),
    }
}
