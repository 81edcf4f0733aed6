mod cli;
mod commands;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::CommandError;
use output::print_error;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        print_error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}

fn run() -> Result<(), CommandError> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Transpile(args) => commands::transpile(&cli, args),
        Commands::CreateView(args) => commands::create_view(&cli, args),
        Commands::CreateTable(args) => commands::create_table(&cli, args),
        Commands::Validate(args) => commands::validate(&cli, args),
    }
}
