pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "copurchase",
    about = "Product association operator CLI",
    long_about = "Apply migrations, manage calculation settings, run the association pipeline for a channel, and query recommendations.",
    after_help = "Examples:\n  copurchase migrate\n  copurchase calculate --channel web\n  copurchase recommend --channel web --product tee --product cap"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo order corpus anchored at the current time")]
    Seed,
    #[command(about = "Show stored calculation settings and the last recorded run")]
    Settings {
        #[arg(long, help = "Create the settings record from configured defaults if absent")]
        init: bool,
    },
    #[command(about = "Recompute and replace the association set for one channel")]
    Calculate {
        #[arg(long, help = "Channel whose completed orders are mined")]
        channel: String,
    },
    #[command(about = "Query recommendations for one product or, with several, for a cart")]
    Recommend {
        #[arg(long, help = "Channel to read associations from")]
        channel: String,
        #[arg(long = "product", required = true, help = "Product id; repeat for a cart")]
        products: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Settings { init } => commands::settings::run(init),
        Command::Calculate { channel } => commands::calculate::run(&channel),
        Command::Recommend { channel, products } => commands::recommend::run(&channel, &products),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
