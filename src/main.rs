use clap::{Parser, Subcommand};

use kryptax::cmd::{report::ReportCommand, transactions::TransactionsCommand};

#[derive(Parser, Debug)]
#[command(name = "kryptax", version, about = "German crypto tax calculation (§22/§23 EStG)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show classified transfers
    Transactions(TransactionsCommand),
    /// Calculate and display the yearly tax report
    Report(ReportCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Command::Transactions(cmd) => cmd.exec(),
        Command::Report(cmd) => cmd.exec(),
    }
}
