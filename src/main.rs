mod accounts;
mod auth;
mod bank_feed;
mod broker;
mod catalog;
mod cli;
mod currencies;
mod db;
mod error;
mod fmt;
mod importer;
mod ledger;
mod logging;
mod models;
mod preferences;
mod reports;
mod settings;
mod web;

use clap::Parser;

use cli::{BrokerCommands, Cli, Commands, CurrenciesCommands, UsersCommands};

fn main() {
    logging::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Serve { bind } => cli::serve::run(bind),
        Commands::Users { command } => match command {
            UsersCommands::Add { username, password } => cli::users::add(&username, password),
            UsersCommands::List => cli::users::list(),
        },
        Commands::Import {
            file,
            user,
            preset,
            sheet,
            account,
            project,
            category,
        } => cli::import::run(cli::import::ImportArgs {
            file,
            user,
            preset,
            sheet,
            account,
            project,
            category,
        }),
        Commands::Currencies { command } => match command {
            CurrenciesCommands::List => cli::currencies::list(),
            CurrenciesCommands::Archive { code } => cli::currencies::archive(&code),
        },
        Commands::Dashboard { user, start, end } => cli::dashboard::run(&user, start, end),
        Commands::Status => cli::status::run(),
        Commands::Broker { command } => match command {
            BrokerCommands::Fetch => cli::broker::run_fetch(),
            BrokerCommands::Load => cli::broker::run_load(),
            BrokerCommands::Sync => cli::broker::run_sync(),
        },
        Commands::BankFeed { inbox, processed } => cli::bank_feed::run(inbox, processed),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
