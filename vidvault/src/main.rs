use std::error::Error;
use std::process::ExitCode;

use clap::{command, crate_name, Command};

mod cli;

fn build_cli() -> Command {
    command!(crate_name!())
        .version(clap::crate_version!())
        .about(clap::crate_description!())
        .subcommand(Command::new(cli::VERSION_SUBCOMMAND).about(cli::VERSION_DESCRIPTION))
        .subcommand(Command::new(cli::BUGREPORT_SUBCOMMAND).about(cli::BUGREPORT_DESCRIPTION))
        .subcommand(cli::server::command())
        .subcommand(cli::client::upload_command())
        .subcommand(cli::client::list_command())
        .arg_required_else_help(true)
        .disable_version_flag(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = build_cli().get_matches();

    let result: Result<(), Box<dyn Error>> = match cli.subcommand() {
        Some((cli::VERSION_SUBCOMMAND, _)) => {
            cli::version::run();
            Ok(())
        }
        Some((cli::BUGREPORT_SUBCOMMAND, _)) => {
            cli::bugreport::run();
            Ok(())
        }
        Some((cli::SERVER_SUBCOMMAND, matches)) => cli::server::run(matches).await,
        Some((cli::UPLOAD_SUBCOMMAND, matches)) => {
            cli::client::upload(matches).await.map_err(Into::into)
        }
        Some((cli::LIST_SUBCOMMAND, matches)) => {
            cli::client::list(matches).await.map_err(Into::into)
        }
        _ => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
