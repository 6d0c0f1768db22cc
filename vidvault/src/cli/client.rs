use std::path::PathBuf;

use clap::{arg, ArgAction, ArgMatches, Command};
use client::{ClientError, UploadParams};

use super::{LIST_DESCRIPTION, LIST_SUBCOMMAND, UPLOAD_DESCRIPTION, UPLOAD_SUBCOMMAND};

pub fn upload_command() -> Command {
    Command::new(UPLOAD_SUBCOMMAND)
        .about(UPLOAD_DESCRIPTION)
        .arg(arg!(-u --uri <URI>).required(true).help("Server URI, e.g. http://localhost:3000"))
        .arg(
            arg!(-f --file <FILE>)
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Path to the video file to upload"),
        )
        .arg(
            arg!(--legacy)
                .action(ArgAction::SetTrue)
                .help("Use POST /upload instead of POST /api/upload"),
        )
}

pub fn list_command() -> Command {
    Command::new(LIST_SUBCOMMAND)
        .about(LIST_DESCRIPTION)
        .arg(arg!(-u --uri <URI>).required(true).help("Server URI, e.g. http://localhost:3000"))
}

pub async fn upload(matches: &ArgMatches) -> Result<(), ClientError> {
    let params = UploadParams {
        uri: matches.get_one::<String>("uri").cloned().unwrap_or_default(),
        file: matches.get_one::<PathBuf>("file").cloned().unwrap_or_default(),
        legacy: matches.get_flag("legacy"),
    };
    let uploaded = client::upload_video(&params).await?;
    println!("{}", client::upload_table(&uploaded));
    Ok(())
}

pub async fn list(matches: &ArgMatches) -> Result<(), ClientError> {
    let uri = matches.get_one::<String>("uri").cloned().unwrap_or_default();
    let videos = client::list_videos(&uri).await?;
    println!("{}", client::videos_table(&videos));
    Ok(())
}
