use std::collections::HashMap;
use std::env;
use std::error::Error;

use clap::{arg, ArgAction, ArgMatches, Command};
use server::config::{self, ConfigError, ServerConfig};

use super::{SERVER_DESCRIPTION, SERVER_SUBCOMMAND};

/// Command line options and the environment variables they override.
const OVERRIDES: [(&str, &str); 8] = [
    ("port", config::PORT_VAR),
    ("dir", config::VIDEOS_DIR_VAR),
    ("max-size", config::MAX_FILE_SIZE_VAR),
    ("naming", config::NAMING_VAR),
    ("git-dir", config::GIT_DIR_VAR),
    ("remote", config::GIT_REMOTE_VAR),
    ("branch", config::GIT_BRANCH_VAR),
    ("git-timeout", config::GIT_TIMEOUT_VAR),
];

pub fn command() -> Command {
    Command::new(SERVER_SUBCOMMAND)
        .about(SERVER_DESCRIPTION)
        .arg(arg!(-p --port <PORT>).help("Port to listen on"))
        .arg(arg!(-d --dir <DIR>).help("Directory uploaded videos are stored in"))
        .arg(arg!(--"max-size" <BYTES>).help("Largest accepted video in bytes"))
        .arg(
            arg!(--naming <POLICY>)
                .value_parser(["unique", "preserve"])
                .help("How stored files are named"),
        )
        .arg(
            arg!(--mirror)
                .action(ArgAction::SetTrue)
                .help("Commit and push every stored video to a git repository"),
        )
        .arg(arg!(--"git-dir" <DIR>).help("Working copy used by the git mirror"))
        .arg(arg!(--remote <REMOTE>).help("Remote the git mirror pushes to"))
        .arg(arg!(--branch <BRANCH>).help("Branch the git mirror pushes to"))
        .arg(arg!(--"git-timeout" <SECONDS>).help("Time limit for a single git command"))
}

pub async fn run(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let config = resolve(matches, |name| env::var(name).ok())?;
    server::run(config).await?;
    Ok(())
}

/// Options given on the command line win over the environment.
fn resolve<F>(matches: &ArgMatches, env: F) -> Result<ServerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut given: HashMap<&str, String> = OVERRIDES
        .iter()
        .filter_map(|(arg, var)| {
            matches
                .get_one::<String>(arg)
                .map(|value| (*var, value.clone()))
        })
        .collect();
    if matches.get_flag("mirror") {
        given.insert(config::MIRROR_VAR, "true".to_owned());
    }

    ServerConfig::from_lookup(|name: &str| given.get(name).cloned().or_else(|| env(name)))
}
