use bugreport::{
    bugreport,
    collector::{CompileTimeInformation, EnvironmentVariables, OperatingSystem, SoftwareVersion},
    format::Markdown,
};
use server::config;

pub fn run() {
    bugreport!()
        .info(SoftwareVersion::default())
        .info(OperatingSystem::default())
        .info(EnvironmentVariables::list(&[
            "SHELL",
            "TERM",
            "RUST_LOG",
            config::PORT_VAR,
            config::FALLBACK_PORT_VAR,
            config::VIDEOS_DIR_VAR,
            config::MAX_FILE_SIZE_VAR,
            config::NAMING_VAR,
            config::MIRROR_VAR,
            config::GIT_DIR_VAR,
            config::GIT_REMOTE_VAR,
            config::GIT_BRANCH_VAR,
            config::GIT_TIMEOUT_VAR,
            config::MIRROR_SERIALIZE_VAR,
        ]))
        .info(CompileTimeInformation::default())
        .print::<Markdown>();
}
