//! Command handlers. Everything except `config` and `completions` runs
//! against a live connector.

pub mod code;
pub mod config_cmd;
pub mod files;
pub mod status;
pub mod util;
pub mod watch;

use duetly_core::{Connector, CoreError, ErrorClass};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Run one command against a connected controller.
pub async fn dispatch(
    cmd: Command,
    connector: &Connector,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Status => status::handle(connector, global),
        Command::Watch(args) => watch::handle(args, connector, global).await,
        Command::Send(args) => code::handle(args, connector, global).await,
        Command::Upload(args) => files::upload(args, connector, global).await,
        Command::Download(args) => files::download(args, connector, global).await,
        Command::Ls(args) => files::list(args, connector, global).await,
        Command::Info(args) => files::info(args, connector, global).await,
        Command::Rm(args) => files::remove(args, connector, global).await,
        Command::Mv(args) => files::rename(args, connector, global).await,
        Command::Mkdir(args) => files::mkdir(args, connector, global).await,
        // Handled in main before a connector exists.
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}

/// Log in, mapping network failures to a connection error for the URL.
pub async fn connect(connector: &Connector) -> Result<(), CliError> {
    connector.connect().await.map_err(|err| match err {
        CoreError::Api(source) if source.class() == ErrorClass::Network => {
            CliError::ConnectionFailed {
                url: connector.config().url.to_string(),
                source,
            }
        }
        other => other.into(),
    })
}
