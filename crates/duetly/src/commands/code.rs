//! `duetly send`: submit code text and print the controller's reply.

use serde::Serialize;

use duetly_core::Connector;

use crate::cli::{GlobalOpts, SendArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct CodeResult {
    code: String,
    reply: Option<String>,
}

pub async fn handle(args: SendArgs, connector: &Connector, global: &GlobalOpts) -> Result<(), CliError> {
    let code = args.code.join(" ");
    let reply = connector.send_code(&code, !args.no_wait).await?;

    let result = CodeResult {
        code,
        reply: reply.map(|r| r.trim_end().to_owned()),
    };
    let out = output::render_single(
        &global.output,
        &result,
        |r| r.reply.clone().unwrap_or_default(),
        |r| r.reply.clone().unwrap_or_default(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
