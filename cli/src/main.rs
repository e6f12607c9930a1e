mod arg_parser;
mod client_cli;
mod sse;

use arg_parser::{ArgParser, SubCommand};
use client_cli::{ClientCli, FollowOutcome};

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = ArgParser::parse();
    let client = ClientCli::new(&args.url, args.token);

    match args.sub_command {
        SubCommand::Trigger { server, follow } => {
            let started = client.trigger(server.as_deref()).await?;
            if follow {
                return follow_job(&client, &started.log_file).await;
            }
        }
        SubCommand::List => client.list().await?,
        SubCommand::Show { log_file } => client.show(&log_file).await?,
        SubCommand::Info { log_file } => client.info(&log_file).await?,
        SubCommand::Follow { log_file } => return follow_job(&client, &log_file).await,
        SubCommand::Servers => client.servers().await?,
        SubCommand::Diagnose { host } => client.diagnose(&host).await?,
    }

    Ok(ExitCode::SUCCESS)
}

/// Exit with the deploy's own status when the log recorded one.
async fn follow_job(client: &ClientCli, log_file: &str) -> Result<ExitCode> {
    match client.follow(log_file).await? {
        FollowOutcome::Complete(code) => {
            eprintln!("Deploy complete");
            Ok(match code {
                Some(0) | None => ExitCode::SUCCESS,
                Some(code) => {
                    eprintln!("deploy script exited with status {code}");
                    ExitCode::from(u8::try_from(code).unwrap_or(1))
                }
            })
        }
        FollowOutcome::Failed(message) => {
            eprintln!("error: {message}");
            Ok(ExitCode::FAILURE)
        }
    }
}
