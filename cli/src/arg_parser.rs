use clap::{Parser, Subcommand};

/// Trigger deploys and follow their logs on a deployd server
#[derive(Debug, Parser)]
#[command(name = "deployctl", version)]
pub struct ArgParser {
    /// Base URL of the server
    #[arg(short = 'u', long, env = "DEPLOY_URL", default_value = "http://127.0.0.1:8080")]
    pub url: String,
    /// Deploy token, needed only to trigger
    #[arg(long, env = "DEPLOY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    /// The sub-command to use
    #[command(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum SubCommand {
    /// start a deploy
    Trigger {
        /// ip or alias of the target server
        #[arg(long)]
        server: Option<String>,
        /// follow the new job's log until it finishes
        #[arg(short, long)]
        follow: bool,
    },
    /// list job logs, most recent first
    List,
    /// print a job log
    Show { log_file: String },
    /// show whether a job is still running
    Info { log_file: String },
    /// stream a job log until the job finishes
    Follow { log_file: String },
    /// list inventory servers
    Servers,
    /// resolve and ping a host from the server
    Diagnose { host: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trigger_with_follow() {
        let args = ArgParser::try_parse_from([
            "deployctl",
            "--url",
            "http://deploy:8080",
            "--token",
            "t",
            "trigger",
            "--server",
            "web-1",
            "-f",
        ])
        .unwrap();
        assert_eq!(args.url, "http://deploy:8080");
        assert_eq!(args.token.as_deref(), Some("t"));
        assert_eq!(
            args.sub_command,
            SubCommand::Trigger {
                server: Some("web-1".into()),
                follow: true
            }
        );
    }

    #[test]
    fn log_commands_take_a_file_name() {
        let args =
            ArgParser::try_parse_from(["deployctl", "follow", "trigger-20240131-093000.log"])
                .unwrap();
        assert_eq!(
            args.sub_command,
            SubCommand::Follow {
                log_file: "trigger-20240131-093000.log".into()
            }
        );
        assert!(ArgParser::try_parse_from(["deployctl", "show"]).is_err());
    }
}
