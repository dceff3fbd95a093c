use clap::{Parser, Subcommand};
use client::ServiceClient;
use log::info;
use shared::{NotificationKind, Request};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Send one request to a score service and print the reply")]
struct Args {
    /// Service address to connect to
    #[arg(short = 'a', long, default_value = "127.0.0.1:7000")]
    addr: String,

    /// Round-trip timeout in milliseconds
    #[arg(short = 't', long, default_value = "3000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Liveness probe
    Ping,
    /// Submit a score (persistence service)
    SaveScore { user_id: i64, score: i64 },
    /// Profile and best score for one user (broker)
    UserStats { user_id: i64 },
    /// Aggregate stats (broker)
    GlobalStats,
    /// Queue a notification (broker)
    Notify {
        user_id: i64,
        message: String,
        /// info, success, warning or error
        #[arg(short = 'k', long, default_value = "info", value_parser = parse_kind)]
        kind: NotificationKind,
    },
    /// Queued notifications, for one user or the most recent overall (broker)
    Notifications { user_id: Option<i64> },
}

fn parse_kind(raw: &str) -> Result<NotificationKind, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_lowercase()))
        .map_err(|_| format!("unknown notification kind '{}'", raw))
}

impl Command {
    fn into_request(self) -> Request {
        match self {
            Command::Ping => Request::Ping,
            Command::SaveScore { user_id, score } => Request::SaveScore { user_id, score },
            Command::UserStats { user_id } => Request::GetUserStats { user_id },
            Command::GlobalStats => Request::GetGlobalStats,
            Command::Notify {
                user_id,
                message,
                kind,
            } => Request::AddNotification {
                user_id,
                message,
                kind,
            },
            Command::Notifications { user_id } => Request::GetNotifications { user_id },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();
    let client = ServiceClient::new(args.addr).with_timeout(Duration::from_millis(args.timeout_ms));
    let request = args.command.into_request();

    info!("Sending {} to {}", request.action(), client.addr());
    let (ok, response) = client.round_trip(&request).await;

    match serde_json::to_string_pretty(&response) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to render response: {}", e),
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
