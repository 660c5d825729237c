//! Chat command grammar
//!
//! ```text
//! !help
//! !server list
//! !server start  <name> [ttl]
//! !server new    <name> [type] [ttl]
//! !server extend <name> <ttl>
//! !server prune  <name> <ttl>
//! !server stop   <name>
//! !server reboot <name>
//! !server type   <name> <type>
//! ```
//!
//! Keywords are case-insensitive. Messages not starting with `!` are not
//! commands.

use crate::auth::{Caller, Operation};
use crate::control::ControlPlane;
use crate::error::Result;
use thiserror::Error;

pub const HELP_TEXT: &str = "\
Commands:
  !help                                 show this help
  !server list                          list running and terminated servers
  !server start <name> [ttl]            start a terminated server from its snapshot
  !server new <name> [type] [ttl]       create a server from the blueprint
  !server extend <name> <ttl>           extend the ttl of a server
  !server prune <name> <ttl>            shorten the ttl of a server
  !server stop <name>                   snapshot and delete a server
  !server reboot <name>                 reboot a server
  !server type <name> <type>            change the type used by the next start
TTLs look like 2h, 45m or 1h30m and may not exceed 12h.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    List,
    Start {
        name: String,
        ttl: Option<String>,
    },
    New {
        name: String,
        server_type: Option<String>,
        ttl: Option<String>,
    },
    Extend {
        name: String,
        ttl: String,
    },
    Prune {
        name: String,
        ttl: String,
    },
    Stop {
        name: String,
    },
    Reboot {
        name: String,
    },
    Type {
        name: String,
        server_type: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}', try !help")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

impl Command {
    /// Parse a chat message; `Ok(None)` if it is not a command
    pub fn parse(text: &str) -> std::result::Result<Option<Command>, CommandError> {
        let text = text.trim();
        if !text.starts_with('!') {
            return Ok(None);
        }

        let mut words = text.split_whitespace();
        let head = words.next().unwrap_or_default().to_lowercase();
        let args: Vec<String> = words.map(str::to_string).collect();

        let command = match head.as_str() {
            "!help" => Command::Help,
            "!server" => parse_server(&args)?,
            _ => return Err(CommandError::Unknown(head)),
        };
        Ok(Some(command))
    }

    pub fn operation(&self) -> Operation {
        match self {
            Command::Help => Operation::Help,
            Command::List => Operation::List,
            Command::Start { .. } => Operation::Start,
            Command::New { .. } => Operation::Create,
            Command::Extend { .. } => Operation::Extend,
            Command::Prune { .. } => Operation::Prune,
            Command::Stop { .. } => Operation::Stop,
            Command::Reboot { .. } => Operation::Reboot,
            Command::Type { .. } => Operation::Retype,
        }
    }
}

fn parse_server(args: &[String]) -> std::result::Result<Command, CommandError> {
    let Some((sub, rest)) = args.split_first() else {
        return Err(CommandError::Usage(
            "!server list|start|new|extend|prune|stop|reboot|type ...",
        ));
    };
    let sub = sub.to_lowercase();

    let command = match (sub.as_str(), rest) {
        ("list", []) => Command::List,
        ("list", _) => return Err(CommandError::Usage("!server list")),

        ("start", [name]) => Command::Start {
            name: name.clone(),
            ttl: None,
        },
        ("start", [name, ttl]) => Command::Start {
            name: name.clone(),
            ttl: Some(ttl.clone()),
        },
        ("start", _) => return Err(CommandError::Usage("!server start <name> [ttl]")),

        ("new", [name]) => Command::New {
            name: name.clone(),
            server_type: None,
            ttl: None,
        },
        ("new", [name, server_type]) => Command::New {
            name: name.clone(),
            server_type: Some(server_type.clone()),
            ttl: None,
        },
        ("new", [name, server_type, ttl]) => Command::New {
            name: name.clone(),
            server_type: Some(server_type.clone()),
            ttl: Some(ttl.clone()),
        },
        ("new", _) => return Err(CommandError::Usage("!server new <name> [type] [ttl]")),

        ("extend", [name, ttl]) => Command::Extend {
            name: name.clone(),
            ttl: ttl.clone(),
        },
        ("extend", _) => return Err(CommandError::Usage("!server extend <name> <ttl>")),

        ("prune", [name, ttl]) => Command::Prune {
            name: name.clone(),
            ttl: ttl.clone(),
        },
        ("prune", _) => return Err(CommandError::Usage("!server prune <name> <ttl>")),

        ("stop", [name]) => Command::Stop { name: name.clone() },
        ("stop", _) => return Err(CommandError::Usage("!server stop <name>")),

        ("reboot", [name]) => Command::Reboot { name: name.clone() },
        ("reboot", _) => return Err(CommandError::Usage("!server reboot <name>")),

        ("type", [name, server_type]) => Command::Type {
            name: name.clone(),
            server_type: server_type.clone(),
        },
        ("type", _) => return Err(CommandError::Usage("!server type <name> <type>")),

        (other, _) => return Err(CommandError::Unknown(format!("!server {}", other))),
    };
    Ok(command)
}

/// Authorize and run a parsed command, returning the reply text
pub async fn dispatch(control: &ControlPlane, caller: &Caller, command: Command) -> Result<String> {
    caller.authorize(command.operation())?;
    tracing::info!("{} runs {:?}", caller.subject, command);

    let config = control.config();
    let reply = match command {
        Command::Help => HELP_TEXT.to_string(),
        Command::List => {
            let views = control.list_managed().await?;
            if views.is_empty() {
                "No servers.".to_string()
            } else {
                views
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Command::Start { name, ttl } => {
            let ttl = ttl.unwrap_or_else(|| config.default_ttl.clone());
            let server = control.restart(&name, &ttl).await?;
            format!(
                "Server {} started with DNS {}. It will run for {}",
                name,
                address(&server),
                ttl
            )
        }
        Command::New {
            name,
            server_type,
            ttl,
        } => {
            let server_type = server_type.unwrap_or_else(|| config.default_server_type.clone());
            let ttl = ttl.unwrap_or_else(|| config.default_ttl.clone());
            let server = control.create_new(&name, &server_type, &ttl).await?;
            format!(
                "Created new server {} ({}) with DNS {}. It will run for {}",
                name,
                server_type,
                address(&server),
                ttl
            )
        }
        Command::Extend { name, ttl } => {
            let until = control.extend(&name, &ttl).await?;
            format!("Server {} has been extended until {}", name, until.to_rfc3339())
        }
        Command::Prune { name, ttl } => {
            let until = control.prune(&name, &ttl).await?;
            format!("Server {} has been pruned to {}", name, until.to_rfc3339())
        }
        Command::Stop { name } => {
            let done = control.terminate(&name).await?;
            format!(
                "Server {} has been terminated (snapshot {})",
                name, done.snapshot_id
            )
        }
        Command::Reboot { name } => {
            control.reboot(&name).await?;
            format!("Server {} has been rebooted", name)
        }
        Command::Type { name, server_type } => {
            control.retype(&name, &server_type).await?;
            format!("Server {} will start as {} next time", name, server_type)
        }
    };
    Ok(reply)
}

/// Reply to a chat message; `None` if the message is not a command
///
/// Errors become reply text.
pub async fn handle_message(control: &ControlPlane, caller: &Caller, text: &str) -> Option<String> {
    let command = match Command::parse(text) {
        Ok(Some(command)) => command,
        Ok(None) => return None,
        Err(e) => return Some(e.to_string()),
    };

    match dispatch(control, caller, command).await {
        Ok(reply) => Some(reply),
        Err(e) => {
            tracing::warn!("Command '{}' from {} failed: {}", text.trim(), caller.subject, e);
            Some(format!("Sorry, I can't do that: {}", e))
        }
    }
}

fn address(server: &ttlfleet_cloud::Server) -> String {
    server
        .public_net
        .ipv4_dns_ptr
        .clone()
        .or_else(|| server.public_net.ipv4.map(|ip| ip.to_string()))
        .unwrap_or_else(|| "(none)".to_string())
}
