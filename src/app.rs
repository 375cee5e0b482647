use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::api;
use crate::bridge::{Bridge, BridgeError, Sink};
use crate::config;
use crate::data::RestStreamService;
use crate::poller::Poller;
use crate::storage;
use crate::subscription::IgnoreKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add {
        nick: String,
        user_id: String,
        api_key: String,
        session_key: String,
        session_secret: String,
    },
    Delete(String),
    List,
    Url(String),
    Update,
    Ignore(IgnoreCommand),
    Poll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreCommand {
    Add {
        kind: IgnoreKind,
        nick: String,
        name: String,
    },
    Delete {
        kind: IgnoreKind,
        nick: String,
        name: String,
    },
    List {
        kind: IgnoreKind,
        nick: String,
    },
}

/// Parses one command line already split into words. Names given to
/// `ignore add|delete` may span several words.
pub fn parse_command<S: AsRef<str>>(args: &[S]) -> Result<Command, BridgeError> {
    let args = args.iter().map(AsRef::as_ref).collect::<Vec<&str>>();
    let arg = |idx: usize, name: &'static str| -> Result<String, BridgeError> {
        args.get(idx)
            .map(|value| value.to_string())
            .ok_or(BridgeError::MissingArgument(name))
    };

    let Some(&command) = args.first() else {
        return Err(BridgeError::MissingArgument("command"));
    };

    match command {
        "add" => Ok(Command::Add {
            nick: arg(1, "nick")?,
            user_id: arg(2, "user_id")?,
            api_key: arg(3, "api_key")?,
            session_key: arg(4, "session_key")?,
            session_secret: arg(5, "session_secret")?,
        }),
        "delete" => Ok(Command::Delete(arg(1, "nick")?)),
        "list" => Ok(Command::List),
        "url" => Ok(Command::Url(arg(1, "nick")?)),
        "update" => Ok(Command::Update),
        "poll" => Ok(Command::Poll),
        "ignore" => {
            let action = arg(1, "ignore action")?;
            let kind: IgnoreKind = arg(2, "ignore kind")?.parse()?;
            let nick = arg(3, "nick")?;
            let name = args.get(4..).unwrap_or_default().join(" ");
            match action.as_str() {
                "add" | "delete" if name.trim().is_empty() => {
                    Err(BridgeError::MissingArgument("name"))
                }
                "add" => Ok(Command::Ignore(IgnoreCommand::Add { kind, nick, name })),
                "delete" => Ok(Command::Ignore(IgnoreCommand::Delete { kind, nick, name })),
                "list" => Ok(Command::Ignore(IgnoreCommand::List { kind, nick })),
                other => Err(BridgeError::UnknownCommand(format!("ignore {other}"))),
            }
        }
        other => Err(BridgeError::UnknownCommand(other.to_string())),
    }
}

/// Runs a command that does not need the poller, returning reply lines.
pub fn execute(bridge: &mut Bridge, command: Command, sink: &mut dyn Sink) -> Result<Vec<String>> {
    let replies = match command {
        Command::Add {
            nick,
            user_id,
            api_key,
            session_key,
            session_secret,
        } => vec![bridge.add(&nick, &user_id, &api_key, &session_key, &session_secret)?],
        Command::Delete(nick) => vec![bridge.delete(&nick)?],
        Command::List => bridge.list(),
        Command::Url(nick) => vec![bridge.url(&nick)?],
        Command::Update => {
            let report = bridge.update(sink);
            report
                .failed
                .into_iter()
                .map(|(nick, error)| format!("update failed for {nick}: {error}"))
                .collect()
        }
        Command::Ignore(IgnoreCommand::Add { kind, nick, name }) => {
            vec![bridge.ignore_add(&nick, kind, &name)?]
        }
        Command::Ignore(IgnoreCommand::Delete { kind, nick, name }) => {
            vec![bridge.ignore_delete(&nick, kind, &name)?]
        }
        Command::Ignore(IgnoreCommand::List { kind, nick }) => {
            vec![bridge.ignore_list(&nick, kind)?]
        }
        Command::Poll => return Err(BridgeError::UnknownCommand("nested poll".into()).into()),
    };
    Ok(replies)
}

/// Writes notification lines to stdout as they are produced.
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn send(&mut self, line: String) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

pub fn run(args: Vec<String>) -> Result<()> {
    let command = parse_command(args.as_slice())?;

    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let store = Arc::new(
        storage::Store::open(storage::Options {
            path: cfg.storage.path.clone(),
        })
        .context("open storage")?,
    );

    let client = Arc::new(api::Client::new(cfg.client_config()).context("build api client")?);
    let service = Arc::new(RestStreamService::new(client));
    let mut bridge = Bridge::new(service, cfg.bridge_config());
    let loaded = bridge.load(&store).context("load subscriptions")?;
    debug!(count = loaded, "state restored");

    if command == Command::Poll {
        return poll(bridge, store, cfg.poll.interval);
    }

    let replies = execute(&mut bridge, command, &mut StdoutSink)?;
    for reply in replies {
        println!("{reply}");
    }
    bridge.save(&store).context("save subscriptions")?;
    Ok(())
}

/// Polls in the background while reading commands from stdin, until stdin
/// closes or `quit` is entered.
fn poll(bridge: Bridge, store: Arc<storage::Store>, interval: std::time::Duration) -> Result<()> {
    let bridge = Arc::new(Mutex::new(bridge));
    let poller = Poller::spawn(
        bridge.clone(),
        store.clone(),
        interval,
        Box::new(StdoutSink),
    );

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("read command")?;
        let words = line.split_whitespace().collect::<Vec<_>>();
        match words.first() {
            None => continue,
            Some(&"quit") => break,
            Some(_) => {}
        }

        let outcome = parse_command(words.as_slice())
            .map_err(anyhow::Error::from)
            .and_then(|command| {
                let mut bridge = bridge.lock();
                let replies = execute(&mut bridge, command, &mut StdoutSink)?;
                bridge.save(&store)?;
                Ok(replies)
            });
        match outcome {
            Ok(replies) => replies.iter().for_each(|reply| println!("{reply}")),
            Err(err) => println!("error: {err:#}"),
        }
    }

    info!("stopping poller");
    poller.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeConfig;
    use crate::data::MockStreamService;

    #[test]
    fn parses_add_and_simple_commands() {
        assert_eq!(
            parse_command(&["add", "mmb", "42", "key", "sess", "secret"]).unwrap(),
            Command::Add {
                nick: "mmb".into(),
                user_id: "42".into(),
                api_key: "key".into(),
                session_key: "sess".into(),
                session_secret: "secret".into(),
            }
        );
        assert_eq!(parse_command(&["list"]).unwrap(), Command::List);
        assert_eq!(parse_command(&["update"]).unwrap(), Command::Update);
        assert_eq!(
            parse_command(&["url", "mmb"]).unwrap(),
            Command::Url("mmb".into())
        );
    }

    #[test]
    fn missing_arguments_are_named() {
        assert!(matches!(
            parse_command(&["add", "mmb", "42"]),
            Err(BridgeError::MissingArgument("api_key"))
        ));
        assert!(matches!(
            parse_command::<&str>(&[]),
            Err(BridgeError::MissingArgument("command"))
        ));
        assert!(matches!(
            parse_command(&["ignore", "add", "friend", "mmb"]),
            Err(BridgeError::MissingArgument("name"))
        ));
    }

    #[test]
    fn ignore_names_may_span_words() {
        assert_eq!(
            parse_command(&["ignore", "add", "apps", "mmb", "Mafia", "Wars"]).unwrap(),
            Command::Ignore(IgnoreCommand::Add {
                kind: IgnoreKind::App,
                nick: "mmb".into(),
                name: "Mafia Wars".into(),
            })
        );
        assert_eq!(
            parse_command(&["ignore", "list", "friend", "mmb"]).unwrap(),
            Command::Ignore(IgnoreCommand::List {
                kind: IgnoreKind::Friend,
                nick: "mmb".into(),
            })
        );
    }

    #[test]
    fn rejects_unknown_words() {
        assert!(matches!(
            parse_command(&["frobnicate"]),
            Err(BridgeError::UnknownCommand(_))
        ));
        assert!(matches!(
            parse_command(&["ignore", "add", "group", "mmb", "x"]),
            Err(BridgeError::InvalidIgnoreKind(_))
        ));
        assert!(matches!(
            parse_command(&["ignore", "purge", "app", "mmb"]),
            Err(BridgeError::UnknownCommand(_))
        ));
    }

    #[test]
    fn execute_reports_replies_and_failures() {
        let mut bridge = Bridge::new(Arc::new(MockStreamService::new()), BridgeConfig::default());
        let mut lines: Vec<String> = Vec::new();

        let replies = execute(
            &mut bridge,
            parse_command(&["add", "mmb", "42", "key", "sess", "secret"]).unwrap(),
            &mut lines,
        )
        .unwrap();
        assert_eq!(replies, vec!["added Facebook user 42 as mmb"]);

        // the mock has no stream for viewer 42
        let replies = execute(&mut bridge, Command::Update, &mut lines).unwrap();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].starts_with("update failed for mmb: "));
        assert!(lines.is_empty());

        let err = execute(&mut bridge, Command::Delete("nobody".into()), &mut lines).unwrap_err();
        assert_eq!(err.to_string(), "Facebook user 'nobody' not found");
    }
}
