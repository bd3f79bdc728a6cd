//! chat-client: line-oriented terminal front end.
//! Reads config, runs the session in the background, prints notifications to
//! stdout and takes slash commands from stdin.

use chat_client::chats::NewChat;
use chat_client::config;
use chat_client::{
    inbound_queue, Collaborators, ConnectionManager, ConnectionOptions, Cue, EventDispatcher,
    FriendStatus, MessageStore, TICK_INTERVAL,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
commands:
  /connect                  sign in and open the session
  /disconnect               close the session
  /open <chat_id>           make a chat the active one
  /close                    leave the active chat
  /msg <chat_id> <text>     send a message
  /me <chat_id> <text>      send an action
  /history <chat_id>        print the local transcript
  /chats                    list chats, most recent first
  /friends                  list friends and requests
  /add <username>           send a friend request
  /accept <username>        accept a friend request
  /new <username>           start a private chat
  /quit                     disconnect and exit";

fn resolve_config_path() -> PathBuf {
    // 1. --config <path> flag
    let args: Vec<String> = std::env::args().collect();
    if let Some(pos) = args.iter().position(|a| a == "--config") {
        if let Some(path) = args.get(pos + 1) {
            return PathBuf::from(path);
        }
    }
    // 2. CHAT_CLIENT_CONFIG env var
    if let Ok(val) = std::env::var("CHAT_CLIENT_CONFIG") {
        return PathBuf::from(val);
    }
    // 3. Default path (~/.chat-client/config.yaml)
    config::default_config_path().unwrap_or_else(|| {
        eprintln!("Error: unable to determine config path (set --config or CHAT_CLIENT_CONFIG)");
        process::exit(1);
    })
}

/// Prints notifications on stdout; cues only go to the log.
struct Terminal;

impl Collaborators for Terminal {
    fn notify(&mut self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{}", text);
        let _ = out.flush();
    }

    fn play_cue(&mut self, cue: Cue) {
        tracing::debug!(?cue, "cue");
    }

    fn on_friend_status_changed(&mut self, username: &str, status: FriendStatus) {
        tracing::debug!(%username, ?status, "friend status changed");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_client=info")),
        )
        .with_writer(io::stderr)
        .init();

    let config_path = resolve_config_path();

    let cfg = match config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: failed to load config from {}: {}", config_path.display(), e);
            process::exit(1);
        }
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to create runtime: {}", e);
            process::exit(1);
        });

    rt.block_on(async {
        let (inbound, queue) = inbound_queue();
        let connection = match ConnectionManager::start(ConnectionOptions::from_config(&cfg), inbound) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: failed to start session: {}", e);
                process::exit(1);
            }
        };

        let account = cfg.account.username.clone().unwrap_or_default();
        let mut dispatcher = EventDispatcher::new(queue, &account, Terminal)
            .with_connection(connection.clone())
            .with_preferences(cfg.notification_prefs());
        if cfg.save_messages_locally() {
            dispatcher = dispatcher.with_store(MessageStore::new(cfg.messages_folder(), &account));
        }

        if cfg.connection.auto_connect {
            connection.connect();
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    dispatcher.tick();
                }
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "stdin read failed");
                            break;
                        }
                    };
                    if !run_command(line.trim(), &connection, &mut dispatcher, &account).await {
                        break;
                    }
                }
            }
        }

        connection.shutdown().await;
        dispatcher.tick();
    });
    // A pending stdin read would otherwise hold the runtime open.
    rt.shutdown_timeout(Duration::from_millis(200));
}

/// Returns false when the user asked to quit.
async fn run_command(
    line: &str,
    connection: &ConnectionManager,
    dispatcher: &mut EventDispatcher<Terminal>,
    account: &str,
) -> bool {
    if line.is_empty() {
        return true;
    }
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match command {
        "/quit" => return false,
        "/connect" => connection.connect(),
        "/disconnect" => connection.disconnect(),
        "/open" if !rest.is_empty() => {
            dispatcher.set_active_chat(Some(rest));
            println!("Opened {}", dispatcher.catalog().display_name(rest, account));
        }
        "/close" => dispatcher.set_active_chat(None),
        "/msg" | "/me" => {
            let Some((chat_id, text)) = rest.split_once(' ') else {
                println!("usage: {} <chat_id> <text>", command);
                return true;
            };
            if let Err(e) = connection
                .send_message(chat_id, text.trim(), command == "/me")
                .await
            {
                println!("Error: {}", e);
            }
        }
        "/history" if !rest.is_empty() => match dispatcher.history(rest) {
            Ok(messages) if messages.is_empty() => println!("No messages"),
            Ok(messages) => {
                for m in messages {
                    if m.is_action {
                        println!("[{}] {} {}", m.timestamp_local, m.sender, m.text);
                    } else {
                        println!("[{}] {}: {}", m.timestamp_local, m.sender, m.text);
                    }
                }
            }
            Err(e) => println!("Error: {}", e),
        },
        "/chats" => {
            let chats = dispatcher.catalog().by_activity();
            if chats.is_empty() {
                println!("No chats");
            }
            for chat in chats {
                let unread = match chat.unread_count {
                    0 => String::new(),
                    n => format!(" ({} unread)", n),
                };
                println!("{}  {}{}", chat.chat_id, chat.display_name(account), unread);
            }
        }
        "/friends" => {
            let friends = dispatcher.friends();
            for friend in &friends.friends {
                let status = match friend.status {
                    FriendStatus::Online => "online",
                    FriendStatus::Offline => "offline",
                };
                println!("{} ({})", friend.username, status);
            }
            for name in &friends.pending_incoming {
                println!("{} (wants to be friends)", name);
            }
            for name in &friends.pending_outgoing {
                println!("{} (request sent)", name);
            }
        }
        "/add" if !rest.is_empty() => {
            if !connection.add_friend(rest) {
                println!("Not signed in");
            }
        }
        "/accept" if !rest.is_empty() => {
            if !connection.accept_friend(rest) {
                println!("Not signed in");
            }
        }
        "/new" if !rest.is_empty() => {
            if !connection.create_chat(NewChat::private(rest), account) {
                println!("Not signed in");
            }
        }
        _ => println!("{}", HELP),
    }
    true
}
