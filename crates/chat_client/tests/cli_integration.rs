//! Integration tests for the chat-client binary.
//! Uses assert_cmd to run the binary against a real temp config. Commands come
//! from stdin; end of input quits after a final tick, so queued notifications
//! are always printed before exit.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write as _;

/// Write a YAML config pointing at a port nothing listens on.
fn write_config(dir: &tempfile::TempDir, auto_connect: bool, with_credentials: bool) -> std::path::PathBuf {
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let path = dir.path().join("config.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "account:\n  server_url: http://127.0.0.1:{}", port).unwrap();
    if with_credentials {
        writeln!(f, "  username: amy\n  password: secret").unwrap();
    }
    writeln!(
        f,
        "connection:\n  auto_connect: {}\n  reconnect_attempts: 0\nstorage:\n  messages_folder: {}",
        auto_connect,
        dir.path().join("messages").display()
    )
    .unwrap();
    path
}

#[test]
fn missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::from(cargo_bin_cmd!("chat-client"));
    cmd.arg("--config")
        .arg(dir.path().join("nope.yaml"))
        .write_stdin("/quit\n");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn auto_connect_without_credentials_asks_for_them() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, true, false);

    let mut cmd = Command::from(cargo_bin_cmd!("chat-client"));
    cmd.arg("--config").arg(&config_path).write_stdin("/quit\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Configure credentials"));
}

#[test]
fn config_from_env_var() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, false, false);

    let mut cmd = Command::from(cargo_bin_cmd!("chat-client"));
    cmd.env("CHAT_CLIENT_CONFIG", &config_path)
        .write_stdin("/connect\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Configure credentials"));
}

#[test]
fn sending_while_offline_reports_not_connected() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, false, true);

    let mut cmd = Command::from(cargo_bin_cmd!("chat-client"));
    cmd.arg("--config")
        .arg(&config_path)
        .write_stdin("/msg c1 hello\n/chats\n/add bob\n/quit\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Error: not connected"))
        .stdout(predicate::str::contains("No chats"))
        .stdout(predicate::str::contains("Not signed in"));
}

#[test]
fn unknown_command_prints_help() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, false, false);

    let mut cmd = Command::from(cargo_bin_cmd!("chat-client"));
    cmd.arg("--config").arg(&config_path).write_stdin("/help\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("/msg <chat_id> <text>"))
        .stdout(predicate::str::contains("/quit"));
}

#[test]
fn history_reads_local_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, false, true);
    let store = chat_client::MessageStore::new(dir.path().join("messages"), "amy");
    store.append("c1", "bob", "from earlier", false).unwrap();

    let mut cmd = Command::from(cargo_bin_cmd!("chat-client"));
    cmd.arg("--config").arg(&config_path).write_stdin("/history c1\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("bob: from earlier"));
}
