use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn feedbridge(state: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("feedbridge").unwrap();
    cmd.env("FEEDBRIDGE_STORAGE__PATH", state.join("state.db"))
        .env("XDG_CONFIG_HOME", state)
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn prints_version() {
    Command::cargo_bin("feedbridge")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    Command::cargo_bin("feedbridge")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("feedbridge").and(predicate::str::contains("--version")));
}

#[test]
fn unknown_command_fails() {
    let dir = tempdir().unwrap();
    feedbridge(dir.path())
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown command 'frobnicate'"));
}

#[test]
fn subscriptions_persist_between_runs() {
    let dir = tempdir().unwrap();

    feedbridge(dir.path())
        .args(["add", "mmb", "42", "key", "session", "secret"])
        .assert()
        .success()
        .stdout("added Facebook user 42 as mmb\n");

    feedbridge(dir.path())
        .args(["ignore", "add", "app", "mmb", "Mafia", "Wars"])
        .assert()
        .success()
        .stdout("Ignored app Mafia Wars for Facebook user mmb\n");

    feedbridge(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(
            predicate::str::starts_with("1 known Facebook users\nmmb: user_id = 42")
                .and(predicate::str::contains("secret").not()),
        );

    feedbridge(dir.path())
        .args(["url", "mmb"])
        .assert()
        .success()
        .stdout(predicate::str::contains("method=stream.get").and(predicate::str::contains("sig=")));

    feedbridge(dir.path())
        .args(["delete", "mmb"])
        .assert()
        .success();

    feedbridge(dir.path())
        .args(["delete", "mmb"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Facebook user 'mmb' not found"));
}

#[test]
fn flag_like_words_after_the_command_are_arguments() {
    let dir = tempdir().unwrap();

    feedbridge(dir.path())
        .args(["add", "mmb", "42", "key", "session", "secret"])
        .assert()
        .success();

    feedbridge(dir.path())
        .args(["ignore", "add", "friend", "mmb", "-h"])
        .assert()
        .success()
        .stdout("Ignored friend -h for Facebook user mmb\n");

    feedbridge(dir.path())
        .args(["ignore", "list", "friend", "mmb"])
        .assert()
        .success()
        .stdout("mmb is ignoring friends: -h\n");
}
