use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Sandbox {
    home: TempDir,
    data: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            home: tempfile::tempdir().unwrap(),
            data: tempfile::tempdir().unwrap(),
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("kopilka").unwrap();
        cmd.env("HOME", self.home.path())
            .env("KOPILKA_DATA_DIR", self.data.path())
            .env("NO_COLOR", "1")
            .env("RUST_LOG", "warn");
        cmd
    }
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("kopilka")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("bank-feed"))
        .stdout(predicate::str::contains("broker"));
}

#[test]
fn test_status_without_database() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Database not found"));
}

#[test]
fn test_init_add_user_and_list() {
    let sandbox = Sandbox::new();
    sandbox.cmd().arg("init").assert().success();
    sandbox
        .cmd()
        .args(["users", "add", "marina", "--password", "long-enough"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added user: marina"));
    sandbox
        .cmd()
        .args(["users", "add", "MARINA", "--password", "long-enough"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
    sandbox
        .cmd()
        .args(["users", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("marina"));
}

#[test]
fn test_import_csv_then_dashboard() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["users", "add", "oleg", "--password", "long-enough"])
        .assert()
        .success();

    let file = sandbox.data.path().join("statement.csv");
    std::fs::write(
        &file,
        "Дата;Сумма;Категория\n01.03.2025;-350,00;Кафе\n02.03.2025;12000;Зарплата\n",
    )
    .unwrap();

    sandbox
        .cmd()
        .args(["import", file.to_str().unwrap(), "--user", "oleg", "--account", "Кошелек"])
        .args(["--project", "Личные финансы"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 transactions created"));

    sandbox
        .cmd()
        .args(["dashboard", "--user", "oleg", "--start", "2025-03-01", "--end", "2025-03-31"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Кошелек"))
        .stdout(predicate::str::contains("Кафе"));
}

#[test]
fn test_bank_feed_with_empty_inbox_is_skipped() {
    let sandbox = Sandbox::new();
    let inbox = sandbox.data.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();
    sandbox
        .cmd()
        .args(["bank-feed", "--inbox", inbox.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("No new files"));
}

#[test]
fn test_unknown_user_fails() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["dashboard", "--user", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}
