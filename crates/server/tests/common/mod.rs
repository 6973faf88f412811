//! Shared helpers for tests that run the `dirforge` binary.

#![allow(dead_code)]

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use reqwest::Client;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};

/// Find an available port
pub fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Config with only Royal Mail enabled; everything lives under `root`.
pub fn royal_mail_config(root: &Path, port: u16) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {port}

[database]
path = "{root}/dirforge.db"

[lifecycle]
lock_path = "{root}/dirforge.lock"
shutdown_grace_secs = 2

[providers.royal_mail]
download_dir = "{root}/downloads/RoyalMail"
working_dir = "{root}/work"
converter_path = "/opt/dirtools/convert"
converter_args = "--licence SECRET-KEY {{input}} {{output}}"
compiler_path = "/opt/dirtools/compile"
compiler_args = "--licence SECRET-KEY {{input}} {{output}}"
"#,
        port = port,
        root = root.display(),
    )
}

/// A running server process with its own scratch directory.
pub struct TestServer {
    pub port: u16,
    pub child: Child,
    pub config_path: PathBuf,
    pub temp_dir: TempDir,
}

impl TestServer {
    /// Write a config and start the binary, waiting until it answers.
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let port = get_available_port();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, royal_mail_config(temp_dir.path(), port))
            .expect("Failed to write config");

        let child = spawn_server(&config_path);
        let server = Self {
            port,
            child,
            config_path,
            temp_dir,
        };
        assert!(
            wait_for_server(port, 100).await,
            "Server did not start in time"
        );
        server
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.temp_dir.path().join("dirforge.lock")
    }

    pub async fn stop(mut self) {
        self.child.kill().await.ok();
    }
}

/// Spawn the server binary with the given config
pub fn spawn_server(config_path: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_dirforge"))
        .env("DIRFORGE_CONFIG", config_path)
        .env("RUST_LOG", "error") // Quiet logs during tests
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

/// Run the binary to completion, for configs expected to fail at start-up.
pub async fn run_to_exit(config_path: &Path) -> Output {
    timeout(
        Duration::from_secs(10),
        Command::new(env!("CARGO_BIN_EXE_dirforge"))
            .env("DIRFORGE_CONFIG", config_path)
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command")
}

/// Wait for server to be ready
pub async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}
