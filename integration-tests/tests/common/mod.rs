use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;
use tempfile::TempDir;

/// Find a free TCP port by binding to port 0
pub fn find_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to port 0");
    listener.local_addr().unwrap().port()
}

/// Wait for a TCP port to accept connections
pub async fn wait_for_port(port: u16, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if tokio::time::Instant::now() > deadline {
            panic!("Timed out waiting for port {} to be ready", port);
        }
        if tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port))
            .await
            .is_ok()
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Get the path to a compiled binary in the target directory
fn cargo_bin(name: &str) -> PathBuf {
    // Look for the binary in target/debug (standard cargo test location)
    let mut path = std::env::current_exe()
        .expect("Failed to get current exe")
        .parent()
        .expect("No parent")
        .parent()
        .expect("No grandparent")
        .to_path_buf();
    path.push(name);
    if path.exists() {
        return path;
    }

    // Fallback: try target/debug directly
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop(); // integration-tests -> workspace root
    path.push("target");
    path.push("debug");
    path.push(name);
    if path.exists() {
        return path;
    }

    panic!(
        "Binary '{}' not found. Run `cargo build --workspace` first.",
        name
    );
}

/// A control plane process on an ephemeral port with a throwaway database
pub struct TestControl {
    pub port: u16,
    process: Child,
    db_path: PathBuf,
    _temp_dir: TempDir,
}

impl TestControl {
    pub async fn new() -> Self {
        let port = find_free_port();
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("control.db");

        let process = spawn_control(port, &db_path);
        wait_for_port(port, Duration::from_secs(10)).await;

        Self {
            port,
            process,
            db_path,
            _temp_dir: temp_dir,
        }
    }

    /// URL of an API endpoint, e.g. `api_url("server")`
    pub fn api_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}/api/v1/{}", self.port, path)
    }

    /// Restart the control plane (same DB path, new port)
    pub async fn restart(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();

        let port = find_free_port();
        self.process = spawn_control(port, &self.db_path);
        wait_for_port(port, Duration::from_secs(10)).await;
        self.port = port;
    }
}

fn spawn_control(port: u16, db_path: &PathBuf) -> Child {
    Command::new(cargo_bin("flotilla-control"))
        .args(["--bind", &format!("127.0.0.1:{}", port)])
        .args(["--db-path", db_path.to_str().unwrap()])
        .args(["--machine-id", "1"])
        .args(["--log-level", "debug"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .expect("Failed to start control plane")
}

impl Drop for TestControl {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

/// An agent process wired to a control plane, with scratch state on disk
pub struct TestAgent {
    pub port: u16,
    process: Child,
    _temp_dir: TempDir,
}

impl TestAgent {
    pub async fn new(control_url: &str) -> Self {
        let port = find_free_port();
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let process = Command::new(cargo_bin("flotilla-agent"))
            .args(["--bind", &format!("127.0.0.1:{}", port)])
            .args(["--control-plane", control_url])
            .args([
                "--db-path",
                temp_dir.path().join("agent.db").to_str().unwrap(),
            ])
            .args([
                "--compose-dir",
                temp_dir.path().join("compose").to_str().unwrap(),
            ])
            .args([
                "--script-dir",
                temp_dir.path().join("scripts").to_str().unwrap(),
            ])
            .args(["--log-level", "debug"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .expect("Failed to start agent");

        wait_for_port(port, Duration::from_secs(10)).await;

        Self {
            port,
            process,
            _temp_dir: temp_dir,
        }
    }
}

impl Drop for TestAgent {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

/// Response envelope every endpoint replies with
#[derive(Debug, serde::Deserialize)]
pub struct Envelope {
    pub code: u32,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

pub async fn api_get(client: &reqwest::Client, url: &str) -> Envelope {
    client
        .get(url)
        .send()
        .await
        .expect("GET request failed")
        .json()
        .await
        .expect("Response is not an envelope")
}

pub async fn api_post(client: &reqwest::Client, url: &str, body: serde_json::Value) -> Envelope {
    client
        .post(url)
        .json(&body)
        .send()
        .await
        .expect("POST request failed")
        .json()
        .await
        .expect("Response is not an envelope")
}

pub async fn api_put(client: &reqwest::Client, url: &str, body: serde_json::Value) -> Envelope {
    client
        .put(url)
        .json(&body)
        .send()
        .await
        .expect("PUT request failed")
        .json()
        .await
        .expect("Response is not an envelope")
}

pub async fn api_delete(client: &reqwest::Client, url: &str) -> Envelope {
    client
        .delete(url)
        .send()
        .await
        .expect("DELETE request failed")
        .json()
        .await
        .expect("Response is not an envelope")
}
