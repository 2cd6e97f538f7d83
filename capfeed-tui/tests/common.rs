#![allow(dead_code)]
use assert_cmd::Command;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::thread;
use tempfile::TempDir;

pub struct TestEnv {
    _dir: TempDir,
    pub cfg: PathBuf,
    pub state: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = dir.path().join("config");
        let state = dir.path().join("state");
        std::fs::create_dir_all(&cfg).expect("cfg dir");
        Self {
            _dir: dir,
            cfg,
            state,
        }
    }

    pub fn bin(&self) -> Command {
        let mut cmd = Command::cargo_bin("capfeed").unwrap();
        cmd.env("XDG_CONFIG_HOME", &self.cfg)
            .env("XDG_STATE_HOME", &self.state)
            .env_remove("CAPFEED_SERVER")
            .env_remove("CAPFEED_LOG");
        cmd
    }

    pub fn write_settings(&self, toml: &str) {
        let dir = self.cfg.join("capfeed");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("settings.toml"), toml).unwrap();
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves fixed JSON bodies by exact path; everything else is a 404.
pub fn stub_server(routes: Vec<(&'static str, String)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let _ = respond(stream, &routes);
        }
    });
    format!("http://{addr}")
}

fn respond(mut stream: TcpStream, routes: &[(&'static str, String)]) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" {
            break;
        }
    }
    let target = request_line.split_whitespace().nth(1).unwrap_or("/");
    let path = target.split('?').next().unwrap_or("/");
    let (status, body) = match routes.iter().find(|(p, _)| *p == path) {
        Some((_, b)) => ("200 OK", b.clone()),
        None => ("404 Not Found", r#"{"detail":"Not Found"}"#.to_string()),
    };
    write!(
        stream,
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )?;
    stream.flush()
}
