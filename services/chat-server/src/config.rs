//! Configuration surface (§4.7, §6). Plain env-var loading in the teacher's
//! `env::var(...).unwrap_or_else(|_| default)` style — no config file, no
//! hierarchy, just defaults overridable by environment.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub max_frame_bytes: usize,
    pub write_queue_depth: usize,
    pub register_queue_depth: usize,
    pub inbound_queue_depth: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ":8080".to_owned(),
            max_frame_bytes: 65536,
            write_queue_depth: 128,
            register_queue_depth: 256,
            inbound_queue_depth: 256,
            read_timeout: None,
            write_timeout: None,
            idle_timeout: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("CHAT_SERVER_ADDR") {
            cfg.listen_addr = v;
        }
        if let Some(v) = parse_env_usize("CHAT_SERVER_MAX_FRAME_BYTES") {
            cfg.max_frame_bytes = v;
        }
        if let Some(v) = parse_env_usize("CHAT_SERVER_WRITE_QUEUE_DEPTH") {
            cfg.write_queue_depth = v;
        }
        if let Some(v) = parse_env_usize("CHAT_SERVER_REGISTER_QUEUE_DEPTH") {
            cfg.register_queue_depth = v;
        }
        if let Some(v) = parse_env_usize("CHAT_SERVER_INBOUND_QUEUE_DEPTH") {
            cfg.inbound_queue_depth = v;
        }
        cfg.read_timeout = parse_env_secs("CHAT_SERVER_READ_TIMEOUT_SECS");
        cfg.write_timeout = parse_env_secs("CHAT_SERVER_WRITE_TIMEOUT_SECS");
        cfg.idle_timeout = parse_env_secs("CHAT_SERVER_IDLE_TIMEOUT_SECS");
        cfg
    }

    /// `CHAT_SERVER_ADDR`'s default (`:8080`) follows the wire spec's
    /// literal default but isn't a valid `std` bind address on its own.
    pub fn bind_addr(&self) -> String {
        if let Some(port) = self.listen_addr.strip_prefix(':') {
            format!("0.0.0.0:{port}")
        } else {
            self.listen_addr.clone()
        }
    }
}

fn parse_env_usize(key: &str) -> Option<usize> {
    match env::var(key) {
        Ok(v) => match v.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(key, value = %v, "ignoring unparseable env var, using default");
                None
            }
        },
        Err(_) => None,
    }
}

fn parse_env_secs(key: &str) -> Option<Duration> {
    let secs = parse_env_usize(key)?;
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs as u64))
    }
}
