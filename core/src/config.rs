/// Configuration management
use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listening address for client connections
    pub listen_addr: SocketAddr,

    /// Data directory for the sled stores (defaults to `.chatlink/hub-<port>`)
    pub data_dir: Option<PathBuf>,

    /// How long a connection may take to present its credential
    pub handshake_timeout: Duration,

    /// Upper bound on a single inbound frame
    pub max_frame_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7000".parse().unwrap(),
            data_dir: None,
            handshake_timeout: Duration::from_secs(5),
            max_frame_bytes: 256 * 1024,
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 2 {
            return Err(ChatError::Config(format!(
                "Usage: {} <port> [--data-dir <path>]",
                args.first().unwrap_or(&"chatlink".to_string())
            )));
        }

        let port = args[1]
            .parse::<u16>()
            .map_err(|_| ChatError::Config("Port must be a valid number (0-65535)".to_string()))?;

        let listen_addr = format!("0.0.0.0:{}", port)
            .parse()
            .map_err(|_| ChatError::Config("Invalid listen address".to_string()))?;

        let mut data_dir: Option<PathBuf> = None;

        let mut i = 2;
        while i < args.len() {
            match args[i].as_str() {
                "--data-dir" => {
                    let path = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--data-dir requires a path argument".to_string())
                    })?;
                    data_dir = Some(PathBuf::from(path));
                    i += 2;
                }
                other => {
                    return Err(ChatError::Config(format!("Unknown argument: {}", other)));
                }
            }
        }

        // Env override (nice for scripts)
        if let Ok(dir) = std::env::var("CHATLINK_DATA_DIR") {
            data_dir = Some(PathBuf::from(dir));
        }

        Ok(Self {
            listen_addr,
            data_dir,
            ..Default::default()
        })
    }

    /// Resolve the effective data directory.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            PathBuf::from(".chatlink").join(format!("hub-{}", self.listen_addr.port()))
        })
    }
}
