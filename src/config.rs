//! Application configuration
//!
//! Loaded from TOML. Every section and field has a default, so an empty
//! file (or no file at all) yields the stock localhost setup on ports
//! 5000/5001.

use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use crate::audio::AudioFormat;
use crate::constants::*;
use crate::error::{Error, NetworkError, Result};
use crate::protocol::TextFraming;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub audio: AudioConfig,
}

/// Relay server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address both listeners bind to
    pub host: String,
    pub audio_port: u16,
    pub text_port: u16,
    /// Pending-connection backlog per listener
    pub backlog: i32,
    /// Maximum bytes taken from an audio socket per read
    pub frame_bytes: usize,
    /// Maximum bytes taken from a raw-framed text socket per read
    pub text_buffer: usize,
    pub text_framing: TextFraming,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            audio_port: DEFAULT_AUDIO_PORT,
            text_port: DEFAULT_TEXT_PORT,
            backlog: DEFAULT_BACKLOG,
            frame_bytes: DEFAULT_FRAME_BYTES,
            text_buffer: DEFAULT_TEXT_BUFFER,
            text_framing: TextFraming::default(),
        }
    }
}

impl ServerConfig {
    pub fn audio_addr(&self) -> Result<SocketAddr> {
        resolve(&self.host, self.audio_port)
    }

    pub fn text_addr(&self) -> Result<SocketAddr> {
        resolve(&self.host, self.text_port)
    }
}

/// Participant settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host to connect to
    pub host: String,
    pub audio_port: u16,
    pub text_port: u16,
    pub frame_bytes: usize,
    pub text_buffer: usize,
    pub text_framing: TextFraming,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            audio_port: DEFAULT_AUDIO_PORT,
            text_port: DEFAULT_TEXT_PORT,
            frame_bytes: DEFAULT_FRAME_BYTES,
            text_buffer: DEFAULT_TEXT_BUFFER,
            text_framing: TextFraming::default(),
        }
    }
}

impl ClientConfig {
    pub fn audio_addr(&self) -> Result<SocketAddr> {
        resolve(&self.host, self.audio_port)
    }

    pub fn text_addr(&self) -> Result<SocketAddr> {
        resolve(&self.host, self.text_port)
    }
}

/// PCM stream and device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames_per_buffer: u32,
    /// Output device name; empty selects the default device
    pub output_device: String,
    /// Input device name; empty selects the default device
    pub input_device: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            frames_per_buffer: DEFAULT_FRAMES_PER_BUFFER,
            output_device: String::new(),
            input_device: String::new(),
        }
    }
}

impl AudioConfig {
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            frames_per_buffer: self.frames_per_buffer,
        }
    }
}

impl AppConfig {
    /// Platform config file location
    ///
    /// - Linux: `~/.config/synconnect/config.toml`
    /// - macOS: `~/Library/Application Support/synconnect/config.toml`
    /// - Windows: `%APPDATA%\synconnect\config\config.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "synconnect")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the platform default is
    /// read when present and defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject values the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        if s.frame_bytes == 0 || s.text_buffer == 0 {
            return Err(Error::Config("server buffers must be non-zero".into()));
        }
        if s.audio_port == s.text_port && s.audio_port != 0 {
            return Err(Error::Config(format!(
                "audio and text channels share port {}",
                s.audio_port
            )));
        }
        if s.backlog <= 0 {
            return Err(Error::Config("backlog must be positive".into()));
        }

        let c = &self.client;
        if c.frame_bytes == 0 || c.text_buffer == 0 {
            return Err(Error::Config("client buffers must be non-zero".into()));
        }

        let a = &self.audio;
        if a.sample_rate == 0 || a.channels == 0 || a.frames_per_buffer == 0 {
            return Err(Error::Config(
                "sample_rate, channels and frames_per_buffer must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| NetworkError::InvalidAddress(format!("{}:{}: {}", host, port, e)))?
        .next()
        .ok_or_else(|| NetworkError::InvalidAddress(format!("{}:{}", host, port)).into())
}
