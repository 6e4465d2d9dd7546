//! Front-end bridge (component F).
//!
//! Grounded in the prototype's `ui.py` `UIProcessor`: `send`/`receive`
//! delegate straight to the session, and received bytes are shown as UTF-8
//! text when valid, falling back to hex. No TUI/GUI front end is built here
//! (out of scope) — `Status` is the surface a CLI or any future front end
//! renders.

use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::errors::Result;
use crate::logging::LogSink;
use crate::session::SessionKey;
use crate::transceiver::Transceiver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Idle,
    SendingText,
    SendingFile(String),
    Receiving,
    IdleAfter(&'static str),
}

/// What a successful [`FrontEnd::receive`] produced, so the caller can
/// render it without re-deciding the UTF-8-or-hex fallback itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedData {
    Text(String),
    Binary(Vec<u8>),
}

impl ReceivedData {
    pub fn from_bytes(data: Vec<u8>) -> Self {
        match String::from_utf8(data) {
            Ok(text) => ReceivedData::Text(text),
            Err(err) => ReceivedData::Binary(err.into_bytes()),
        }
    }

    /// Hex-rendered form of binary data, mirroring `bytes.hex()`.
    pub fn as_display(&self) -> String {
        match self {
            ReceivedData::Text(text) => text.clone(),
            ReceivedData::Binary(bytes) => bytes.iter().map(|b| format!("{b:02x}")).collect(),
        }
    }
}

/// Owns an established session and exposes the four operations a front end
/// needs, tracking `status` the way `UIProcessor`'s status label does.
pub struct FrontEnd {
    transceiver: Transceiver,
    key: SessionKey,
    config: Config,
    log: LogSink,
    pub status: Status,
}

impl FrontEnd {
    pub fn new(transceiver: Transceiver, key: SessionKey, config: Config, log: LogSink) -> Self {
        Self { transceiver, key, config, log, status: Status::Idle }
    }

    pub fn send_text(&mut self, text: &str) -> Result<()> {
        self.status = Status::SendingText;
        self.log.info("bridge", "sending text message");
        crate::session::send(&mut self.transceiver, &mut self.key, text.as_bytes())?;
        self.status = Status::IdleAfter("text sent");
        Ok(())
    }

    pub fn send_file(&mut self, path: &Path) -> Result<()> {
        let display = path.display().to_string();
        self.status = Status::SendingFile(display.clone());
        self.log.info("bridge", &format!("sending file: {display}"));
        let data = fs::read(path)?;
        crate::session::send(&mut self.transceiver, &mut self.key, &data)?;
        self.status = Status::IdleAfter("file sent");
        Ok(())
    }

    pub fn receive(&mut self) -> Result<ReceivedData> {
        self.status = Status::Receiving;
        self.log.info("bridge", "receiving input");
        let data = crate::session::receive(&mut self.transceiver, &self.key, &self.config)?;
        let received = ReceivedData::from_bytes(data);
        self.status = match &received {
            ReceivedData::Text(_) => Status::IdleAfter("text received"),
            ReceivedData::Binary(_) => Status::IdleAfter("binary received"),
        };
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_utf8_renders_as_text() {
        let received = ReceivedData::from_bytes(b"hello".to_vec());
        assert_eq!(received, ReceivedData::Text("hello".into()));
    }

    #[test]
    fn invalid_utf8_renders_as_hex() {
        let received = ReceivedData::from_bytes(vec![0xff, 0x00]);
        assert_eq!(received.as_display(), "ff00");
    }
}
