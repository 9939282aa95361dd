pub mod error;

pub use error::{Result, TorError};

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Upper bound for connecting and for each command round trip.
const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Tor needs a moment to build the new circuit before it is usable.
const DEFAULT_SETTLE: Duration = Duration::from_secs(5);

/// Client for the Tor control port. Each call opens its own connection, so
/// concurrent callers never share protocol state; Tor serializes the signals.
#[derive(Debug, Clone)]
pub struct TorController {
    addr: String,
    password: Option<String>,
    settle: Duration,
}

impl TorController {
    pub fn new(host: &str, port: u16, password: Option<&str>) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            password: password.map(String::from),
            settle: DEFAULT_SETTLE,
        }
    }

    /// Override the post-NEWNYM settle delay.
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Authenticate, send `SIGNAL NEWNYM`, then wait out the settle delay.
    pub async fn new_identity(&self) -> Result<()> {
        let stream = tokio::time::timeout(IO_TIMEOUT, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| TorError::Timeout)?
            .map_err(|e| TorError::Connect {
                addr: self.addr.clone(),
                message: e.to_string(),
            })?;

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        command(
            &mut reader,
            &mut write_half,
            &auth_command(self.password.as_deref()),
        )
        .await?;
        debug!(addr = %self.addr, "Authenticated with control port");

        command(&mut reader, &mut write_half, "SIGNAL NEWNYM").await?;
        // Best effort; Tor closes the connection on QUIT anyway.
        let _ = write_half.write_all(b"QUIT\r\n").await;

        info!(addr = %self.addr, settle_secs = self.settle.as_secs(), "Requested new Tor identity");
        tokio::time::sleep(self.settle).await;
        Ok(())
    }
}

fn auth_command(password: Option<&str>) -> String {
    match password {
        Some(p) if !p.is_empty() => format!("AUTHENTICATE \"{}\"", escape_quoted(p)),
        _ => "AUTHENTICATE".to_string(),
    }
}

fn escape_quoted(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Write one command line and consume its reply. Succeeds only on a final `250`.
async fn command<R, W>(reader: &mut R, writer: &mut W, line: &str) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_all(format!("{line}\r\n").as_bytes()).await?;
    writer.flush().await?;

    tokio::time::timeout(IO_TIMEOUT, read_reply(reader))
        .await
        .map_err(|_| TorError::Timeout)?
}

/// Reads reply lines until the final one (`NNN ` form). Mid-reply lines use
/// `NNN-` or `NNN+` and are skipped.
async fn read_reply<R>(reader: &mut R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = String::new();
    loop {
        buf.clear();
        if reader.read_line(&mut buf).await? == 0 {
            return Err(TorError::Closed);
        }
        let line = buf.trim_end_matches(['\r', '\n']);
        if line.len() < 4 || !line.is_char_boundary(3) {
            return Err(TorError::Protocol(line.to_string()));
        }
        let (code, rest) = line.split_at(3);
        let code: u16 = code
            .parse()
            .map_err(|_| TorError::Protocol(line.to_string()))?;
        if !rest.starts_with(' ') {
            continue;
        }
        if code == 250 {
            return Ok(());
        }
        return Err(TorError::Reply {
            code,
            message: rest.trim().to_string(),
        });
    }
}
