//! Newport XPS Motion Controller Driver
//!
//! Reference: XPS Unified Programmer's Manual (TCL/TCP command interface)
//!
//! Protocol Overview:
//! - Transport: TCP, port 5001
//! - Commands are function calls in ASCII, no terminator:
//!   `GroupMoveAbsolute(XY,60.000000,60.000000)`
//! - Output arguments are passed as type placeholders:
//!   `GroupPositionCurrentGet(XY,double *,double *)`
//! - Every reply has the form `<code>,<values...>,EndOfAPI`;
//!   code 0 means success, anything else is an XPS error code
//!
//! The goniometer is a motion group of two positioners (laser arm and detector
//! arm). Both positioners always receive the same absolute target, so the group
//! is exposed as a single-axis [`Movable`].
//!
//! # Example Usage
//!
//! ```no_run
//! use spr_daq::config::StageConfig;
//! use spr_daq::hardware::capabilities::Movable;
//! use spr_daq::hardware::xps::XpsDriver;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = StageConfig::default();
//!     let stage = XpsDriver::connect(&config).await?;
//!     stage.initialize(&config).await?;
//!
//!     stage.home().await?;
//!     stage.move_abs(45.0).await?;
//!     println!("Position: {:.3} deg", stage.position().await?);
//!     Ok(())
//! }
//! ```

use crate::config::StageConfig;
use crate::hardware::capabilities::Movable;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Reply terminator appended by the controller
const END_OF_API: &str = "EndOfAPI";

/// Connection timeout for the TCP socket
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Driver for a Newport XPS motion group
pub struct XpsDriver<T> {
    /// Command socket protected by Mutex for exclusive command/reply exchanges
    socket: Mutex<T>,
    /// Motion group name (e.g. "XY")
    group: String,
    /// Positioners of the group (e.g. "XY.X", "XY.Y")
    positioners: Vec<String>,
    /// Reply timeout; has to cover the longest blocking move
    timeout: Duration,
}

impl XpsDriver<TcpStream> {
    /// Open the command socket to the controller
    ///
    /// # Errors
    /// Returns error if the controller cannot be reached
    pub async fn connect(config: &StageConfig) -> Result<Self> {
        let address = format!("{}:{}", config.host, config.port);
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&address))
            .await
            .map_err(|_| anyhow!("Connection timeout to XPS at {}", address))?
            .with_context(|| format!("Failed to connect to XPS at {}", address))?;

        stream.set_nodelay(true)?;
        tracing::info!("Connected to XPS at {}", address);

        Ok(Self::with_transport(
            stream,
            &config.group,
            config.positioners.clone(),
            config.timeout(),
        ))
    }
}

impl<T> XpsDriver<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already-open command socket
    pub fn with_transport(
        transport: T,
        group: &str,
        positioners: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            socket: Mutex::new(transport),
            group: group.to_string(),
            positioners,
            timeout,
        }
    }

    /// Motion group name
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Login, reset the group and apply the configured motion profile
    ///
    /// Mirrors the controller's power-up procedure: the group is killed and
    /// re-initialized so it is in the NOT REFERENCED state, ready for homing.
    pub async fn initialize(&self, config: &StageConfig) -> Result<()> {
        self.login(&config.username, &config.password).await?;
        match self.firmware_version().await {
            Ok(version) => tracing::info!(firmware = %version, "XPS firmware"),
            Err(e) => tracing::debug!("XPS firmware query failed: {e:#}"),
        }
        self.kill_group().await?;
        self.initialize_group().await?;
        self.set_velocity(config.velocity, config.acceleration)
            .await
    }

    /// Authenticate the socket
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        self.execute(&format!("Login({},{})", username, password))
            .await
            .map(|_| ())
    }

    /// Controller firmware version
    pub async fn firmware_version(&self) -> Result<String> {
        let values = self.execute("FirmwareVersionGet(char *)").await?;
        Ok(values.join(","))
    }

    /// Kill the group (motors off, NOT INITIALIZED state)
    pub async fn kill_group(&self) -> Result<()> {
        self.execute(&format!("GroupKill({})", self.group))
            .await
            .map(|_| ())
    }

    /// Initialize the group (NOT REFERENCED state)
    pub async fn initialize_group(&self) -> Result<()> {
        self.execute(&format!("GroupInitialize({})", self.group))
            .await
            .map(|_| ())
    }

    /// Send a command and return the reply values following the status code
    ///
    /// A non-zero status code is turned into an error carrying the controller's
    /// description of the code when it can be retrieved.
    pub async fn execute(&self, command: &str) -> Result<Vec<String>> {
        let reply = self.exchange(command).await?;
        let (code, values) = parse_reply(&reply)?;
        if code == 0 {
            return Ok(values);
        }

        let description = match self.error_string(code).await {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("ErrorStringGet({code}) failed: {e:#}");
                "no description".to_string()
            }
        };
        bail!(
            "XPS command '{}' failed with code {}: {}",
            command,
            code,
            description
        )
    }

    /// Resolve an error code to text
    async fn error_string(&self, code: i32) -> Result<String> {
        let reply = self
            .exchange(&format!("ErrorStringGet({},char *)", code))
            .await?;
        let (status, values) = parse_reply(&reply)?;
        if status != 0 {
            bail!("ErrorStringGet returned code {}", status);
        }
        Ok(values.join(","))
    }

    /// Raw command/reply exchange
    async fn exchange(&self, command: &str) -> Result<String> {
        let mut socket = self.socket.lock().await;

        tracing::debug!(command, "XPS write");
        socket
            .write_all(command.as_bytes())
            .await
            .with_context(|| format!("XPS write failed for '{}'", command))?;

        let mut reply = Vec::new();
        let mut chunk = [0u8; 1024];
        timeout(self.timeout, async {
            loop {
                let read = socket.read(&mut chunk).await?;
                if read == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "XPS closed the connection",
                    ));
                }
                reply.extend_from_slice(&chunk[..read]);
                if reply
                    .windows(END_OF_API.len())
                    .any(|window| window == END_OF_API.as_bytes())
                {
                    return Ok(());
                }
            }
        })
        .await
        .map_err(|_| anyhow!("XPS reply timeout for '{}'", command))?
        .with_context(|| format!("XPS read failed for '{}'", command))?;

        let reply = String::from_utf8_lossy(&reply).into_owned();
        tracing::trace!(command, reply = %reply, "XPS reply");
        Ok(reply)
    }

    /// Read the S-Gamma profile of one positioner:
    /// (velocity, acceleration, minimum jerk time, maximum jerk time)
    async fn sgamma_parameters(&self, positioner: &str) -> Result<(f64, f64, f64, f64)> {
        let values = self
            .execute(&format!(
                "PositionerSGammaParametersGet({},double *,double *,double *,double *)",
                positioner
            ))
            .await?;
        let numbers = parse_numbers(&values)?;
        match numbers.as_slice() {
            [velocity, acceleration, min_jerk, max_jerk] => {
                Ok((*velocity, *acceleration, *min_jerk, *max_jerk))
            }
            _ => bail!(
                "Expected 4 S-Gamma parameters for {}, got {:?}",
                positioner,
                values
            ),
        }
    }
}

/// Split a reply into its status code and value fields
///
/// `"0,12.5,12.5,EndOfAPI"` → `(0, ["12.5", "12.5"])`
pub fn parse_reply(reply: &str) -> Result<(i32, Vec<String>)> {
    let body = reply.trim();
    let body = body
        .strip_suffix(END_OF_API)
        .ok_or_else(|| anyhow!("XPS reply missing {}: '{}'", END_OF_API, body))?;
    let body = body.strip_suffix(',').unwrap_or(body);

    let mut fields = body.split(',');
    let code = fields
        .next()
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .ok_or_else(|| anyhow!("XPS reply has no status code: '{}'", reply.trim()))?
        .parse::<i32>()
        .with_context(|| format!("Invalid XPS status code in '{}'", reply.trim()))?;
    let values = fields.map(|field| field.trim().to_string()).collect();
    Ok((code, values))
}

fn parse_numbers(values: &[String]) -> Result<Vec<f64>> {
    values
        .iter()
        .map(|value| {
            value
                .parse::<f64>()
                .with_context(|| format!("Invalid numeric XPS value '{}'", value))
        })
        .collect()
}

#[async_trait]
impl<T> Movable for XpsDriver<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn move_abs(&self, position: f64) -> Result<()> {
        // One target per positioner of the group
        let targets = vec![format!("{:.6}", position); self.positioners.len()].join(",");
        self.execute(&format!("GroupMoveAbsolute({},{})", self.group, targets))
            .await
            .map(|_| ())
    }

    async fn home(&self) -> Result<()> {
        tracing::info!(group = %self.group, "XPS home search");
        self.execute(&format!("GroupHomeSearch({})", self.group))
            .await
            .map(|_| ())
    }

    async fn set_velocity(&self, velocity: f64, acceleration: f64) -> Result<()> {
        for positioner in &self.positioners {
            let (_, _, min_jerk, max_jerk) = self.sgamma_parameters(positioner).await?;
            self.execute(&format!(
                "PositionerSGammaParametersSet({},{},{},{},{})",
                positioner, velocity, acceleration, min_jerk, max_jerk
            ))
            .await?;
            tracing::debug!(positioner = %positioner, velocity, acceleration, "XPS velocity set");
        }
        Ok(())
    }

    async fn position(&self) -> Result<f64> {
        let placeholders = vec!["double *"; self.positioners.len()].join(",");
        let values = self
            .execute(&format!(
                "GroupPositionCurrentGet({},{})",
                self.group, placeholders
            ))
            .await?;
        parse_numbers(&values)?
            .first()
            .copied()
            .ok_or_else(|| anyhow!("XPS returned no position for group {}", self.group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock_transport::{MockTransport, TransportLog};

    fn driver(script: Vec<(&str, Option<&str>)>) -> (XpsDriver<MockTransport>, TransportLog) {
        let (socket, log) = MockTransport::scripted(script);
        let driver = XpsDriver::with_transport(
            socket,
            "XY",
            vec!["XY.X".to_string(), "XY.Y".to_string()],
            Duration::from_millis(100),
        );
        (driver, log)
    }

    #[test]
    fn test_parse_reply() {
        assert_eq!(parse_reply("0,EndOfAPI").unwrap(), (0, vec![]));
        assert_eq!(
            parse_reply("0,12.5,-3.25,EndOfAPI").unwrap(),
            (0, vec!["12.5".to_string(), "-3.25".to_string()])
        );
        assert_eq!(parse_reply("-17,EndOfAPI\r\n").unwrap().0, -17);

        assert!(parse_reply("0,12.5").is_err());
        assert!(parse_reply("EndOfAPI").is_err());
        assert!(parse_reply("OK,EndOfAPI").is_err());
    }

    #[tokio::test]
    async fn test_move_targets_every_positioner() {
        let (stage, log) = driver(vec![(
            "GroupMoveAbsolute(XY,60.000000,60.000000)",
            Some("0,EndOfAPI"),
        )]);

        stage.move_abs(60.0).await.unwrap();
        assert_eq!(log.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_position_reads_first_positioner() {
        let (stage, _log) = driver(vec![(
            "GroupPositionCurrentGet(XY,double *,double *)",
            Some("0,44.5,44.5,EndOfAPI"),
        )]);

        assert_eq!(stage.position().await.unwrap(), 44.5);
    }

    #[tokio::test]
    async fn test_error_code_is_described() {
        let (stage, _log) = driver(vec![
            ("GroupHomeSearch(XY)", Some("-22,EndOfAPI")),
            (
                "ErrorStringGet(-22,char *)",
                Some("0,Not allowed action,EndOfAPI"),
            ),
        ]);

        let err = stage.home().await.unwrap_err().to_string();
        assert!(err.contains("code -22"), "{err}");
        assert!(err.contains("Not allowed action"), "{err}");
    }

    #[tokio::test]
    async fn test_set_velocity_keeps_jerk_times() {
        let (stage, log) = driver(vec![
            (
                "PositionerSGammaParametersGet(XY.X,double *,double *,double *,double *)",
                Some("0,20,80,0.005,0.05,EndOfAPI"),
            ),
            ("PositionerSGammaParametersSet(XY.X,5,4,0.005,0.05)", Some("0,EndOfAPI")),
            (
                "PositionerSGammaParametersGet(XY.Y,double *,double *,double *,double *)",
                Some("0,20,80,0.01,0.04,EndOfAPI"),
            ),
            ("PositionerSGammaParametersSet(XY.Y,5,4,0.01,0.04)", Some("0,EndOfAPI")),
        ]);

        stage.set_velocity(5.0, 4.0).await.unwrap();
        assert_eq!(log.count_prefix("PositionerSGammaParametersSet"), 2);
    }

    #[tokio::test]
    async fn test_initialize_sequence() {
        let (stage, log) = driver(vec![
            ("Login(Administrator,Administrator)", Some("0,EndOfAPI")),
            ("FirmwareVersionGet(char *)", Some("0,XPS-C8 Firmware V2.6.x,EndOfAPI")),
            ("GroupKill(XY)", Some("0,EndOfAPI")),
            ("GroupInitialize(XY)", Some("0,EndOfAPI")),
            (
                "PositionerSGammaParametersGet(XY.X,double *,double *,double *,double *)",
                Some("0,20,80,0.005,0.05,EndOfAPI"),
            ),
            ("PositionerSGammaParametersSet(XY.X,5,4,0.005,0.05)", Some("0,EndOfAPI")),
            (
                "PositionerSGammaParametersGet(XY.Y,double *,double *,double *,double *)",
                Some("0,20,80,0.005,0.05,EndOfAPI"),
            ),
            ("PositionerSGammaParametersSet(XY.Y,5,4,0.005,0.05)", Some("0,EndOfAPI")),
        ]);

        stage.initialize(&StageConfig::default()).await.unwrap();
        assert_eq!(log.commands().len(), 8);
        assert_eq!(log.commands()[2], "GroupKill(XY)");
    }

    #[tokio::test]
    async fn test_reply_timeout() {
        let (stage, _log) = driver(vec![("GroupHomeSearch(XY)", None)]);

        let err = stage.home().await.unwrap_err().to_string();
        assert!(err.contains("reply timeout"), "{err}");
    }
}
