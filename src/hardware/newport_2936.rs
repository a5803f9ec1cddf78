//! Newport 2936 Optical Power Meter Driver
//!
//! Reference: Newport 1936-R / 2936-R User's Manual
//!
//! Protocol Overview:
//! - Format: ASCII command/response, SCPI-like tree (`PM:...`)
//! - Transport: RS-232 (38400 baud, 8N1) or the USB virtual port
//! - Terminator: LF on commands, CR LF on replies
//! - Set commands (`PM:Lambda 633`) are not answered; queries end in `?`
//!
//! The sweep reads statistics of the detector's data store instead of single
//! samples. At startup the store is switched to ring-buffer mode so that
//! `PM:STAT:MEAN?` / `PM:STAT:SDEV?` always summarise the most recent
//! `buffer_size` samples:
//!
//! ```text
//! PM:DS:BUF 1        ring buffer, oldest values overwritten
//! PM:DS:INT <n>      store every n-th 0.1 ms CW sample
//! PM:DS:SIZE <size>
//! PM:DS:EN 1         start collecting
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use spr_daq::config::PowerMeterConfig;
//! use spr_daq::hardware::capabilities::PowerReadout;
//! use spr_daq::hardware::newport_2936::Newport2936Driver;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PowerMeterConfig::default();
//!     let meter = Newport2936Driver::open(&config)?;
//!     meter.initialize(&config).await?;
//!
//!     let sample = meter.read_averaged_power().await?;
//!     println!("Power: {:.3e} ± {:.1e} W", sample.mean, sample.std_dev);
//!     Ok(())
//! }
//! ```

use crate::config::PowerMeterConfig;
use crate::hardware::capabilities::{
    FilterMode, InstantPower, PowerReadout, PowerSample, WavelengthTunable,
};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

#[cfg(feature = "instrument_serial")]
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Driver for the Newport 2936 optical power meter
///
/// Generic over the byte transport so that the protocol logic can be exercised
/// against [`crate::hardware::mock_transport::MockTransport`].
pub struct Newport2936Driver<T> {
    /// Transport protected by Mutex for exclusive command/reply exchanges
    port: Mutex<BufReader<T>>,
    /// Reply timeout
    timeout: Duration,
    /// Pause after unanswered set commands
    command_delay: Duration,
}

#[cfg(feature = "instrument_serial")]
impl Newport2936Driver<SerialStream> {
    /// Open the meter on a serial port
    ///
    /// # Errors
    /// Returns error if the serial port cannot be opened
    pub fn open(config: &PowerMeterConfig) -> Result<Self> {
        let port = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .with_context(|| format!("Failed to open Newport 2936 serial port {}", config.port))?;

        Ok(Self::with_transport(port, config.timeout()))
    }
}

impl<T> Newport2936Driver<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already-open transport
    pub fn with_transport(transport: T, timeout: Duration) -> Self {
        Self {
            port: Mutex::new(BufReader::new(transport)),
            timeout,
            command_delay: Duration::from_millis(20),
        }
    }

    /// Override the pause inserted after set commands
    pub fn with_command_delay(mut self, delay: Duration) -> Self {
        self.command_delay = delay;
        self
    }

    /// Bring the meter into the state the sweep expects
    ///
    /// Returns the identification string. A configured wavelength outside the
    /// detector range is reported and the detector keeps its current wavelength.
    pub async fn initialize(&self, config: &PowerMeterConfig) -> Result<String> {
        let idn = self.identify().await?;
        tracing::info!(idn = %idn, "Connected to Newport 2936");

        if let Err(e) = self.set_wavelength(config.wavelength_nm).await {
            tracing::warn!("{e:#}");
        }
        self.set_filtering(config.filter).await?;
        self.configure_buffer(config.buffer_size, config.interval_ms)
            .await?;
        Ok(idn)
    }

    /// Query the identification string (`*IDN?`)
    pub async fn identify(&self) -> Result<String> {
        self.query("*IDN?").await
    }

    /// Put the data store in ring-buffer mode and start collection
    ///
    /// # Arguments
    /// * `size` - Number of samples the statistics cover
    /// * `interval_ms` - Time between stored samples; the meter samples every 0.1 ms
    pub async fn configure_buffer(&self, size: u32, interval_ms: u32) -> Result<()> {
        self.write("PM:DS:BUF 1").await?;
        self.write(&format!("PM:DS:INT {}", interval_ms.saturating_mul(10)))
            .await?;
        self.write(&format!("PM:DS:SIZE {}", size)).await?;
        self.write("PM:DS:EN 1").await
    }

    /// Detector wavelength range (nm)
    pub async fn wavelength_range(&self) -> Result<(u32, u32)> {
        let min = parse_wavelength(&self.query("PM:MIN:Lambda?").await?)?;
        let max = parse_wavelength(&self.query("PM:MAX:Lambda?").await?)?;
        Ok((min, max))
    }

    /// Send query and read the one-line reply
    async fn query(&self, command: &str) -> Result<String> {
        let mut port = self.port.lock().await;

        let cmd = format!("{}\n", command);
        port.get_mut()
            .write_all(cmd.as_bytes())
            .await
            .with_context(|| format!("Newport 2936 write failed for '{}'", command))?;

        let mut response = String::new();
        let read = tokio::time::timeout(self.timeout, port.read_line(&mut response))
            .await
            .map_err(|_| anyhow!("Newport 2936 read timeout for '{}'", command))?
            .with_context(|| format!("Newport 2936 read failed for '{}'", command))?;
        if read == 0 {
            bail!("Newport 2936 closed the connection during '{}'", command);
        }

        tracing::trace!(command, response = response.trim(), "Newport 2936 query");
        Ok(response.trim().to_string())
    }

    /// Send set command; the meter does not answer these
    async fn write(&self, command: &str) -> Result<()> {
        let mut port = self.port.lock().await;

        let cmd = format!("{}\n", command);
        port.get_mut()
            .write_all(cmd.as_bytes())
            .await
            .with_context(|| format!("Newport 2936 write failed for '{}'", command))?;

        if !self.command_delay.is_zero() {
            tokio::time::sleep(self.command_delay).await;
        }
        Ok(())
    }
}

/// Parse the reply to `PM:STAT:MEAN?;PM:STAT:SDEV?`
///
/// The meter separates the two answers with a comma; semicolons and whitespace
/// are accepted as well.
pub fn parse_statistics(response: &str) -> Result<PowerSample> {
    let values: Vec<&str> = response
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect();

    match values.as_slice() {
        [mean, std_dev] => Ok(PowerSample {
            mean: parse_power(mean)?,
            std_dev: parse_power(std_dev)?,
        }),
        _ => bail!(
            "Expected mean and standard deviation, got '{}'",
            response.trim()
        ),
    }
}

/// Parse a power value in scientific notation (e.g. "1.234E-06")
pub fn parse_power(response: &str) -> Result<f64> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        bail!("Empty power response");
    }
    trimmed
        .parse::<f64>()
        .with_context(|| format!("Failed to parse power response: '{}'", trimmed))
}

fn parse_wavelength(response: &str) -> Result<u32> {
    let value: f64 = response
        .trim()
        .parse()
        .with_context(|| format!("Failed to parse wavelength: '{}'", response.trim()))?;
    if !(value.is_finite() && value >= 0.0) {
        bail!("Invalid wavelength reply: '{}'", response.trim());
    }
    Ok(value.round() as u32)
}

#[async_trait]
impl<T> WavelengthTunable for Newport2936Driver<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn set_wavelength(&self, nm: u32) -> Result<()> {
        let (min, max) = self.wavelength_range().await?;
        if !(min..=max).contains(&nm) {
            bail!(
                "Wavelength {} nm outside detector range {}-{} nm; keeping current wavelength",
                nm,
                min,
                max
            );
        }
        self.write(&format!("PM:Lambda {}", nm)).await?;
        tracing::info!(wavelength_nm = nm, "Newport 2936 wavelength set");
        Ok(())
    }

    async fn wavelength(&self) -> Result<u32> {
        parse_wavelength(&self.query("PM:Lambda?").await?)
    }
}

#[async_trait]
impl<T> PowerReadout for Newport2936Driver<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn set_filtering(&self, mode: FilterMode) -> Result<()> {
        self.write(&format!("PM:FILT {}", mode.code())).await
    }

    async fn read_averaged_power(&self) -> Result<PowerSample> {
        let response = self.query("PM:STAT:MEAN?;PM:STAT:SDEV?").await?;
        parse_statistics(&response)
    }

    async fn read_instant_power(&self) -> Result<InstantPower> {
        let wavelength_nm = f64::from(parse_wavelength(&self.query("PM:Lambda?").await?)?);
        let power = parse_power(&self.query("PM:Power?").await?)?;
        Ok(InstantPower {
            wavelength_nm,
            power,
        })
    }
}
