use anyhow::{Context, Result};
use std::time::Duration;

use crate::audio::queue::ClearMode;

#[derive(Debug, Clone)]
pub struct Config {
    // Auto-desconexión
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,

    // Audio
    pub default_volume: u8,
    pub clear_resets_loop: bool,

    // Eventos
    pub event_buffer: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            idle_timeout: duration_var("IDLE_TIMEOUT", "5m")?,
            sweep_interval: duration_var("SWEEP_INTERVAL", "5m")?,

            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("DEFAULT_VOLUME debe ser un entero entre 0 y 100")?,
            clear_resets_loop: std::env::var("CLEAR_RESETS_LOOP")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("CLEAR_RESETS_LOOP debe ser true o false")?,

            event_buffer: std::env::var("EVENT_BUFFER")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .context("EVENT_BUFFER debe ser un entero")?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0 and 100
    /// - Idle timeout and sweep interval must be non-zero
    /// - The event buffer must hold at least one event
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 100 {
            anyhow::bail!(
                "Default volume must be between 0 and 100, got: {}",
                self.default_volume
            );
        }

        if self.idle_timeout.is_zero() {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.sweep_interval.is_zero() {
            anyhow::bail!("Sweep interval must be greater than 0");
        }

        if self.event_buffer == 0 {
            anyhow::bail!("Event buffer must be greater than 0");
        }

        Ok(())
    }

    pub fn clear_mode(&self) -> ClearMode {
        if self.clear_resets_loop {
            ClearMode::ResetLoop
        } else {
            ClearMode::KeepLoop
        }
    }

    /// Returns a summary of the current configuration for logging.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Idle: {} timeout, {} sweep\n  \
            Audio: {}% vol, clear resets loop={}\n  \
            Events: {} buffered",
            humantime::format_duration(self.idle_timeout),
            humantime::format_duration(self.sweep_interval),
            self.default_volume,
            self.clear_resets_loop,
            self.event_buffer,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(300),
            default_volume: 50,
            clear_resets_loop: false,
            event_buffer: 256,
        }
    }
}

fn duration_var(name: &str, default: &str) -> Result<Duration> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    humantime::parse_duration(raw.trim())
        .with_context(|| format!("{} no es una duración válida: {:?}", name, raw))
}
