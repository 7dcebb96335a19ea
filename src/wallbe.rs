//! Wallbe charger over Modbus TCP
//!
//! The Wallbe controller exposes status, current and enable state through a
//! handful of registers on unit 255. The connection is opened on first use and
//! dropped after any transport failure or timeout, so the next call
//! reconnects.

use crate::api::{ChargeController, ChargeStatus, Charger};
use crate::error::{HeliosError, Result};
use crate::logging::StructuredLogger;
use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_modbus::client::{Context, tcp};
use tokio_modbus::prelude::*;

const SLAVE_ID: u8 = 255;

/// Connect and per-operation timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Input register holding the IEC 61851 status letter
const STATUS_REGISTER: u16 = 100;
/// Holding register with the current drawn by the vehicle (A)
const ACTUAL_CURRENT_REGISTER: u16 = 300;
/// Coil enabling the charge point
const ENABLE_COIL: u16 = 400;
/// Holding register for the current limit (A)
const MAX_CURRENT_REGISTER: u16 = 528;

type ModbusFuture<'a, T> = Pin<Box<dyn Future<Output = tokio_modbus::Result<T>> + Send + 'a>>;

/// Wallbe charge point, implementing both [`Charger`] and [`ChargeController`]
pub struct Wallbe {
    uri: String,
    timeout: Duration,
    context: Mutex<Option<Context>>,
    logger: StructuredLogger,
}

impl Wallbe {
    /// Charger at `uri` (`host:port`); no connection is made until first use
    pub fn new(uri: impl Into<String>, logger: StructuredLogger) -> Result<Self> {
        let uri = uri.into();
        if uri.trim().is_empty() {
            return Err(HeliosError::config("wallbe: missing Modbus address"));
        }
        Ok(Self {
            uri,
            timeout: DEFAULT_TIMEOUT,
            context: Mutex::new(None),
            logger,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Whether a connection is currently held
    pub async fn is_connected(&self) -> bool {
        self.context.lock().await.is_some()
    }

    async fn resolve(&self) -> Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host(self.uri.as_str())
            .await
            .map_err(|e| HeliosError::modbus(format!("Invalid address {}: {}", self.uri, e)))?;
        addrs
            .next()
            .ok_or_else(|| HeliosError::modbus(format!("No address for {}", self.uri)))
    }

    async fn connect(&self) -> Result<Context> {
        let addr = self.resolve().await?;
        self.logger
            .info(&format!("Connecting to Wallbe at {}", addr));

        match timeout(self.timeout, tcp::connect_slave(addr, Slave(SLAVE_ID))).await {
            Ok(Ok(context)) => Ok(context),
            Ok(Err(e)) => {
                let error_msg = format!("Failed to connect to {}: {}", addr, e);
                self.logger.error(&error_msg);
                Err(HeliosError::modbus(error_msg))
            }
            Err(_) => {
                let error_msg = format!("Connection to {} timed out", addr);
                self.logger.error(&error_msg);
                Err(HeliosError::timeout(error_msg))
            }
        }
    }

    /// Run one request on the shared connection, opening it if needed
    async fn request<T, F>(&self, what: &str, op: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Context) -> ModbusFuture<'a, T>,
    {
        let mut guard = self.context.lock().await;
        let context = match guard.take() {
            Some(context) => context,
            None => self.connect().await?,
        };
        let context = guard.insert(context);

        match timeout(self.timeout, op(context)).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(code))) => {
                let error_msg = format!("{} rejected: {:?}", what, code);
                self.logger.warn(&error_msg);
                Err(HeliosError::modbus(error_msg))
            }
            Ok(Err(e)) => {
                *guard = None;
                let error_msg = format!("{} failed: {}", what, e);
                self.logger.error(&error_msg);
                Err(HeliosError::modbus(error_msg))
            }
            Err(_) => {
                *guard = None;
                let error_msg = format!("{} timed out", what);
                self.logger.error(&error_msg);
                Err(HeliosError::timeout(error_msg))
            }
        }
    }
}

/// Decode the status letter from a register's big-endian bytes
pub fn decode_status(register: u16) -> ChargeStatus {
    let text: String = register
        .to_be_bytes()
        .iter()
        .filter(|b| **b != 0)
        .map(|b| char::from(*b))
        .collect();
    ChargeStatus::parse(&text)
}

/// Range-check a current before it is written to a 16-bit register
pub fn encode_current(current: i64) -> Result<u16> {
    u16::try_from(current).map_err(|_| {
        HeliosError::validation("current", format!("{}A out of register range", current))
    })
}

fn first<T: Copy>(values: &[T], what: &str) -> Result<T> {
    values
        .first()
        .copied()
        .ok_or_else(|| HeliosError::modbus(format!("{}: empty response", what)))
}

#[async_trait]
impl Charger for Wallbe {
    async fn status(&self) -> Result<ChargeStatus> {
        let registers = self
            .request("read status", |ctx| {
                Box::pin(ctx.read_input_registers(STATUS_REGISTER, 1))
            })
            .await?;
        Ok(decode_status(first(&registers, "read status")?))
    }

    async fn enabled(&self) -> Result<bool> {
        let coils = self
            .request("read enabled", |ctx| Box::pin(ctx.read_coils(ENABLE_COIL, 1)))
            .await?;
        first(&coils, "read enabled")
    }

    async fn enable(&self, enable: bool) -> Result<()> {
        self.request("write enable", move |ctx| {
            Box::pin(ctx.write_single_coil(ENABLE_COIL, enable))
        })
        .await
    }

    async fn actual_current(&self) -> Result<i64> {
        let registers = self
            .request("read actual current", |ctx| {
                Box::pin(ctx.read_holding_registers(ACTUAL_CURRENT_REGISTER, 1))
            })
            .await?;
        Ok(i64::from(first(&registers, "read actual current")?))
    }
}

#[async_trait]
impl ChargeController for Wallbe {
    async fn max_current(&self, current: i64) -> Result<()> {
        let value = encode_current(current)?;
        self.logger
            .debug(&format!("Writing {}A to register {}", value, MAX_CURRENT_REGISTER));
        self.request("write max current", move |ctx| {
            Box::pin(ctx.write_single_register(MAX_CURRENT_REGISTER, value))
        })
        .await
    }
}
