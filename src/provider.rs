//! Typed provider/setter abstraction
//!
//! Providers return typed device data, setters update it. Both are shared
//! function values over a backend (a command line, an MQTT topic, ...), so the
//! same device wrappers and the same load point logic run unmodified against
//! any of them. Every call receives a [`CallContext`] carrying its deadline.

use crate::error::{HeliosError, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub mod cache;
pub mod exec;
pub mod mqtt;
pub mod template;

/// Default deadline for a single provider or setter call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-call execution context
#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    deadline: Instant,
}

impl CallContext {
    /// Context expiring `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Run `fut` bounded by this context's deadline.
    ///
    /// A breach is reported as a [`HeliosError::Timeout`] naming `what`.
    pub async fn run<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout_at(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(HeliosError::timeout(format!("{} exceeded deadline", what))),
        }
    }
}

/// Boxed future returned by providers and setters
pub type CallFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

/// Typed read over a backend
pub type Provider<T> = Arc<dyn Fn(CallContext) -> CallFuture<T> + Send + Sync>;

/// Typed write over a backend
pub type Setter<T> = Arc<dyn Fn(CallContext, T) -> CallFuture<()> + Send + Sync>;

pub type FloatProvider = Provider<f64>;
pub type IntProvider = Provider<i64>;
pub type StringProvider = Provider<String>;
pub type BoolProvider = Provider<bool>;

pub type FloatSetter = Setter<f64>;
pub type IntSetter = Setter<i64>;
pub type StringSetter = Setter<String>;
pub type BoolSetter = Setter<bool>;

/// Build a provider from an async closure
pub fn provider<T, F, Fut>(f: F) -> Provider<T>
where
    T: 'static,
    F: Fn(CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)) as CallFuture<T>)
}

/// Build a setter from an async closure
pub fn setter<T, F, Fut>(f: F) -> Setter<T>
where
    T: 'static,
    F: Fn(CallContext, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |ctx, value| Box::pin(f(ctx, value)) as CallFuture<()>)
}

/// Derive a provider by applying a fallible conversion to another provider's value
pub fn map_provider<S, T, F>(source: Provider<S>, convert: F) -> Provider<T>
where
    S: Send + 'static,
    T: Send + 'static,
    F: Fn(S) -> Result<T> + Send + Sync + 'static,
{
    let convert = Arc::new(convert);
    provider(move |ctx| {
        let source = source.clone();
        let convert = convert.clone();
        async move { convert(source(ctx).await?) }
    })
}

/// "1", "true" and "on" are considered truthy, case-insensitive
pub fn truish(s: &str) -> bool {
    let s = s.trim();
    s == "1" || s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("on")
}

/// Strict decimal integer parse of a trimmed backend value
pub fn parse_int(s: &str) -> Result<i64> {
    s.trim()
        .parse::<i64>()
        .map_err(|e| HeliosError::parse(format!("invalid integer '{}': {}", s.trim(), e)))
}

/// Strict decimal float parse of a trimmed backend value
pub fn parse_float(s: &str) -> Result<f64> {
    s.trim()
        .parse::<f64>()
        .map_err(|e| HeliosError::parse(format!("invalid number '{}': {}", s.trim(), e)))
}
