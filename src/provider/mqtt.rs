//! MQTT subscription backend
//!
//! One event-loop task per client receives publishes and dispatches them to
//! the callbacks registered for the exact topic. Providers built here read a
//! [`SubscriptionCache`] fed by such a callback.

use super::cache::{DEFAULT_STALENESS, SubscriptionCache};
use super::{FloatProvider, IntProvider};
use crate::config::MqttConfig;
use crate::error::{HeliosError, Result};
use crate::logging::StructuredLogger;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

type Callback = Arc<dyn Fn(&str) + Send + Sync>;

/// Topic to callback registry shared with the event loop
#[derive(Default, Clone)]
pub(crate) struct Listeners {
    inner: Arc<RwLock<HashMap<String, Vec<Callback>>>>,
}

impl Listeners {
    pub(crate) fn register(&self, topic: &str, callback: Callback) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.to_string())
            .or_default()
            .push(callback);
    }

    pub(crate) fn topics(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Hand a non-empty payload to every callback of `topic`; returns how many ran
    pub(crate) fn dispatch(&self, topic: &str, payload: &str) -> usize {
        if payload.is_empty() {
            return 0;
        }
        let callbacks = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
            .unwrap_or_default();
        for callback in &callbacks {
            callback(payload);
        }
        callbacks.len()
    }
}

/// Sleep before the next reconnect attempt; true when shutdown came first
async fn wait_reconnect(shutdown: &Notify, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.notified() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

/// MQTT connection with per-topic listeners
pub struct MqttClient {
    client: AsyncClient,
    listeners: Listeners,
    shutdown: Arc<Notify>,
    logger: StructuredLogger,
    _eventloop_handle: task::JoinHandle<()>,
}

impl MqttClient {
    /// Create the client and start its event loop; the broker connection is
    /// established (and re-established) in the background.
    pub fn connect(config: &MqttConfig, logger: StructuredLogger) -> Result<Self> {
        if config.broker.trim().is_empty() {
            return Err(HeliosError::config("mqtt: broker not configured"));
        }
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("helios-{}", std::process::id()));
        logger.info(&format!(
            "connecting {} at {}:{}",
            client_id, config.broker, config.port
        ));

        let mut options = MqttOptions::new(client_id, config.broker.clone(), config.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let Some(user) = &config.user {
            options.set_credentials(user.clone(), config.password.clone().unwrap_or_default());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 10);
        let listeners = Listeners::default();
        let shutdown = Arc::new(Notify::new());

        let loop_client = client.clone();
        let loop_listeners = listeners.clone();
        let loop_shutdown = shutdown.clone();
        let loop_logger = logger.clone();
        let _eventloop_handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_shutdown.notified() => {
                        loop_logger.info("event loop stopped");
                        break;
                    }
                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            match std::str::from_utf8(&publish.payload) {
                                Ok(payload) => {
                                    loop_listeners.dispatch(&publish.topic, payload);
                                }
                                Err(e) => loop_logger.warn(&format!(
                                    "invalid UTF-8 payload on {}: {}",
                                    publish.topic, e
                                )),
                            }
                        }
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            loop_logger.info("connected");
                            // subscriptions do not survive a clean-session reconnect
                            for topic in loop_listeners.topics() {
                                if let Err(e) = loop_client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                                    loop_logger.warn(&format!("resubscribe {} failed: {}", topic, e));
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            loop_logger.error(&format!("event loop error: {}", e));
                            if wait_reconnect(&loop_shutdown, RECONNECT_DELAY).await {
                                loop_logger.info("event loop stopped");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(Self {
            client,
            listeners,
            shutdown,
            logger,
            _eventloop_handle,
        })
    }

    /// Subscribe `topic` and relay every non-empty payload to `callback`
    pub async fn listen<F>(&self, topic: &str, callback: F) -> Result<()>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listeners.register(topic, Arc::new(callback));
        self.client.subscribe(topic, QoS::AtMostOnce).await?;
        self.logger.debug(&format!("subscribed {}", topic));
        Ok(())
    }

    /// Cache fed from `topic`
    pub async fn cache<T>(&self, topic: &str, window: Duration) -> Result<Arc<SubscriptionCache<T>>>
    where
        T: FromStr + Clone + Send + Sync + 'static,
        T::Err: std::fmt::Display,
    {
        let cache = Arc::new(SubscriptionCache::new(topic, window, self.logger.clone()));
        let sink = cache.clone();
        self.listen(topic, move |payload| sink.update(payload)).await?;
        Ok(cache)
    }

    /// Cached float value of `topic`; `window` defaults to 10 s
    pub async fn float_provider(&self, topic: &str, window: Option<Duration>) -> Result<FloatProvider> {
        let cache = self
            .cache::<f64>(topic, window.unwrap_or(DEFAULT_STALENESS))
            .await?;
        Ok(cache.provider())
    }

    /// Cached integer value of `topic`; `window` defaults to 10 s
    pub async fn int_provider(&self, topic: &str, window: Option<Duration>) -> Result<IntProvider> {
        let cache = self
            .cache::<i64>(topic, window.unwrap_or(DEFAULT_STALENESS))
            .await?;
        Ok(cache.provider())
    }

    /// Stop the event loop and disconnect from the broker
    pub async fn shutdown(&self) {
        if let Err(e) = self.client.disconnect().await {
            self.logger.debug(&format!("disconnect: {}", e));
        }
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::get_logger;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispatch_matches_exact_topic() {
        let listeners = Listeners::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        listeners.register(
            "home/grid/power",
            Arc::new(move |_: &str| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(listeners.dispatch("home/grid/power", "-1150"), 1);
        assert_eq!(listeners.dispatch("home/grid", "-1150"), 0);
        assert_eq!(listeners.dispatch("home/grid/power", ""), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(listeners.topics(), vec!["home/grid/power".to_string()]);
    }

    #[tokio::test]
    async fn dispatch_feeds_cache() {
        let listeners = Listeners::default();
        let cache = Arc::new(SubscriptionCache::<f64>::new(
            "pv/power",
            DEFAULT_STALENESS,
            get_logger("mqtt"),
        ));
        let sink = cache.clone();
        listeners.register("pv/power", Arc::new(move |p: &str| sink.update(p)));

        listeners.dispatch("pv/power", "3200.5");
        assert_eq!(cache.read().unwrap(), 3200.5);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cuts_reconnect_delay_short() {
        let shutdown = Notify::new();
        let started = tokio::time::Instant::now();
        assert!(!wait_reconnect(&shutdown, RECONNECT_DELAY).await);
        assert!(started.elapsed() >= RECONNECT_DELAY);

        shutdown.notify_one();
        let started = tokio::time::Instant::now();
        assert!(wait_reconnect(&shutdown, RECONNECT_DELAY).await);
        assert!(started.elapsed() < RECONNECT_DELAY);
    }

    #[tokio::test]
    async fn empty_broker_rejected() {
        let config = MqttConfig {
            broker: " ".to_string(),
            port: 1883,
            user: None,
            password: None,
            client_id: None,
        };
        assert!(MqttClient::connect(&config, get_logger("mqtt")).is_err());
    }
}
