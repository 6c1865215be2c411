// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker adapter: request/response over fire-and-forget pub/sub.
//!
//! The broker delivers JSON payloads on a dot-separated subject hierarchy
//! (`home.device.<id>.set` / `home.device.<id>.state`). Commands are
//! published without acknowledgement; confirmation comes from waiting for a
//! state echo that satisfies a caller-supplied predicate. Each wait owns its
//! own subscription, so concurrent round trips on different devices never see
//! each other's messages and a slow caller starves nobody.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::time::{Duration, Instant};

use crate::error::HomeError;
use crate::metrics::Metrics;

/// Boxed echo-matching predicate, applied to each decoded payload.
pub type MatchFn = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// The request/response surface tools are written against.
///
/// [`BrokerClient`] is the production implementation; tests substitute a
/// scripted peer.
#[async_trait]
pub trait StateBroker: Send + Sync {
    async fn publish_json(&self, subject: &str, payload: &Value) -> Result<(), HomeError>;

    async fn wait_for_state(
        &self,
        subject: &str,
        predicate: MatchFn,
        timeout: Duration,
    ) -> Result<Value, HomeError>;

    async fn publish_and_wait(
        &self,
        set_subject: &str,
        payload: &Value,
        state_subject: &str,
        predicate: MatchFn,
        timeout: Duration,
    ) -> Result<Value, HomeError>;

    async fn publish_without_wait(&self, subject: &str, payload: &Value)
        -> Result<(), HomeError>;
}

/// Connect a raw broker client with the given connection name.
///
/// Used both by [`BrokerClient::connect`] and by the context manager, which
/// must own a session distinct from the RPC one so its wildcard subscription
/// cannot steal command echoes.
pub async fn connect(
    url: &str,
    token: Option<&str>,
    name: &str,
) -> Result<async_nats::Client, HomeError> {
    let mut opts = async_nats::ConnectOptions::new();
    if let Some(token) = token {
        opts = opts.token(token.to_owned());
    }
    let client = opts
        .name(name)
        .connect(url)
        .await
        .map_err(|e| HomeError::Transport(format!("connect {url}: {e}")))?;
    tracing::info!(url = %url, name = %name, "broker connected");
    Ok(client)
}

/// JSON pub/sub client with publish-and-wait request/response.
pub struct BrokerClient {
    client: async_nats::Client,
    metrics: Arc<Metrics>,
}

impl BrokerClient {
    pub async fn connect(
        url: &str,
        token: Option<&str>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, HomeError> {
        let client = connect(url, token, "hearth-rpc").await?;
        Ok(Self { client, metrics })
    }

    /// Encode `payload` as compact JSON and publish it.
    pub async fn publish_json(&self, subject: &str, payload: &Value) -> Result<(), HomeError> {
        let bytes = serde_json::to_vec(payload)
            .map_err(|e| HomeError::Transport(format!("encode payload: {e}")))?;
        self.client
            .publish(subject.to_owned(), bytes.into())
            .await
            .map_err(|e| HomeError::Transport(format!("publish {subject}: {e}")))?;
        self.metrics.broker_publishes.with_label_values(&[subject]).inc();
        Ok(())
    }

    /// Fire-and-forget publish.
    pub async fn publish_without_wait(
        &self,
        subject: &str,
        payload: &Value,
    ) -> Result<(), HomeError> {
        self.publish_json(subject, payload).await
    }

    /// Wait for the first message on `subject` whose decoded payload
    /// satisfies `predicate`.
    ///
    /// The subscription is torn down on every exit path; abandoning the
    /// future drops the subscriber, which unsubscribes as well.
    pub async fn wait_for_state(
        &self,
        subject: &str,
        predicate: impl Fn(&Value) -> bool,
        timeout: Duration,
    ) -> Result<Value, HomeError> {
        let mut sub = self.subscribe(subject).await?;
        let result = wait_on(&mut sub, &predicate, Instant::now() + timeout).await;
        let _ = sub.unsubscribe().await;
        result
    }

    /// Subscribe to `state_subject`, then publish to `set_subject`, then wait
    /// for a matching echo.
    ///
    /// The subscription must be live before the publish goes out — a fast
    /// peer can echo before a late subscription is established.
    pub async fn publish_and_wait(
        &self,
        set_subject: &str,
        payload: &Value,
        state_subject: &str,
        predicate: impl Fn(&Value) -> bool,
        timeout: Duration,
    ) -> Result<Value, HomeError> {
        let mut sub = self.subscribe(state_subject).await?;
        let published = self.publish_json(set_subject, payload).await;
        let result = match published {
            Ok(()) => {
                // Push the command out before starting the wait clock.
                if let Err(e) = self.client.flush().await {
                    Err(HomeError::Transport(format!("flush: {e}")))
                } else {
                    wait_on(&mut sub, &predicate, Instant::now() + timeout).await
                }
            }
            Err(e) => Err(e),
        };
        let _ = sub.unsubscribe().await;
        result
    }

    async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber, HomeError> {
        self.client
            .subscribe(subject.to_owned())
            .await
            .map_err(|e| HomeError::Transport(format!("subscribe {subject}: {e}")))
    }
}

#[async_trait]
impl StateBroker for BrokerClient {
    async fn publish_json(&self, subject: &str, payload: &Value) -> Result<(), HomeError> {
        BrokerClient::publish_json(self, subject, payload).await
    }

    async fn wait_for_state(
        &self,
        subject: &str,
        predicate: MatchFn,
        timeout: Duration,
    ) -> Result<Value, HomeError> {
        BrokerClient::wait_for_state(self, subject, move |v| predicate(v), timeout).await
    }

    async fn publish_and_wait(
        &self,
        set_subject: &str,
        payload: &Value,
        state_subject: &str,
        predicate: MatchFn,
        timeout: Duration,
    ) -> Result<Value, HomeError> {
        BrokerClient::publish_and_wait(
            self,
            set_subject,
            payload,
            state_subject,
            move |v| predicate(v),
            timeout,
        )
        .await
    }

    async fn publish_without_wait(
        &self,
        subject: &str,
        payload: &Value,
    ) -> Result<(), HomeError> {
        BrokerClient::publish_without_wait(self, subject, payload).await
    }
}

/// Drain a subscription until a decodable payload satisfies the predicate or
/// the deadline passes. Undecodable payloads are skipped.
async fn wait_on(
    sub: &mut async_nats::Subscriber,
    predicate: &impl Fn(&Value) -> bool,
    deadline: Instant,
) -> Result<Value, HomeError> {
    loop {
        let message = match tokio::time::timeout_at(deadline, sub.next()).await {
            Err(_) => return Err(HomeError::Timeout),
            Ok(None) => return Err(HomeError::Transport("subscription closed".to_owned())),
            Ok(Some(message)) => message,
        };
        let Ok(value) = serde_json::from_slice::<Value>(&message.payload) else {
            continue;
        };
        if predicate(&value) {
            return Ok(value);
        }
    }
}
