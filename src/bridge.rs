use crate::config::Config;
use crate::convert::{self, Metric};
use crate::mqtt::{self, Broker};
use crate::telemetry;
use anyhow::{anyhow, bail, Context, Result};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, QoS, SubAck, SubscribeReasonCode};
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{sleep, timeout};

const DISCONNECT_GRACE: Duration = Duration::from_millis(200);

/// Connects both brokers, subscribes the wx side, and relays converted
/// metrics until a connection is lost, an inbound payload fails to decode, or
/// a termination signal arrives. Returns `Ok(())` only for the signal path;
/// every other exit is an error and maps to a non-zero process status.
pub async fn run(config: Config) -> Result<()> {
    let (wx_client, wx_events) = mqtt::connect(Broker::Wx, &config.wx).await?;
    let (allsky_client, allsky_events) = mqtt::connect(Broker::Allsky, &config.allsky).await?;

    wx_client
        .subscribe(config.wx.topic.clone(), QoS::AtLeastOnce)
        .await
        .with_context(|| format!("subscribe to wx topic {}", config.wx.topic))?;
    tracing::info!(broker = Broker::Wx.name(), topic = %config.wx.topic, "subscribed");

    let mut links = Links {
        wx: Some(wx_client),
        allsky: Some(allsky_client.clone()),
    };

    let mut dispatcher = {
        let config = config.clone();
        tokio::spawn(async move { dispatch_loop(wx_events, allsky_client, config).await })
    };
    let mut sink_poller = tokio::spawn(poll_sink(allsky_events));

    tracing::info!("waiting for messages");

    let outcome: Result<()> = tokio::select! {
        res = &mut dispatcher => match res {
            Ok(inner) => inner,
            Err(err) => Err(anyhow!(err)).context("dispatcher task failed"),
        },
        res = &mut sink_poller => match res {
            Ok(inner) => inner,
            Err(err) => Err(anyhow!(err)).context("sink poller task failed"),
        },
        res = shutdown_signal() => {
            if res.is_ok() {
                tracing::info!("shutdown signal received");
            }
            res
        }
    };

    links.teardown().await;
    // Let the surviving event loop flush the outgoing Disconnect before the
    // poller tasks are dropped.
    sleep(DISCONNECT_GRACE).await;
    dispatcher.abort();
    sink_poller.abort();

    outcome
}

/// Both broker links, owned by the coordinator. `teardown` takes each client
/// out of its slot, so running it a second time is a no-op.
struct Links {
    wx: Option<AsyncClient>,
    allsky: Option<AsyncClient>,
}

impl Links {
    async fn teardown(&mut self) {
        for (broker, client) in [
            (Broker::Wx, self.wx.take()),
            (Broker::Allsky, self.allsky.take()),
        ] {
            let Some(client) = client else { continue };
            match timeout(DISCONNECT_GRACE, client.disconnect()).await {
                Ok(Ok(())) => tracing::info!(broker = broker.name(), "disconnected"),
                Ok(Err(err)) => {
                    // Normal when the link already dropped; the event loop is gone.
                    tracing::debug!(broker = broker.name(), error = %err, "disconnect not delivered");
                }
                Err(_) => {
                    tracing::debug!(broker = broker.name(), "disconnect timed out");
                }
            }
        }
    }
}

/// Per-delivery dispatch on the wx connection. A transport error here means
/// the wx link is lost; an undecodable payload is fatal for the process.
async fn dispatch_loop(mut events: EventLoop, sink: AsyncClient, config: Config) -> Result<()> {
    loop {
        match events.poll().await {
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                tracing::info!(
                    broker = Broker::Wx.name(),
                    payload = %String::from_utf8_lossy(&publish.payload),
                    "received message"
                );
                let report = telemetry::decode_loop_payload(&publish.payload)?;
                publish_metrics(&sink, &config, convert::convert(&report)).await;
            }
            // subscribe() only queues the packet; the broker's grant or
            // denial arrives here as the SubAck.
            Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                check_suback(&config.wx.topic, &ack)?;
            }
            Ok(_) => {}
            Err(err) => return Err(err).context("wx broker connection lost"),
        }
    }
}

fn check_suback(topic: &str, ack: &SubAck) -> Result<()> {
    if ack
        .return_codes
        .iter()
        .any(|code| matches!(code, SubscribeReasonCode::Failure))
    {
        bail!("wx broker rejected subscription to {topic}");
    }
    Ok(())
}

async fn publish_metrics(sink: &AsyncClient, config: &Config, metrics: Vec<Metric>) {
    for metric in metrics {
        let topic = mqtt::metric_topic(&config.allsky.topic, metric.name);
        let payload = convert::format_value(metric.value);
        if let Err(err) = sink.publish(topic, QoS::AtMostOnce, false, payload).await {
            tracing::error!(
                metric = metric.name,
                error = %err,
                "failed to send message to allsky broker"
            );
        }
    }
}

/// The allsky connection publishes only; its event loop is polled to keep the
/// link alive and to notice loss. Nothing is subscribed there, so an inbound
/// publish is dropped rather than dispatched.
async fn poll_sink(mut events: EventLoop) -> Result<()> {
    loop {
        match events.poll().await {
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                tracing::info!(
                    broker = Broker::Allsky.name(),
                    payload = %String::from_utf8_lossy(&publish.payload),
                    "received message"
                );
            }
            Ok(_) => {}
            Err(err) => return Err(err).context("allsky broker connection lost"),
        }
    }
}

async fn shutdown_signal() -> Result<()> {
    let mut term = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("wait for interrupt signal")?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::MqttOptions;

    fn test_client(client_id: &str) -> (AsyncClient, EventLoop) {
        AsyncClient::new(MqttOptions::new(client_id, "127.0.0.1", 1883), 8)
    }

    #[tokio::test]
    async fn teardown_twice_is_a_noop() {
        let (wx, _wx_events) = test_client("wxbridge-teardown-wx");
        let (allsky, _allsky_events) = test_client("wxbridge-teardown-allsky");
        let mut links = Links {
            wx: Some(wx),
            allsky: Some(allsky),
        };

        links.teardown().await;
        assert!(links.wx.is_none());
        assert!(links.allsky.is_none());

        // Once per connection loss and once per signal must both be safe.
        links.teardown().await;
        assert!(links.wx.is_none());
        assert!(links.allsky.is_none());
    }

    #[test]
    fn granted_subscription_passes_suback_check() {
        let ack = SubAck::new(1, vec![SubscribeReasonCode::Success(QoS::AtLeastOnce)]);
        assert!(check_suback("weather/loop", &ack).is_ok());
    }

    #[test]
    fn rejected_subscription_fails_suback_check() {
        let ack = SubAck::new(1, vec![SubscribeReasonCode::Failure]);
        let err = check_suback("weather/loop", &ack).unwrap_err();
        assert!(err.to_string().contains("weather/loop"));
    }
}
