use crate::config::BrokerConfig;
use anyhow::{bail, Context, Result};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions};
use std::time::Duration;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 32;

/// Which of the two brokers a connection (or an event from one) belongs to.
/// Compared by value; log lines use the short name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Broker {
    Wx,
    Allsky,
}

impl Broker {
    pub fn name(self) -> &'static str {
        match self {
            Broker::Wx => "wx",
            Broker::Allsky => "allsky",
        }
    }
}

pub fn options(config: &BrokerConfig) -> MqttOptions {
    let mut opts = MqttOptions::new(
        config.client_id.clone(),
        config.host.clone(),
        config.port,
    );
    opts.set_keep_alive(KEEP_ALIVE);
    if let Some(username) = &config.username {
        opts.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
    }
    opts
}

/// Establishes one broker connection and waits for its ConnAck. There is no
/// retry: the first transport error or a broker refusal is returned to the
/// caller, which treats it as startup-fatal.
pub async fn connect(broker: Broker, config: &BrokerConfig) -> Result<(AsyncClient, EventLoop)> {
    let (client, mut eventloop) = AsyncClient::new(options(config), CHANNEL_CAPACITY);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    bail!(
                        "{} broker at {}:{} refused connection: {:?}",
                        broker.name(),
                        config.host,
                        config.port,
                        ack.code
                    );
                }
                tracing::info!(broker = broker.name(), "broker connected");
                return Ok((client, eventloop));
            }
            Ok(_) => {}
            Err(err) => {
                return Err(err).with_context(|| {
                    format!(
                        "connect to {} broker at {}:{}",
                        broker.name(),
                        config.host,
                        config.port
                    )
                });
            }
        }
    }
}

/// Full outbound topic for one metric: `<allsky topic prefix>/<metric name>`.
pub fn metric_topic(prefix: &str, metric: &str) -> String {
    format!("{prefix}/{metric}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker_config(username: Option<&str>) -> BrokerConfig {
        BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: 1883,
            client_id: "wxbridge-test".to_string(),
            username: username.map(|u| u.to_string()),
            password: username.map(|_| "secret".to_string()),
            topic: "weather/loop".to_string(),
        }
    }

    #[test]
    fn options_carry_endpoint_and_credentials() {
        let opts = options(&broker_config(Some("station")));
        assert_eq!(opts.broker_address(), ("127.0.0.1".to_string(), 1883));
        assert_eq!(
            opts.credentials(),
            Some(rumqttc::Login::new("station", "secret"))
        );
    }

    #[test]
    fn options_without_username_are_unauthenticated() {
        let opts = options(&broker_config(None));
        assert_eq!(opts.credentials(), None);
    }

    #[test]
    fn metric_topic_joins_prefix_and_name() {
        assert_eq!(
            metric_topic("indi-allsky/wx", "temperature"),
            "indi-allsky/wx/temperature"
        );
    }

    #[test]
    fn broker_names_are_stable() {
        assert_eq!(Broker::Wx.name(), "wx");
        assert_eq!(Broker::Allsky.name(), "allsky");
        assert_ne!(Broker::Wx, Broker::Allsky);
    }
}
