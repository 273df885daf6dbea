use crate::config::MqttConfig;
use log::{debug, error, info};
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub struct PublishData {
    /// Topic below the configured topic root
    pub topic: String,
    pub payload: String,
    pub qos: u8,
    pub retain: bool,
}

pub enum Transmission {
    Publish(PublishData),
    /// Status message for the notify topic
    Notify(String),
}

pub struct MqttManager {
    rx: Receiver<Transmission>,
    exit_thread: bool,
    client: AsyncClient,
    topic_root: String,
    notify_topic: String,
    client_id: String,
    eventloop: Option<JoinHandle<()>>,
}

/// Time the event loop gets to hand queued messages to the broker on exit
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

pub fn client_id(config: &MqttConfig) -> String {
    if !config.unique_client_id {
        return config.client_name.clone();
    }
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", config.client_name, &suffix[..6])
}

/// Joins the topic root and a path starting with `/`
pub fn full_topic(root: &str, path: &str) -> String {
    format!("{}{}", root.trim_end_matches('/'), path)
}

fn qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

impl MqttManager {
    pub fn new(config: &MqttConfig) -> (Self, Sender<Transmission>) {
        let (mtx, mrx) = tokio::sync::mpsc::channel(100);

        let client_id = client_id(config);
        info!("MQTT connection to {}:{} starting up as {}", config.host, config.port, client_id);
        let mut mqttoptions = MqttOptions::new(client_id.clone(), config.host.clone(), config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        if !config.user.is_empty() {
            mqttoptions.set_credentials(config.user.clone(), config.pass.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

        let notify_c = client.clone();
        let notify_topic = full_topic(&config.topic_root, &config.notify_topic);
        let connected_msg = format!("{} connected", client_id);
        let eventloop_task = tokio::spawn(async move {
            info!("MQTT Eventloop started");
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected, announcing on {}", notify_topic);
                        let client = notify_c.clone();
                        let topic = notify_topic.clone();
                        let payload = connected_msg.clone();
                        /* publish waits on the event loop, so never from within it */
                        tokio::spawn(async move {
                            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, false, payload).await {
                                error!("Error sending connect notice: {}", e);
                            }
                        });
                    },
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        info!("MQTT disconnected");
                        break;
                    },
                    Ok(_) => {},
                    Err(e) => {
                        error!("Error in MQTT {:?}, reconnecting ", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        (MqttManager {
            rx: mrx,
            exit_thread: false,
            client,
            topic_root: config.topic_root.clone(),
            notify_topic: config.notify_topic.clone(),
            client_id,
            eventloop: Some(eventloop_task),
        }, mtx)
    }

    pub async fn start_thread(&mut self) {
        while !self.exit_thread {
            let Some(transmission) = self.rx.recv().await else {
                debug!("Reading returned none, we exit now");
                self.exit_thread = true;
                continue;
            };

            match transmission {
                Transmission::Publish(publish_data) => {
                    let topic = full_topic(&self.topic_root, &publish_data.topic);
                    match self.client.publish(topic.clone(), qos(publish_data.qos), publish_data.retain, publish_data.payload).await {
                        Err(e) => { error!("Error publishing to {}: {}", topic, e); },
                        Ok(_) => { debug!("Published {} successfully", topic); }
                    }
                },
                Transmission::Notify(message) => {
                    let topic = full_topic(&self.topic_root, &self.notify_topic);
                    let payload = format!("{}: {}", self.client_id, message);
                    if let Err(e) = self.client.publish(topic, QoS::AtLeastOnce, false, payload).await {
                        error!("Error sending notice: {}", e);
                    }
                },
            };
        }

        /* requests are handled in order, so the disconnect goes out after every queued publish */
        if let Err(e) = self.client.disconnect().await {
            error!("Error disconnecting: {}", e);
        }
        if let Some(eventloop) = self.eventloop.take() {
            if tokio::time::timeout(FLUSH_TIMEOUT, eventloop).await.is_err() {
                error!("MQTT event loop did not finish within {} seconds", FLUSH_TIMEOUT.as_secs());
            }
        }

        info!("MQTT thread exit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_full_topic() {
        assert_eq!(full_topic("my_mqtt_root", "/energy/gas/reading"), "my_mqtt_root/energy/gas/reading");
        assert_eq!(full_topic("home/", "/energy/influx"), "home/energy/influx");
    }

    #[test]
    fn test_client_id() {
        let mut config = Config::parse("mqtt:\n  host: broker\n").unwrap().mqtt;
        let id = client_id(&config);
        assert!(id.starts_with("Metertrekker-"));
        assert_eq!(id.len(), "Metertrekker-".len() + 6);
        assert_ne!(id, client_id(&config));

        config.unique_client_id = false;
        assert_eq!(client_id(&config), "Metertrekker");
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(qos(1), QoS::AtLeastOnce);
        assert_eq!(qos(7), QoS::AtMostOnce);
    }

    #[tokio::test]
    async fn test_thread_ends_when_senders_are_gone() {
        let config = Config::parse("mqtt:\n  host: 127.0.0.1\n  port: 1\n").unwrap().mqtt;
        let (mut mqtt, tx) = MqttManager::new(&config);
        drop(tx);

        /* no broker, so the event loop never confirms the disconnect and the flush timeout applies */
        let done = tokio::time::timeout(FLUSH_TIMEOUT * 2, mqtt.start_thread()).await;
        assert!(done.is_ok());
        assert!(mqtt.eventloop.is_none());
    }
}
