use std::time::Duration;
use log::{debug, error, info, warn};
use tokio::io::AsyncBufRead;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{unbounded_channel, Sender, UnboundedReceiver, UnboundedSender};

use crate::config::{InfluxConfig, TelegramConfig};
use crate::diagnostics::STATS;
use crate::mqtt::{PublishData, Transmission};

pub mod dispatch;
pub mod obis_parser;
pub mod resolver;
pub mod source;
pub mod structs;
pub mod transform;

use dispatch::{DispatchEngine, DispatchOutcome};
use source::{AcquisitionError, Telegram, TelegramReader};

pub const STATS_TOPIC: &str = "/debug/stats";

/// Forwards every acquisition result until the source ends or the
/// receiving side is gone
async fn read_source<R>(mut reader: TelegramReader<R>, tx: UnboundedSender<Result<Telegram, AcquisitionError>>)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let result = reader.read_telegram().await;
        let last = matches!(result, Err(AcquisitionError::EndOfStream) | Err(AcquisitionError::Io(_)));
        if tx.send(result).is_err() || last {
            break;
        }
    }
}

/// The latest telegram read since the last tick
#[derive(Default)]
struct Newest {
    telegram: Option<Telegram>,
    skipped: usize,
    source_closed: bool,
}

impl Newest {
    fn accept(&mut self, result: Result<Telegram, AcquisitionError>) {
        match result {
            Ok(telegram) => {
                if self.telegram.replace(telegram).is_some() {
                    self.skipped += 1;
                    debug!("Dropping an older telegram, {} skipped so far", self.skipped);
                }
            }
            Err(AcquisitionError::EndOfStream) => self.source_closed = true,
            Err(e @ AcquisitionError::ChecksumMismatch { .. }) => {
                STATS.record_checksum_failure();
                warn!("Dropping telegram: {}", e);
            }
            Err(e) => error!("Telegram acquisition failed: {}", e),
        }
    }

    fn merge(&mut self, later: Newest) {
        if let Some(telegram) = later.telegram {
            self.accept(Ok(telegram));
        }
        self.skipped += later.skipped;
        self.source_closed |= later.source_closed;
    }
}

fn drain_results(rx: &mut UnboundedReceiver<Result<Telegram, AcquisitionError>>) -> Newest {
    let mut newest = Newest::default();
    loop {
        match rx.try_recv() {
            Ok(result) => newest.accept(result),
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                newest.source_closed = true;
                break;
            }
        }
    }
    newest
}

/// Reads telegrams from the meter and hands the results to the MQTT thread
pub struct P1Manager {
    sender: Sender<Transmission>,
    engine: DispatchEngine,
    telegram: TelegramConfig,
    influx: InfluxConfig,
}

impl P1Manager {
    pub fn new(sender: Sender<Transmission>, engine: DispatchEngine, telegram: TelegramConfig, influx: InfluxConfig) -> Self {
        Self { sender, engine, telegram, influx }
    }

    /// Reads the source continuously in its own task, so the meter's output
    /// never piles up in the device buffer. Every `interval` the newest
    /// complete telegram is dispatched and older ones are dropped.
    pub async fn start_thread<R>(&mut self, reader: TelegramReader<R>)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        info!("Starting P1 telegram thread, {} metrics enabled", self.engine.registry().len());

        let (tx, mut rx) = unbounded_channel();
        let source = tokio::spawn(read_source(reader, tx));

        let timeout = Duration::from_secs(self.telegram.timeout());
        let mut interval = tokio::time::interval(Duration::from_secs(self.telegram.interval));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let mut newest = drain_results(&mut rx);
            if newest.telegram.is_none() && !newest.source_closed {
                match tokio::time::timeout(timeout, rx.recv()).await {
                    Ok(Some(result)) => {
                        newest.accept(result);
                        /* the reader may have queued more while we were waiting */
                        newest.merge(drain_results(&mut rx));
                    }
                    Ok(None) => newest.source_closed = true,
                    Err(_) => {
                        STATS.record_timeout();
                        warn!("No telegram within {} seconds", timeout.as_secs());
                        self.notify("telegram timeout").await;
                    }
                }
            }

            if let Some(telegram) = newest.telegram.take() {
                self.handle_telegram(&telegram).await;
            }
            if newest.source_closed {
                info!("Telegram source closed, stopping P1 thread");
                self.notify("telegram source closed").await;
                break;
            }
        }

        source.abort();
    }

    pub async fn handle_telegram(&self, telegram: &Telegram) {
        let outcome = self.engine.process_telegram(&telegram.lines);
        debug!("Telegram {:?}: {} publish requests, {} diagnostics",
               outcome.header, outcome.publish.len(), outcome.diagnostics.len());

        for diagnostic in &outcome.diagnostics {
            diagnostic.log();
        }
        STATS.record_telegram(outcome.publish.len(), outcome.record.is_some(), &outcome.diagnostics);

        self.emit(outcome).await;

        match serde_json::to_string(&STATS.snapshot()) {
            Ok(payload) => self.publish(STATS_TOPIC.to_string(), payload, true).await,
            Err(e) => error!("Unable to serialize statistics: {}", e),
        }
    }

    async fn emit(&self, outcome: DispatchOutcome) {
        for request in outcome.publish {
            self.publish(request.path, request.payload, false).await;
        }

        if !self.influx.enabled {
            return;
        }
        if let Some(record) = outcome.record {
            self.publish(self.influx.topic.clone(), record.to_line(), false).await;
        }
    }

    async fn publish(&self, topic: String, payload: String, retain: bool) {
        let p = Transmission::Publish(PublishData {
            topic,
            payload,
            qos: 0,
            retain,
        });
        if self.sender.send(p).await.is_err() {
            error!("MQTT thread is gone, dropping message");
        }
    }

    async fn notify(&self, message: &str) {
        let _ = self.sender.send(Transmission::Notify(message.to_string())).await;
    }
}
