//! A pool of worker threads running [`Processor`]s.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender, TryRecvError};
use intake_statsd::metric;

use crate::batch::{sample_pool, Outputs};
use crate::config::{DogStatsdConfig, InvalidConfig};
use crate::processor::{Packet, Processor};
use crate::statsd::DogStatsdCounters;
use crate::tagger::TagResolver;
use crate::tags::tag_pool;

/// Sending side of the packet queue, handed to listeners.
pub type PacketSender = Sender<Vec<Packet>>;

/// An error returned by [`Server::start`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configuration is invalid.
    #[error("invalid dogstatsd configuration")]
    InvalidConfig(#[from] InvalidConfig),
    /// A worker thread could not be spawned.
    #[error("failed to spawn dogstatsd worker")]
    Spawn(#[source] io::Error),
}

/// Runs the DogStatsD pipeline on a fixed number of worker threads.
///
/// Listeners push groups of packets into a bounded queue obtained from [`Server::sender`]. Each
/// worker owns one [`Processor`] and handles one group at a time. All workers share the tag and
/// sample pools and the [`Outputs`].
#[derive(Debug)]
pub struct Server {
    packets: PacketSender,
    stop: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl Server {
    /// Validates the configuration and spawns the workers.
    pub fn start(
        config: &DogStatsdConfig,
        resolver: Arc<dyn TagResolver>,
        outputs: Outputs,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let (packets, packets_rx) = crossbeam_channel::bounded(config.queue_size);
        let (stop, stop_rx) = crossbeam_channel::bounded(0);

        let tags = tag_pool(config.pool_size);
        let samples = sample_pool(config.batch_size, config.pool_size);
        let grace = config.shutdown_timeout();

        let mut server = Self {
            packets,
            stop: Some(stop),
            workers: Vec::with_capacity(config.workers),
        };

        for id in 0..config.workers {
            let mut processor = Processor::new(
                config,
                resolver.clone(),
                tags.clone(),
                samples.clone(),
                outputs.clone(),
            )?;
            processor.set_stop(stop_rx.clone(), grace);

            let worker = Worker {
                processor,
                packets: packets_rx.clone(),
                stop: stop_rx.clone(),
                grace,
            };

            // Dropping the partially started server stops the spawned workers.
            let handle = thread::Builder::new()
                .name(format!("dogstatsd-worker-{id}"))
                .spawn(move || worker.run())
                .map_err(ServerError::Spawn)?;

            server.workers.push(handle);
        }

        intake_log::info!(workers = config.workers, "dogstatsd workers started");
        Ok(server)
    }

    /// Returns a sender for queueing packets.
    ///
    /// Sending blocks while the queue is full.
    pub fn sender(&self) -> PacketSender {
        self.packets.clone()
    }

    /// Stops the workers and waits for them to exit.
    ///
    /// Workers keep draining queued packets until the shutdown timeout passes, flush their
    /// pending records, and drop whatever is left in the queue. A flush blocked on a full output
    /// channel is interrupted and gets the same shutdown timeout.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Disconnecting the stop channel wakes all workers.
        self.stop.take();

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                intake_log::error!("dogstatsd worker panicked");
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    processor: Processor,
    packets: Receiver<Vec<Packet>>,
    stop: Receiver<()>,
    grace: Duration,
}

impl Worker {
    fn run(mut self) {
        loop {
            // Stopping takes precedence over queued packets, which are drained with a deadline.
            if let Err(TryRecvError::Disconnected) = self.stop.try_recv() {
                break;
            }

            select! {
                recv(self.packets) -> packets => match packets {
                    Ok(packets) => {
                        self.processor.process_packets(&packets);
                    }
                    Err(_) => break,
                },
                recv(self.stop) -> _ => break,
            }
        }

        self.drain();
    }

    fn drain(&mut self) {
        // A flush interrupted by stop has already started the grace period.
        let deadline = self
            .processor
            .deadline()
            .unwrap_or_else(|| Instant::now() + self.grace);
        self.processor.set_deadline(Some(deadline));

        while Instant::now() < deadline {
            match self.packets.try_recv() {
                Ok(packets) => {
                    self.processor.process_packets(&packets);
                }
                Err(_) => break,
            }
        }

        self.processor.flush();

        let dropped: usize = self.packets.try_iter().map(|group| group.len()).sum();
        if dropped > 0 {
            metric!(counter(DogStatsdCounters::PacketsDroppedOnShutdown) += dropped as i64);
            intake_log::warn!(
                dropped,
                "dropping queued dogstatsd packets, shutdown timeout passed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::batch::Receivers;
    use crate::tagger::NoopResolver;

    fn config(workers: usize) -> DogStatsdConfig {
        DogStatsdConfig {
            hostname: "host".to_owned(),
            batch_size: 8,
            workers,
            queue_size: 64,
            pool_size: 16,
            shutdown_timeout: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config() {
        let (outputs, _receivers) = Outputs::bounded(1);
        let config = DogStatsdConfig {
            batch_size: 0,
            ..config(1)
        };

        let result = Server::start(&config, Arc::new(NoopResolver), outputs);
        assert!(matches!(
            result,
            Err(ServerError::InvalidConfig(InvalidConfig::BatchSize))
        ));
    }

    #[test]
    fn test_processes_queued_packets_before_stop() {
        intake_log::init_test!();

        let (outputs, receivers) = Outputs::bounded(1024);
        let server = Server::start(&config(4), Arc::new(NoopResolver), outputs).unwrap();
        let sender = server.sender();

        for group in 0..50 {
            let packets = (0..4)
                .map(|i| Packet::new(format!("m.{group}.{i}:1|c\n_sc|check.{group}.{i}|0")))
                .collect();
            sender.send(packets).unwrap();
        }
        drop(sender);

        server.stop();

        let names: HashSet<_> = receivers
            .samples
            .try_iter()
            .flat_map(|batch| batch.iter().map(|s| s.name.clone()).collect::<Vec<_>>())
            .collect();
        assert_eq!(names.len(), 200);
        assert!(names.contains("m.49.3"));

        let checks: usize = receivers.service_checks.try_iter().map(|g| g.len()).sum();
        assert_eq!(checks, 200);
    }

    #[test]
    fn test_stop_without_traffic() {
        let (outputs, receivers) = Outputs::bounded(1);
        let server = Server::start(&config(2), Arc::new(NoopResolver), outputs).unwrap();
        server.stop();

        assert!(receivers.samples.is_empty());
        assert!(receivers.events.is_empty());
    }

    #[test]
    fn test_stop_with_stalled_outputs() {
        let (outputs, receivers) = Outputs::bounded(1);
        let config = DogStatsdConfig {
            batch_size: 1,
            shutdown_timeout: 1,
            ..config(1)
        };

        let server = Server::start(&config, Arc::new(NoopResolver), outputs).unwrap();
        server
            .sender()
            .send(vec![Packet::new("a:1|c\nb:1|c\nc:1|c")])
            .unwrap();

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            server.stop();
            done_tx.send(()).ok();
        });

        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
        assert_eq!(receivers.samples.len(), 1);
    }

    fn worker(grace: Duration, groups: Vec<Vec<Packet>>) -> (Worker, Receivers) {
        let (outputs, receivers) = Outputs::bounded(64);
        let processor = Processor::new(
            &config(1),
            Arc::new(NoopResolver),
            tag_pool(4),
            sample_pool(8, 4),
            outputs,
        )
        .unwrap();

        let (packets_tx, packets) = crossbeam_channel::unbounded();
        for group in groups {
            packets_tx.send(group).unwrap();
        }

        // A disconnected stop channel signals shutdown right away.
        let (_, stop) = crossbeam_channel::bounded(0);

        let worker = Worker {
            processor,
            packets,
            stop,
            grace,
        };
        (worker, receivers)
    }

    fn groups(count: usize) -> Vec<Vec<Packet>> {
        (0..count)
            .map(|i| vec![Packet::new(format!("m.{i}:1|c\n_e{{1,1}}:a|b"))])
            .collect()
    }

    #[test]
    fn test_drain_within_grace_period() {
        let (worker, receivers) = worker(Duration::from_secs(5), groups(3));
        worker.run();

        let samples: usize = receivers.samples.try_iter().map(|b| b.len()).sum();
        let events: usize = receivers.events.try_iter().map(|g| g.len()).sum();
        assert_eq!(samples, 3);
        assert_eq!(events, 3);
    }

    #[test]
    fn test_zero_grace_drops_queued_packets() {
        intake_log::init_test!();

        let (worker, receivers) = worker(Duration::ZERO, groups(3));
        let captures = intake_statsd::with_capturing_test_client(|| worker.run());

        assert!(receivers.samples.is_empty());
        assert!(receivers.events.is_empty());
        assert_eq!(captures, ["dogstatsd.shutdown_dropped_packets:3|c"]);
    }
}
