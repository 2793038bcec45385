use std::{
    io,
    net::Ipv4Addr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use common::Logger;
use tokio::time::Instant;

use crate::{
    logger::ProbeRecord,
    packet::{self, EchoReply},
    stats::{self, Report},
    transport::{Received, Transport, TransportError},
};

const RECV_BUF_LEN: usize = 1500;

/// Knobs for one probing session. The payload length is advisory: it is
/// reported in the banner but the packet builder only ever emits the
/// 8-byte timestamp payload.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub count: u64,
    pub timeout: Duration,
    pub interval: Duration,
    pub payload_len: usize,
    pub verbose: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            count: 20,
            timeout: Duration::from_secs(1),
            interval: Duration::from_millis(120),
            payload_len: 160,
            verbose: false,
        }
    }
}

/// Terminal outcome of one probe. Stale or undecodable datagrams are not
/// terminal; the wait keeps reading until the budget runs out.
enum Outcome {
    Correlated {
        rtt: f64,
        size: usize,
        reply: EchoReply,
    },
    TimedOut,
}

/// Drives the send/receive loop for a fixed probe count against one
/// destination. Counters and samples are owned here exclusively and are
/// constructed fresh per session.
pub struct ProbeSession<T> {
    transport: T,
    dst: Ipv4Addr,
    config: ProbeConfig,
    logger: Option<Logger<ProbeRecord>>,
    /// Probes sent, incremented once per loop iteration whatever the
    /// outcome
    sent: u64,
    /// Probes whose reply matched the outstanding sequence number
    received: u64,
    /// Round-trip times in seconds, one per correlated probe, in probe
    /// order
    samples: Vec<f64>,
}

impl<T: Transport> ProbeSession<T> {
    pub fn new(
        transport: T,
        dst: Ipv4Addr,
        config: ProbeConfig,
        logger: Option<Logger<ProbeRecord>>,
    ) -> ProbeSession<T> {
        ProbeSession {
            transport,
            dst,
            config,
            logger,
            sent: 0,
            received: 0,
            samples: Vec::new(),
        }
    }

    /// Run the session to completion and aggregate the report. Only a
    /// transport failure aborts early; every other condition is absorbed
    /// into the statistics.
    pub async fn run(mut self) -> Result<Report, TransportError> {
        println!(
            "Pinging {} with {} bytes of data",
            self.dst, self.config.payload_len
        );
        println!(
            "count {}, interval {} ms, timeout {} ms",
            self.config.count,
            self.config.interval.as_millis(),
            self.config.timeout.as_millis()
        );

        let mut buf = [0u8; RECV_BUF_LEN];
        while self.sent < self.config.count {
            self.sent += 1;
            let sequence = (self.sent - 1) as u16;
            let send_timestamp = unix_now();
            let request = packet::build_echo_request(sequence, send_timestamp);
            let sent_at = Instant::now();
            self.transport.send(&request, self.dst).await?;

            match self.await_reply(&mut buf, sequence, sent_at).await? {
                Outcome::Correlated { rtt, size, reply } => {
                    self.received += 1;
                    self.samples.push(rtt);
                    self.record(&reply, rtt, size, send_timestamp)
                        .await
                        .map_err(TransportError::from)?;
                }
                Outcome::TimedOut => {}
            }
            tokio::time::sleep(self.config.interval).await;
        }

        let report = stats::aggregate(self.sent, self.received, &self.samples);
        println!("\n--- {} ping statistics ---", self.dst);
        println!(
            "{} packets transmitted, {} received",
            self.sent, self.received
        );
        println!("{}", report);
        Ok(report)
    }

    /// Wait for the reply to `sequence`. A reply carrying another probe's
    /// sequence number, or a datagram too short to parse, is discarded
    /// and the wait continues on the remaining budget, so a stale reply
    /// cannot swallow the window of the real one.
    async fn await_reply(
        &mut self,
        buf: &mut [u8],
        sequence: u16,
        sent_at: Instant,
    ) -> Result<Outcome, TransportError> {
        let deadline = sent_at + self.config.timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(Outcome::TimedOut);
            }
            match self.transport.recv(buf, deadline - now).await? {
                Received::TimedOut => return Ok(Outcome::TimedOut),
                Received::Datagram(len) => {
                    let reply = match EchoReply::parse(&buf[..len]) {
                        Ok(reply) => reply,
                        Err(err) => {
                            if self.config.verbose {
                                println!("discarding reply: {}", err);
                            }
                            continue;
                        }
                    };
                    if reply.sequence != sequence {
                        println!(
                            "received reply for seq {} while waiting for {}",
                            reply.sequence, sequence
                        );
                        continue;
                    }
                    let rtt = (Instant::now() - sent_at).as_secs_f64();
                    return Ok(Outcome::Correlated {
                        rtt,
                        size: len.saturating_sub(20),
                        reply,
                    });
                }
            }
        }
    }

    async fn record(
        &mut self,
        reply: &EchoReply,
        rtt: f64,
        size: usize,
        send_timestamp: f64,
    ) -> io::Result<()> {
        if self.config.verbose {
            println!("{:?}", reply);
        }
        let result = ProbeRecord {
            seq: reply.sequence,
            rtt_ms: rtt * 1000.0,
            ttl: reply.ttl,
            size,
            from: reply.source.to_string(),
            dst_addr: self.dst.to_string(),
            send_timestamp,
        };
        match self.logger.as_mut() {
            Some(logger) => logger.log(&result).await?,
            None => println!(
                "{} bytes from {}: icmp_seq={} ttl={} time={:.3} ms",
                result.size, result.from, result.seq, result.ttl, result.rtt_ms
            ),
        }
        Ok(())
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}
