use common::Logging;

/// One correlated probe, as a row in the results file.
#[derive(Debug, Clone)]
pub struct ProbeRecord {
    pub seq: u16,
    pub rtt_ms: f64,
    pub ttl: u8,
    pub size: usize,
    pub from: String,
    pub dst_addr: String,
    pub send_timestamp: f64,
}

impl Logging for ProbeRecord {
    fn header() -> &'static str {
        "seq,rtt_ms,ttl,bytes,from,dst_addr,send_timestamp"
    }

    fn row(&self) -> String {
        format!(
            "{},{:.3},{},{},{},{},{}",
            self.seq, self.rtt_ms, self.ttl, self.size, self.from, self.dst_addr,
            self.send_timestamp
        )
    }
}
