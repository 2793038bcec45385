use std::net::IpAddr;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Opts {
    /// Destination address to probe
    #[arg(long, short)]
    pub dst_addr: IpAddr,
    /// Number of echo requests to send
    #[arg(long, short, default_value_t = 20)]
    pub count: u64,
    /// Per-probe reply timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub timeout: u64,
    /// Pause between probes in milliseconds
    #[arg(long, default_value_t = 120)]
    pub interval: u64,
    /// Advisory payload size in bytes; the wire packet always carries the
    /// 8-byte send timestamp as its payload
    #[arg(long, short, default_value_t = 160)]
    pub len: usize,
    /// Interface to bind the ICMP socket to
    #[arg(long, short)]
    pub iface: Option<String>,
    /// Write per-probe results to a CSV file instead of stdout
    #[arg(long, short)]
    pub file: Option<String>,
    /// Dump each parsed reply
    #[arg(long, short)]
    pub verbose: bool,
}
