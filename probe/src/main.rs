use std::{net::IpAddr, time::Duration};

use anyhow::{anyhow, Result};
use clap::Parser;
use common::{interface_to_ipaddr, Logger};

mod args;
mod logger;
mod packet;
mod session;
mod stats;
mod transport;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let opts = args::Opts::parse();

    let dst_addr = match opts.dst_addr {
        IpAddr::V4(addr) => addr,
        IpAddr::V6(_) => {
            return Err(anyhow!("IPv6 is not supported yet"));
        }
    };

    if let Some(iface) = opts.iface.as_deref() {
        let src_addr = interface_to_ipaddr(iface)?;
        println!("probing from {} ({})", src_addr, iface);
    }

    let logger = match opts.file.as_deref() {
        Some(path) => Some(Logger::<logger::ProbeRecord>::new(path).await?),
        None => None,
    };

    let config = session::ProbeConfig {
        count: opts.count,
        timeout: Duration::from_millis(opts.timeout),
        interval: Duration::from_millis(opts.interval),
        payload_len: opts.len,
        verbose: opts.verbose,
    };

    let transport = transport::IcmpTransport::new(opts.iface.as_deref())?;
    let session = session::ProbeSession::new(transport, dst_addr, config, logger);
    session.run().await?;

    Ok(())
}
