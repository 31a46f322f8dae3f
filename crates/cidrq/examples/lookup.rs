//! Look up addresses against a running service and print each answer as it
//! arrives.
//!
//! Run with:
//!   cargo run --example lookup -- 127.0.0.1 9595 203.0.113.7 192.0.2.1

use std::time::{Duration, Instant};

use cidrq::session::{Host, LookupClient, Resolution, SessionConfig};

struct Print;

impl Host<usize> for Print {
    fn on_resolved(&mut self, index: &usize, resolution: &Resolution) {
        println!("[{index}] {resolution}");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = args.next().as_deref().unwrap_or("9595").parse()?;
    let ips: Vec<String> = args.collect();

    let mut client = LookupClient::new(SessionConfig::new(host, port), Print)?;
    for (index, ip) in ips.iter().enumerate() {
        client.submit(index, ip)?;
    }

    let done = client.run_until(Instant::now() + Duration::from_secs(5), |s| {
        s.queue().outstanding() == 0
    });
    if let Some(info) = client.server_info() {
        eprintln!("Service knows {} ranges", info.tree_size);
    }
    if !done {
        eprintln!(
            "{} lookups unresolved",
            client.session().queue().outstanding()
        );
    }
    Ok(())
}
