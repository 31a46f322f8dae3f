//! Tiny lookup service for local testing. Answers from the ranges given on
//! the command line.
//!
//! Run with:
//!   cargo run --example mock-service -- 9595 203.0.113.0/24 10.0.0.0/8
//!
//! In another terminal:
//!   cargo run --features cli -- --port 9595 lookup 203.0.113.7 192.0.2.1

use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::thread;

use cidrq::frame::{RecordReader, RecordWriter};
use cidrq::proto::{
    Cidr, Established, Message, ResponseError, ResponseOkFound, ResponseOkNotFound,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let port: u16 = args.next().as_deref().unwrap_or("9595").parse()?;
    let ranges = args
        .map(|r| r.parse::<Cidr>())
        .collect::<Result<Vec<_>, _>>()?;

    let listener = TcpListener::bind(("127.0.0.1", port))?;
    eprintln!(
        "Serving {} ranges on {}",
        ranges.len(),
        listener.local_addr()?
    );

    for stream in listener.incoming() {
        let stream = stream?;
        let ranges = ranges.clone();
        thread::spawn(move || {
            if let Err(e) = serve(stream, &ranges) {
                eprintln!("Peer disconnected: {e}");
            }
        });
    }
    Ok(())
}

fn serve(stream: TcpStream, ranges: &[Cidr]) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Peer connected: {}", stream.peer_addr()?);
    let mut reader = RecordReader::new(BufReader::new(stream.try_clone()?));
    let mut writer = RecordWriter::new(BufWriter::new(stream));

    let hello = Message::Established(Established {
        rate_limit: 10,
        tree_size: ranges.len() as u32,
        cache_ttl: 86_400,
        peer_ttl: 15,
        banner: "cidrq mock service".to_string(),
    });
    writer.send(&hello.to_bytes()?)?;

    loop {
        let record = reader.read_record()?;
        let reply = match Message::decode(&record.payload) {
            Ok(Message::Request(request)) => {
                let ip = request.ip_address;
                // Longest prefix wins.
                match ranges
                    .iter()
                    .filter(|cidr| cidr.contains(ip))
                    .max_by_key(|cidr| cidr.mask_len)
                {
                    Some(cidr) => Message::ResponseOkFound(ResponseOkFound {
                        ip_address: ip,
                        prefix: cidr.prefix,
                        mask_len: cidr.mask_len,
                    }),
                    None => Message::ResponseOkNotFound(ResponseOkNotFound { ip_address: ip }),
                }
            }
            Ok(Message::Identify(identify)) => {
                eprintln!("Peer identified as {:?}", identify.id);
                continue;
            }
            Ok(other) => {
                eprintln!("Ignoring {}", other.variant().name());
                continue;
            }
            Err(e) => Message::ResponseError(ResponseError {
                code: 0,
                message: e.to_string(),
            }),
        };
        writer.send(&reply.to_bytes()?)?;
    }
}
