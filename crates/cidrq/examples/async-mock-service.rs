//! The mock service on tokio, using `RecordCodec` with `Framed`.
//!
//! Run with:
//!   cargo run --example async-mock-service --features async -- 9595 10.0.0.0/8

use bytes::Bytes;
use cidrq::frame::RecordCodec;
use cidrq::proto::{Cidr, Established, Message, ResponseOkFound, ResponseOkNotFound};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let port: u16 = args.next().as_deref().unwrap_or("9595").parse()?;
    let ranges = args
        .map(|r| r.parse::<Cidr>())
        .collect::<Result<Vec<_>, _>>()?;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    eprintln!(
        "Serving {} ranges on {}",
        ranges.len(),
        listener.local_addr()?
    );

    loop {
        let (stream, addr) = listener.accept().await?;
        eprintln!("Peer connected: {addr}");
        let ranges = ranges.clone();
        tokio::spawn(async move {
            if let Err(e) = serve(stream, ranges).await {
                eprintln!("Peer {addr} disconnected: {e}");
            }
        });
    }
}

async fn serve(
    stream: TcpStream,
    ranges: Vec<Cidr>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut framed = Framed::new(stream, RecordCodec::new());

    let hello = Message::Established(Established {
        rate_limit: 10,
        tree_size: ranges.len() as u32,
        cache_ttl: 86_400,
        peer_ttl: 15,
        banner: "cidrq async mock service".to_string(),
    });
    framed.send(hello.to_bytes()?).await?;

    while let Some(record) = framed.next().await {
        let record = record?;
        let Ok(Message::Request(request)) = Message::decode(&record.payload) else {
            continue;
        };
        let ip = request.ip_address;
        let reply = match ranges
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
        };
        let payload: Bytes = reply.to_bytes()?;
        framed.send(payload).await?;
    }
    Ok(())
}
