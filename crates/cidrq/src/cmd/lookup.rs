use std::time::Instant;

use cidrq_session::{Host, LookupClient, Resolution, SocketState};
use tracing::{debug, warn};

use crate::cmd::{parse_timeout, LookupArgs, ServiceArgs};
use crate::exit::{
    session_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS, TIMEOUT, TRANSPORT_ERROR,
};
use crate::output::{print_lookups, LookupRow, OutputFormat};

/// Collects answers by argument position.
struct Collector {
    results: Vec<Option<Resolution>>,
}

impl Host<usize> for Collector {
    fn on_resolved(&mut self, requester: &usize, resolution: &Resolution) {
        if let Some(slot) = self.results.get_mut(*requester) {
            *slot = Some(resolution.clone());
        }
    }
}

pub fn run(args: LookupArgs, service: &ServiceArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_timeout(&args.timeout)?;

    // Reject bad addresses before opening a connection.
    for ip in &args.ips {
        cidrq_proto::parse_ipv4(ip)
            .map_err(|err| CliError::new(DATA_INVALID, format!("invalid address {ip:?}: {err}")))?;
    }

    let collector = Collector {
        results: vec![None; args.ips.len()],
    };
    let mut client = LookupClient::new(service.session_config(timeout), collector)
        .map_err(|err| session_error("lookup", err))?;

    for (index, ip) in args.ips.iter().enumerate() {
        let outcome = client
            .submit_with_meta(index, ip, args.meta.iter().cloned())
            .map_err(|err| session_error("lookup", err))?;
        debug!(ip = %ip, ?outcome, "lookup submitted");
    }

    let deadline = Instant::now() + timeout;
    let settled = client.run_until(deadline, |s| {
        s.queue().outstanding() == 0 || s.is_halted() || s.state() == SocketState::Disconnected
    });

    let rows: Vec<LookupRow> = args
        .ips
        .iter()
        .zip(&client.host().results)
        .map(|(ip, resolution)| LookupRow::new(ip, resolution.as_ref()))
        .collect();

    let session = client.session();
    if let Some(reason) = session.halt_reason() {
        return Err(CliError::new(FAILURE, format!("lookup halted: {reason}")));
    }
    if session.queue().outstanding() > 0 {
        if !settled {
            print_lookups(&rows, format);
            warn!(
                outstanding = session.queue().outstanding(),
                "lookups still unresolved at deadline"
            );
            return Ok(TIMEOUT);
        }
        let reason = session
            .last_error()
            .unwrap_or("connection closed by service");
        return Err(CliError::new(
            TRANSPORT_ERROR,
            format!("lookup service {}: {reason}", service.endpoint()),
        ));
    }

    print_lookups(&rows, format);
    client.disconnect();
    Ok(SUCCESS)
}
