use std::time::Instant;

use cidrq_session::{Host, LookupClient, Resolution, SocketState};

use crate::cmd::{parse_timeout, ProbeArgs, ServiceArgs};
use crate::exit::{session_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, TRANSPORT_ERROR};
use crate::output::{print_server_info, OutputFormat};

struct Ignore;

impl Host<()> for Ignore {
    fn on_resolved(&mut self, _requester: &(), _resolution: &Resolution) {}
}

pub fn run(args: ProbeArgs, service: &ServiceArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_timeout(&args.timeout)?;
    let mut client = LookupClient::new(service.session_config(timeout), Ignore)
        .map_err(|err| session_error("probe", err))?;
    let endpoint = service.endpoint();

    client.connect();
    let settled = client.run_until(Instant::now() + timeout, |s| {
        s.server_info().is_some() || s.is_halted() || s.state() == SocketState::Disconnected
    });

    if let Some(info) = client.server_info() {
        print_server_info(&endpoint, info, format);
        client.disconnect();
        return Ok(SUCCESS);
    }
    if let Some(reason) = client.session().halt_reason() {
        return Err(CliError::new(FAILURE, format!("probe halted: {reason}")));
    }
    if !settled {
        return Err(CliError::new(
            TIMEOUT,
            format!("no greeting from {endpoint} within {:?}", timeout),
        ));
    }
    let reason = client
        .session()
        .last_error()
        .unwrap_or("connection closed by service");
    Err(CliError::new(TRANSPORT_ERROR, format!("probe {endpoint}: {reason}")))
}
