use std::fmt;
use std::io;

use cidrq_frame::FrameError;
use cidrq_session::SessionError;
use cidrq_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
/// Could not reach the lookup service, or it dropped the connection.
pub const TRANSPORT_ERROR: i32 = 3;
/// An address argument is not a dotted-quad IPv4 address.
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotFound
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::EmptyHost => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::EmptyHost => CliError::new(USAGE, format!("{context}: {err}")),
        SessionError::InvalidAddress(_) | SessionError::Proto(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        SessionError::NotConnected => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Frame(err) => frame_error(context, err),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_connection_is_a_transport_error() {
        let err = io_error(
            "connect",
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert_eq!(err.to_string(), "connect: refused");
    }

    #[test]
    fn session_errors_map_to_exit_codes() {
        assert_eq!(session_error("x", SessionError::EmptyHost).code, USAGE);
        let invalid = cidrq_proto::parse_ipv4("1.2.3").unwrap_err();
        assert_eq!(
            session_error("x", SessionError::InvalidAddress(invalid)).code,
            DATA_INVALID
        );
        assert_eq!(
            session_error("x", SessionError::Halted("version".into())).code,
            FAILURE
        );
        assert_eq!(
            session_error("x", SessionError::Frame(FrameError::ConnectionClosed)).code,
            TRANSPORT_ERROR
        );
    }
}
