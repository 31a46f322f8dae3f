use std::time::Duration;

use cidrq_session::{SessionConfig, DEFAULT_PORT};
use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod lookup;
pub mod probe;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Look up one or more IPv4 addresses.
    Lookup(LookupArgs),
    /// Connect and print the parameters the service announces.
    Probe(ProbeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, service: &ServiceArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Lookup(args) => lookup::run(args, service, format),
        Command::Probe(args) => probe::run(args, service, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the lookup service lives. Shared by every networked command.
#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    /// Lookup service host name or address.
    #[arg(long, env = "CIDRQ_HOST", default_value = "127.0.0.1", global = true)]
    pub host: String,
    /// Lookup service TCP port.
    #[arg(long, env = "CIDRQ_PORT", default_value_t = DEFAULT_PORT, global = true)]
    pub port: u16,
    /// Identification token sent after connecting.
    #[arg(long, env = "CIDRQ_IDENTIFY", hide_env_values = true, global = true)]
    pub identify: Option<String>,
}

impl ServiceArgs {
    /// Session settings with the connect bounded by the command timeout.
    pub fn session_config(&self, timeout: Duration) -> SessionConfig {
        let mut config = SessionConfig::new(self.host.clone(), self.port);
        config.identify = self.identify.clone();
        config.connect_timeout = timeout;
        config
    }

    pub fn endpoint(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[derive(Args, Debug)]
pub struct LookupArgs {
    /// Addresses to look up (dotted quad).
    #[arg(required = true, value_name = "IP")]
    pub ips: Vec<String>,
    /// Give up on unresolved lookups after this long (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Metadata attached to every request; repeatable.
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta)]
    pub meta: Vec<(String, String)>,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_meta(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {input:?}"))?;
    if key.is_empty() {
        return Err("metadata key must not be empty".to_string());
    }
    if input.contains('\0') {
        return Err("metadata must not contain NUL bytes".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

pub fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_timeout_seconds() {
        assert_eq!(parse_timeout("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_timeout("2").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_timeout_millis() {
        assert_eq!(parse_timeout("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_timeout_invalid() {
        assert_eq!(parse_timeout("0s").unwrap_err().code, USAGE);
        assert!(parse_timeout("bad").is_err());
        assert!(parse_timeout("").is_err());
    }

    #[test]
    fn parse_meta_pairs() {
        assert_eq!(
            parse_meta("server=eu-1").unwrap(),
            ("server".to_string(), "eu-1".to_string())
        );
        assert_eq!(
            parse_meta("note=a=b").unwrap(),
            ("note".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_meta("empty=").unwrap().1, "");
        assert!(parse_meta("novalue").is_err());
        assert!(parse_meta("=x").is_err());
    }

    #[test]
    fn endpoint_brackets_ipv6_hosts() {
        let service = ServiceArgs {
            host: "::1".to_string(),
            port: 9595,
            identify: None,
        };
        assert_eq!(service.endpoint(), "[::1]:9595");
        assert_eq!(
            service.session_config(Duration::from_secs(2)).connect_timeout,
            Duration::from_secs(2)
        );
    }
}
