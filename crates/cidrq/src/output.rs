use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use cidrq_session::{Resolution, ServerInfo};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    Found,
    NotFound,
    Unresolved,
}

impl LookupStatus {
    fn label(self) -> &'static str {
        match self {
            LookupStatus::Found => "found",
            LookupStatus::NotFound => "not found",
            LookupStatus::Unresolved => "unresolved",
        }
    }
}

/// One line of `lookup` output.
#[derive(Serialize, Debug, Clone)]
pub struct LookupRow {
    pub ip: String,
    pub status: LookupStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_len: Option<u32>,
}

impl LookupRow {
    pub fn new(ip: &str, resolution: Option<&Resolution>) -> Self {
        let cidr = resolution.and_then(Resolution::cidr);
        let status = match resolution {
            Some(Resolution::Found { .. }) => LookupStatus::Found,
            Some(Resolution::NotFound { .. }) => LookupStatus::NotFound,
            None => LookupStatus::Unresolved,
        };
        Self {
            ip: ip.to_string(),
            status,
            cidr: cidr.map(|c| c.to_string()),
            prefix: cidr.map(|c| cidrq_proto::format_ipv4(c.prefix)),
            mask_len: cidr.map(|c| c.mask_len),
        }
    }
}

pub fn print_lookups(rows: &[LookupRow], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for row in rows {
                println!(
                    "{}",
                    serde_json::to_string(row).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["IP", "STATUS", "RANGE"]);
            for row in rows {
                table.add_row(vec![
                    row.ip.clone(),
                    row.status.label().to_string(),
                    row.cidr.clone().unwrap_or_else(|| "-".to_string()),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                match &row.cidr {
                    Some(cidr) => println!("{} {} in {}", row.ip, row.status.label(), cidr),
                    None => println!("{} {}", row.ip, row.status.label()),
                }
            }
        }
        OutputFormat::Raw => {
            for row in rows {
                println!("{}", row.cidr.as_deref().unwrap_or("-"));
            }
        }
    }
}

#[derive(Serialize)]
struct ProbeOutput<'a> {
    endpoint: &'a str,
    protocol_version: u8,
    #[serde(flatten)]
    server: &'a ServerInfo,
    timestamp: String,
}

pub fn print_server_info(endpoint: &str, info: &ServerInfo, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ProbeOutput {
                endpoint,
                protocol_version: cidrq_proto::PROTOCOL_VERSION,
                server: info,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"])
                .add_row(vec!["endpoint".to_string(), endpoint.to_string()])
                .add_row(vec!["rate_limit".to_string(), info.rate_limit.to_string()])
                .add_row(vec!["tree_size".to_string(), info.tree_size.to_string()])
                .add_row(vec!["cache_ttl".to_string(), format!("{}s", info.cache_ttl)])
                .add_row(vec!["peer_ttl".to_string(), format!("{}s", info.peer_ttl)])
                .add_row(vec!["banner".to_string(), info.banner.clone()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Lookup Service:");
            println!("  Endpoint:   {endpoint}");
            println!("  Protocol:   v{}", cidrq_proto::PROTOCOL_VERSION);
            println!("  Rate limit: {} per 5s", info.rate_limit);
            println!("  Ranges:     {}", info.tree_size);
            println!("  Cache TTL:  {}s", info.cache_ttl);
            println!("  Peer TTL:   {}s", info.peer_ttl);
            if !info.banner.is_empty() {
                println!("  Banner:     {}", info.banner);
            }
        }
        OutputFormat::Raw => {
            println!("{}", info.banner);
        }
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn found_row_serializes_range() {
        let resolution = Resolution::Found {
            ip: "203.0.113.7".to_string(),
            cidr: "203.0.113.0/24".parse().unwrap(),
        };
        let row = LookupRow::new("203.0.113.7", Some(&resolution));
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["status"], "found");
        assert_eq!(json["cidr"], "203.0.113.0/24");
        assert_eq!(json["prefix"], "203.0.113.0");
        assert_eq!(json["mask_len"], 24);
    }

    #[test]
    fn unresolved_row_omits_range() {
        let row = LookupRow::new("10.0.0.1", None);
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["status"], "unresolved");
        assert!(json.get("cidr").is_none());
    }
}
