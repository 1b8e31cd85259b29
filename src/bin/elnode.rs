//! `elnode`: a minimal ECHONET Lite node binary wiring [`Node`] to a
//! concrete device list and local interface from CLI flags.

use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use echonet_lite_node::{Eoj, Node, NodeConfig};
use log::info;

/// Run a single ECHONET Lite node serving one or more instances of a
/// device class.
#[derive(Debug, Parser)]
#[command(name = "elnode", version, about)]
struct Args {
    /// Class group code of the served device class, e.g. 0x02 (housing/
    /// facilities).
    #[arg(long, value_parser = parse_hex_u8, env = "ELNODE_CLASS_GROUP")]
    class_group: u8,

    /// Class code within the group, e.g. 0x90 (general lighting).
    #[arg(long, value_parser = parse_hex_u8, env = "ELNODE_CLASS")]
    class: u8,

    /// Number of instances of the class to serve, numbered 1..=N.
    #[arg(long, default_value_t = 1, env = "ELNODE_INSTANCES")]
    instances: u8,

    /// Local IPv4 address to bind and to select as the multicast egress
    /// interface. Autodetected via a UDP route probe when unset.
    #[arg(long, env = "ELNODE_LOCAL_ADDR")]
    local_addr: Option<Ipv4Addr>,

    /// 6-byte MAC address as 12 hex digits, e.g. 001122334455. Defaults to
    /// an address derived from `local_addr` when unset.
    #[arg(long, value_parser = parse_mac, env = "ELNODE_MAC")]
    mac: Option<[u8; 6]>,

    /// 3-byte maker code as 6 hex digits. Defaults to the unassigned code
    /// 000077.
    #[arg(long, value_parser = parse_maker_code, default_value = "000077", env = "ELNODE_MAKER_CODE")]
    maker_code: [u8; 3],
}

fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(s, 16).map_err(|e| e.to_string())
}

fn parse_mac(s: &str) -> Result<[u8; 6], String> {
    let bytes = hex_bytes(s)?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| format!("expected 12 hex digits, got {}", v.len() * 2))
}

fn parse_maker_code(s: &str) -> Result<[u8; 3], String> {
    let bytes = hex_bytes(s)?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| format!("expected 6 hex digits, got {}", v.len() * 2))
}

fn hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err("odd number of hex digits".to_string());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

fn derived_mac(local_addr: Ipv4Addr) -> [u8; 6] {
    let octets = local_addr.octets();
    [0x02, 0x00, octets[0], octets[1], octets[2], octets[3]]
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let device_eojs: Vec<Eoj> = (1..=args.instances.max(1))
        .map(|instance| Eoj::new(args.class_group, args.class, instance))
        .collect();

    let config = match args.local_addr {
        Some(local_addr) => {
            let mac = args.mac.unwrap_or_else(|| derived_mac(local_addr));
            NodeConfig::new(device_eojs.clone(), local_addr, mac)
        }
        None => {
            let mut config = NodeConfig::autodetect(device_eojs.clone(), [0u8; 6])
                .context("failed to autodetect local network address")?;
            config.mac = args.mac.unwrap_or_else(|| derived_mac(config.local_addr));
            config
        }
    }
    .with_maker_code(args.maker_code);
    let local_addr = config.local_addr;

    let node = Arc::new(Node::new(config));
    node.begin(None, None, None)
        .await
        .context("failed to start ECHONET Lite node")?;

    info!(
        "elnode running: serving {} instance(s) of class {:02X}{:02X} on {}",
        device_eojs.len(),
        args.class_group,
        args.class,
        local_addr
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    Ok(())
}
