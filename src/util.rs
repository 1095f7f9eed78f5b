use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::ha::records::parse_node_list;

const HUB_PORT: &str = "HUB_PORT";

const DEFAULT_PORT: u16 = 9876;

pub fn get_default_port() -> u16 {
    DEFAULT_PORT
}

pub fn get_port() -> Option<u16> {
    std::env::var(HUB_PORT).ok().and_then(|res| res.parse().ok())
}

const HUB_ADDR: &str = "HUB_ADDR";

const DEFAULT_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0));

pub fn get_default_addr() -> IpAddr {
    DEFAULT_ADDR
}

pub fn get_addr() -> Option<IpAddr> {
    std::env::var(HUB_ADDR).ok().and_then(|res| res.parse().ok())
}

const HUB_DATABASE: &str = "HUB_DATABASE";

pub fn get_database() -> Option<PathBuf> {
    std::env::var(HUB_DATABASE)
        .ok()
        .filter(|res| !res.trim().is_empty())
        .map(PathBuf::from)
}

const HA_MASTER: &str = "HA_MASTER";

/// `HA_MASTER=true` makes this node the replication master
pub fn get_ha_master() -> Option<bool> {
    std::env::var(HA_MASTER).ok().map(|res| parse_flag(&res))
}

const HA_MASTER_IP: &str = "HA_MASTER_IP";

pub fn get_ha_master_ip() -> Option<String> {
    std::env::var(HA_MASTER_IP)
        .ok()
        .filter(|res| !res.trim().is_empty())
}

const HA_NODE: &str = "HA_NODE";

/// Comma separated `ip:port` peers
pub fn get_ha_nodes() -> Option<Vec<String>> {
    std::env::var(HA_NODE).ok().map(|res| parse_node_list(&res))
}

const HA_UNSAFE: &str = "HA_UNSAFE";

pub fn get_ha_unsafe() -> Option<bool> {
    std::env::var(HA_UNSAFE).ok().map(|res| parse_flag(&res))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
