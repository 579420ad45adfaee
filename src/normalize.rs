use serde_json::Value;

use crate::scanner::{RawHost, RawProtocol, RawScan};
use crate::types::{HostResult, PortDetail, ProtocolBlock, ScanResult};

/// Shape a raw scan into the stable JSON form returned to clients.
///
/// - Host order is kept as reported.
/// - Ports within each protocol are sorted ascending by number.
/// - Every port's detail map gets a `port` key equal to the number it was listed
///   under, overwriting any value the scanner put there.
pub fn normalize(raw: RawScan) -> ScanResult {
    raw.hosts.into_iter().map(normalize_host).collect()
}

fn normalize_host(host: RawHost) -> HostResult {
    HostResult {
        host: host.host,
        hostname: host.hostname,
        state: host.state,
        protocols: host.protocols.into_iter().map(normalize_protocol).collect(),
    }
}

fn normalize_protocol(proto: RawProtocol) -> ProtocolBlock {
    let mut ports = proto.ports;
    ports.sort_by_key(|p| p.port);
    let ports = ports
        .into_iter()
        .map(|p| {
            let mut detail: PortDetail = p.details;
            detail.insert("port".into(), Value::from(p.port));
            detail
        })
        .collect();
    ProtocolBlock {
        protocol: proto.name,
        ports,
    }
}
