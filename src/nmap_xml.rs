//! Reader for the XML report nmap writes with `-oX -`.
//!
//! Only the elements needed to build a [`RawScan`] are modelled; everything else
//! in the report (timing, OS guesses, run statistics) is skipped.
use quick_xml::de::from_str;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ScanError;
use crate::scanner::{RawHost, RawPort, RawProtocol, RawScan};

#[derive(Debug, Deserialize)]
struct NmapRun {
    #[serde(rename = "host", default)]
    hosts: Vec<NmapHost>,
}

#[derive(Debug, Deserialize)]
struct NmapHost {
    #[serde(default)]
    status: Option<NmapStatus>,
    #[serde(rename = "address", default)]
    addresses: Vec<NmapAddress>,
    #[serde(default)]
    hostnames: Option<NmapHostnames>,
    #[serde(default)]
    ports: Option<NmapPorts>,
}

#[derive(Debug, Deserialize)]
struct NmapStatus {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Debug, Deserialize)]
struct NmapAddress {
    #[serde(rename = "@addr")]
    addr: String,
    #[serde(rename = "@addrtype", default)]
    addr_type: String,
}

#[derive(Debug, Deserialize)]
struct NmapHostnames {
    #[serde(rename = "hostname", default)]
    hostnames: Vec<NmapHostname>,
}

#[derive(Debug, Deserialize)]
struct NmapHostname {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct NmapPorts {
    #[serde(rename = "port", default)]
    ports: Vec<NmapPort>,
}

#[derive(Debug, Deserialize)]
struct NmapPort {
    #[serde(rename = "@protocol")]
    protocol: String,
    #[serde(rename = "@portid")]
    portid: u16,
    state: NmapPortState,
    #[serde(default)]
    service: Option<NmapService>,
    #[serde(rename = "script", default)]
    scripts: Vec<NmapScript>,
}

#[derive(Debug, Deserialize)]
struct NmapPortState {
    #[serde(rename = "@state")]
    state: String,
    #[serde(rename = "@reason", default)]
    reason: String,
}

#[derive(Debug, Default, Deserialize)]
struct NmapService {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@product", default)]
    product: String,
    #[serde(rename = "@version", default)]
    version: String,
    #[serde(rename = "@extrainfo", default)]
    extrainfo: String,
    #[serde(rename = "@conf", default)]
    conf: String,
    #[serde(rename = "cpe", default)]
    cpe: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NmapScript {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@output", default)]
    output: String,
}

/// Parse an nmap XML report into the scanner-native structure.
///
/// - The host key is its IPv4/IPv6 address, falling back to the first address listed.
/// - Hostname prefers a `user` supplied name, then the first name, else empty.
/// - Protocols appear in the order first seen; ports keep report order.
pub fn parse_nmap_xml(xml: &str) -> Result<RawScan, ScanError> {
    let run: NmapRun = from_str(xml).map_err(|e| ScanError::Parse(e.to_string()))?;
    let hosts = run.hosts.into_iter().filter_map(convert_host).collect();
    Ok(RawScan { hosts })
}

fn convert_host(h: NmapHost) -> Option<RawHost> {
    let host = h
        .addresses
        .iter()
        .find(|a| a.addr_type == "ipv4" || a.addr_type == "ipv6")
        .or_else(|| h.addresses.first())?
        .addr
        .clone();

    let names = h.hostnames.map(|n| n.hostnames).unwrap_or_default();
    let hostname = names
        .iter()
        .find(|n| n.kind == "user")
        .or_else(|| names.first())
        .map(|n| n.name.clone())
        .unwrap_or_default();

    let mut protocols: Vec<RawProtocol> = Vec::new();
    for p in h.ports.map(|p| p.ports).unwrap_or_default() {
        let port = RawPort {
            port: p.portid,
            details: port_details(&p),
        };
        match protocols.iter_mut().find(|b| b.name == p.protocol) {
            Some(block) => block.ports.push(port),
            None => protocols.push(RawProtocol {
                name: p.protocol,
                ports: vec![port],
            }),
        }
    }

    Some(RawHost {
        host,
        hostname,
        state: h.status.map(|s| s.state).unwrap_or_default(),
        protocols,
    })
}

fn port_details(p: &NmapPort) -> Map<String, Value> {
    let svc = p.service.as_ref();
    let text = |v: Option<&String>| Value::from(v.map(String::as_str).unwrap_or_default());

    let mut details = Map::new();
    details.insert("state".into(), Value::from(p.state.state.as_str()));
    details.insert("reason".into(), Value::from(p.state.reason.as_str()));
    details.insert("name".into(), text(svc.map(|s| &s.name)));
    details.insert("product".into(), text(svc.map(|s| &s.product)));
    details.insert("version".into(), text(svc.map(|s| &s.version)));
    details.insert("extrainfo".into(), text(svc.map(|s| &s.extrainfo)));
    details.insert("conf".into(), text(svc.map(|s| &s.conf)));
    details.insert("cpe".into(), text(svc.and_then(|s| s.cpe.first())));
    if !p.scripts.is_empty() {
        let scripts: Map<String, Value> = p
            .scripts
            .iter()
            .map(|s| (s.id.clone(), Value::from(s.output.as_str())))
            .collect();
        details.insert("script".into(), Value::Object(scripts));
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<nmaprun scanner="nmap" args="nmap -oX - 192.0.2.1 -sV" start="1700000000" version="7.94">
<scaninfo type="syn" protocol="tcp" numservices="1000" services="1-1000"/>
<verbose level="0"/>
<host starttime="1700000000" endtime="1700000010">
<status state="up" reason="echo-reply" reason_ttl="63"/>
<address addr="192.0.2.1" addrtype="ipv4"/>
<address addr="AA:BB:CC:DD:EE:FF" addrtype="mac" vendor="Acme"/>
<hostnames>
<hostname name="router.lan" type="PTR"/>
<hostname name="gw.example" type="user"/>
</hostnames>
<ports>
<extraports state="closed" count="997"/>
<port protocol="tcp" portid="80"><state state="open" reason="syn-ack" reason_ttl="63"/><service name="http" product="nginx" version="1.24.0" method="probed" conf="10"><cpe>cpe:/a:igor_sysoev:nginx:1.24.0</cpe></service></port>
<port protocol="udp" portid="53"><state state="open" reason="udp-response" reason_ttl="63"/><service name="domain" method="table" conf="3"/></port>
<port protocol="tcp" portid="22"><state state="open" reason="syn-ack" reason_ttl="63"/><service name="ssh" product="OpenSSH" version="9.6" extrainfo="protocol 2.0" method="probed" conf="10"><cpe>cpe:/a:openbsd:openssh:9.6</cpe><cpe>cpe:/o:linux:linux_kernel</cpe></service><script id="ssh-hostkey" output="256 aa:bb (ED25519)"/></port>
</ports>
<times srtt="500" rttvar="100" to="100000"/>
</host>
<host><status state="down" reason="no-response"/><address addr="192.0.2.2" addrtype="ipv4"/><hostnames/></host>
<runstats><finished time="1700000010" elapsed="10.00" exit="success"/><hosts up="1" down="1" total="2"/></runstats>
</nmaprun>"#;

    #[test]
    fn parses_hosts_in_report_order() {
        let scan = parse_nmap_xml(SAMPLE).unwrap();
        assert_eq!(scan.hosts.len(), 2);
        assert_eq!(scan.hosts[0].host, "192.0.2.1");
        assert_eq!(scan.hosts[0].state, "up");
        assert_eq!(scan.hosts[1].host, "192.0.2.2");
        assert_eq!(scan.hosts[1].state, "down");
        assert_eq!(scan.hosts[1].hostname, "");
        assert!(scan.hosts[1].protocols.is_empty());
    }

    #[test]
    fn user_hostname_preferred() {
        let scan = parse_nmap_xml(SAMPLE).unwrap();
        assert_eq!(scan.hosts[0].hostname, "gw.example");
    }

    #[test]
    fn ports_grouped_by_protocol_in_report_order() {
        let host = &parse_nmap_xml(SAMPLE).unwrap().hosts[0];
        let names: Vec<&str> = host.protocols.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["tcp", "udp"]);
        let tcp: Vec<u16> = host.protocols[0].ports.iter().map(|p| p.port).collect();
        assert_eq!(tcp, vec![80, 22]);
    }

    #[test]
    fn port_details_carry_service_facts() {
        let host = &parse_nmap_xml(SAMPLE).unwrap().hosts[0];
        let ssh = &host.protocols[0].ports[1].details;
        assert_eq!(ssh["state"], "open");
        assert_eq!(ssh["reason"], "syn-ack");
        assert_eq!(ssh["name"], "ssh");
        assert_eq!(ssh["product"], "OpenSSH");
        assert_eq!(ssh["extrainfo"], "protocol 2.0");
        assert_eq!(ssh["cpe"], "cpe:/a:openbsd:openssh:9.6");
        assert_eq!(ssh["script"]["ssh-hostkey"], "256 aa:bb (ED25519)");

        let dns = &host.protocols[1].ports[0].details;
        assert_eq!(dns["product"], "");
        assert_eq!(dns["cpe"], "");
        assert!(!dns.contains_key("script"));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_nmap_xml("Starting Nmap ... QUITTING!"),
            Err(ScanError::Parse(_))
        ));
    }
}
