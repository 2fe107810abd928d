//! Nmap XML decoder: one asset draft per host that reported an IPv4
//! address. Discovery without open ports still produces an asset — a host
//! on the network is attack surface even when nothing answered.

use posture_types::AssetDraft;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::IngestError;

#[derive(Default)]
struct HostAcc {
    ip: Option<String>,
    hostname: Option<String>,
    os: Option<String>,
    ports: Vec<u16>,
    services: Vec<String>,
}

#[derive(Default)]
struct PortAcc {
    number: Option<u16>,
    tcp: bool,
    open: bool,
    service: Option<String>,
}

/// Decode an nmap XML report into asset drafts.
pub fn decode_nmap_xml(content: &str) -> Result<Vec<AssetDraft>, IngestError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut drafts = Vec::new();
    let mut host: Option<HostAcc> = None;
    let mut port: Option<PortAcc> = None;
    let mut host_index: usize = 0;

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) => match e.name().as_ref() {
                b"host" => host = Some(HostAcc::default()),
                b"port" => {
                    if host.is_some() {
                        port = Some(port_from_attrs(&e)?);
                    }
                }
                _ => capture_leaf(&e, &mut host, &mut port)?,
            },
            Event::Empty(e) => capture_leaf(&e, &mut host, &mut port)?,
            Event::End(e) => match e.name().as_ref() {
                b"port" => {
                    if let (Some(h), Some(p)) = (host.as_mut(), port.take()) {
                        if p.tcp && p.open {
                            if let Some(number) = p.number {
                                h.ports.push(number);
                            }
                            if let Some(service) = p.service {
                                h.services.push(service);
                            }
                        }
                    }
                }
                b"host" => {
                    host_index += 1;
                    if let Some(h) = host.take() {
                        if let Some(draft) = finish_host(h, host_index) {
                            drafts.push(draft);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(drafts)
}

/// Attribute-only elements inside a host: address, hostname, state,
/// service, osmatch.
fn capture_leaf(
    e: &BytesStart<'_>,
    host: &mut Option<HostAcc>,
    port: &mut Option<PortAcc>,
) -> Result<(), IngestError> {
    let Some(h) = host.as_mut() else {
        return Ok(());
    };
    match e.name().as_ref() {
        b"address" => {
            if attr(e, b"addrtype")?.as_deref() == Some("ipv4") {
                if let Some(addr) = attr(e, b"addr")? {
                    h.ip = Some(addr);
                }
            }
        }
        b"hostname" => {
            if h.hostname.is_none() {
                h.hostname = attr(e, b"name")?;
            }
        }
        b"osmatch" => {
            if h.os.is_none() {
                h.os = attr(e, b"name")?;
            }
        }
        b"state" => {
            if let Some(p) = port.as_mut() {
                p.open = attr(e, b"state")?.as_deref() == Some("open");
            }
        }
        b"service" => {
            if let Some(p) = port.as_mut() {
                if p.service.is_none() {
                    p.service = attr(e, b"name")?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn port_from_attrs(e: &BytesStart<'_>) -> Result<PortAcc, IngestError> {
    let tcp = attr(e, b"protocol")?.as_deref() == Some("tcp");
    let number = attr(e, b"portid")?.and_then(|v| v.parse::<u16>().ok());
    Ok(PortAcc {
        number,
        tcp,
        open: false,
        service: None,
    })
}

fn finish_host(h: HostAcc, index: usize) -> Option<AssetDraft> {
    let ip = h.ip?;
    let name = h.hostname.clone().unwrap_or_else(|| format!("host-{index}"));
    Some(AssetDraft {
        name: name.clone(),
        asset_type: None,
        ip_address: Some(ip),
        hostname: Some(name),
        ports: h.ports,
        services: h.services,
        operating_system: Some(h.os.unwrap_or_else(|| "Unknown".to_string())),
        criticality: None,
        exposure_score: None,
    })
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, IngestError> {
    for attribute in e.attributes() {
        let attribute = attribute.map_err(malformed)?;
        if attribute.key.as_ref() == key {
            let value = attribute.unescape_value().map_err(malformed)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn malformed(e: impl std::fmt::Display) -> IngestError {
    IngestError::MalformedInput {
        format: "nmap-xml",
        message: e.to_string(),
    }
}
