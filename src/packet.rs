// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Test packet descriptions.
//!
//! A [`Packet`] is a template: source and destination are prefixes, and
//! sending it once emits one packet per (source, destination) address pair,
//! network and broadcast addresses included. A destination of `/20` therefore
//! stands for 4096 packets.

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

use crate::{HarnessError, Result};

pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

const DEFAULT_LENGTH: u16 = 64;

/// Largest number of packets one template may expand to (a /12 destination)
pub const MAX_FAN_OUT: u64 = 1 << 20;

/// Parse `a.b.c.d` or `a.b.c.d/len` into a truncated network
pub fn parse_ipv4_prefix(text: &str) -> Option<Ipv4Net> {
    let text = text.trim();
    if text.contains('/') {
        text.parse::<Ipv4Net>().ok().map(|net| net.trunc())
    } else {
        text.parse::<Ipv4Addr>()
            .ok()
            .and_then(|addr| Ipv4Net::new(addr, 32).ok())
    }
}

fn addresses(net: Ipv4Net) -> impl Iterator<Item = Ipv4Addr> + Clone {
    let first = u32::from(net.network());
    let last = u32::from(net.broadcast());
    (first..=last).map(Ipv4Addr::from)
}

/// An IPv4 packet template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub ipv4_src: Ipv4Net,
    pub ipv4_dst: Ipv4Net,
    pub ip_proto: u8,
    /// Bytes accounted per emitted packet
    pub length: u16,
}

impl Packet {
    /// Number of packets one send of this template emits
    pub fn fan_out(&self) -> u64 {
        let size = |net: &Ipv4Net| 1u64 << (32 - u32::from(net.prefix_len()));
        size(&self.ipv4_src).saturating_mul(size(&self.ipv4_dst))
    }

    /// Every concrete (source, destination) pair
    pub fn expand(&self) -> impl Iterator<Item = (Ipv4Addr, Ipv4Addr)> + '_ {
        let dsts = addresses(self.ipv4_dst);
        addresses(self.ipv4_src).flat_map(move |src| dsts.clone().map(move |dst| (src, dst)))
    }
}

/// Builder for [`Packet`]s
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    src: Option<String>,
    dst: Option<String>,
    ip_proto: u8,
    length: u16,
}

impl PacketBuilder {
    /// Plain IP packet (protocol 0)
    pub fn ip() -> Self {
        Self {
            src: None,
            dst: None,
            ip_proto: 0,
            length: DEFAULT_LENGTH,
        }
    }

    pub fn tcp() -> Self {
        Self {
            ip_proto: IPPROTO_TCP,
            ..Self::ip()
        }
    }

    pub fn udp() -> Self {
        Self {
            ip_proto: IPPROTO_UDP,
            ..Self::ip()
        }
    }

    /// Destination first, then source
    pub fn set_ip_layer(mut self, dst: impl Into<String>, src: impl Into<String>) -> Self {
        self.dst = Some(dst.into());
        self.src = Some(src.into());
        self
    }

    pub fn set_proto(mut self, ip_proto: u8) -> Self {
        self.ip_proto = ip_proto;
        self
    }

    pub fn set_length(mut self, length: u16) -> Self {
        self.length = length;
        self
    }

    pub fn build(self) -> Result<Packet> {
        let parse = |field: &str, value: Option<String>| -> Result<Ipv4Net> {
            let value = value.ok_or_else(|| {
                HarnessError::InvalidPacket(format!("{} address not set", field))
            })?;
            parse_ipv4_prefix(&value).ok_or_else(|| {
                HarnessError::InvalidPacket(format!("invalid {} address '{}'", field, value))
            })
        };

        let packet = Packet {
            ipv4_src: parse("source", self.src)?,
            ipv4_dst: parse("destination", self.dst)?,
            ip_proto: self.ip_proto,
            length: self.length,
        };
        if packet.fan_out() > MAX_FAN_OUT {
            return Err(HarnessError::InvalidPacket(format!(
                "{} -> {} expands to {} packets, limit is {}",
                packet.ipv4_src,
                packet.ipv4_dst,
                packet.fan_out(),
                MAX_FAN_OUT
            )));
        }
        Ok(packet)
    }
}
