//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! DNS 查询

mod common;

use common::*;
use rux_net::config::UDP_SOCKET_TABLE_SIZE;
use rux_net::dns::{DnsHeader, DNS_FLAG_RD, DNS_HLEN, DNS_PORT};
use rux_net::udp::{UdpHdr, UDP_HLEN};
use rux_net::{IpProtocol, NetError};

#[test]
fn lookup_returns_first_a_record() {
    let mut s = stack();
    assert_eq!(s.dns_lookup("example.com"), Ok(ip(93, 184, 216, 34)));
}

#[test]
fn query_goes_to_configured_server() {
    let mut s = stack();
    s.set_dns_server(ip(1, 1, 1, 1));
    s.dns_lookup("example.com").unwrap();

    let sent = s.device().sent_ip(IpProtocol::IPPROTO_UDP);
    assert_eq!(sent.len(), 1);
    let (ip_hdr, pkt) = &sent[0];
    assert_eq!(ip_hdr.daddr, ip(1, 1, 1, 1));

    let udp = UdpHdr::from_bytes(pkt).unwrap();
    assert_eq!(udp.dest, DNS_PORT);
    // 第一个查询的事务 ID 为 1
    assert_eq!(udp.source, 1024 + 1);

    let query = &pkt[UDP_HLEN..];
    let hdr = DnsHeader::from_bytes(query).unwrap();
    assert_eq!(hdr.id, 1);
    assert_eq!(hdr.flags, DNS_FLAG_RD);
    assert_eq!(hdr.qdcount, 1);
    assert_eq!(&query[DNS_HLEN..], b"\x07example\x03com\x00\x00\x01\x00\x01");
}

#[test]
fn transaction_id_increments() {
    let mut s = stack();
    s.dns_lookup("a.example").unwrap();
    s.dns_lookup("b.example").unwrap();

    let ids: Vec<u16> = s
        .device()
        .sent_ip(IpProtocol::IPPROTO_UDP)
        .iter()
        .map(|(_, pkt)| DnsHeader::from_bytes(&pkt[UDP_HLEN..]).unwrap().id)
        .collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn dotted_quad_needs_no_query() {
    let mut s = stack();
    assert_eq!(s.dns_lookup("192.168.1.20"), Ok(ip(192, 168, 1, 20)));
    assert!(s.device().sent.is_empty());
}

#[test]
fn mismatched_id_is_rejected() {
    let mut s = stack();
    s.device_mut().dns_id_offset = 1;
    assert_eq!(s.dns_lookup("example.com"), Err(NetError::DnsIdMismatch));
}

#[test]
fn empty_answer_section() {
    let mut s = stack();
    s.device_mut().dns_answer = None;
    assert_eq!(s.dns_lookup("nothing.example"), Err(NetError::DnsNoAnswers));
}

#[test]
fn silent_server() {
    let mut s = stack();
    s.device_mut().answer_dns = false;
    assert_eq!(s.dns_lookup("example.com"), Err(NetError::DnsNoResponse));
}

#[test]
fn malformed_name_is_rejected_before_sending() {
    let mut s = stack();
    assert_eq!(s.dns_lookup("bad..name"), Err(NetError::InvalidArgument));
    assert_eq!(s.dns_lookup(""), Err(NetError::InvalidArgument));
    assert!(s.device().sent.is_empty());
}

#[test]
fn lookup_releases_its_socket() {
    let mut s = stack();
    s.dns_lookup("example.com").unwrap();
    s.device_mut().answer_dns = false;
    let _ = s.dns_lookup("example.com");

    for port in 0..UDP_SOCKET_TABLE_SIZE as u16 {
        assert!(s.udp_open(6000 + port).is_ok());
    }
}
