//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 集成测试用的对端设备
//!
//! `Peer` 作为协议栈的 `NetDevice`，站在链路的另一端：记录协议栈发出的
//! 每一帧，并像一台主机兼路由器那样立即把应答放进接收队列。
//! - ARP: 回答询问 `PEER_IP` 的请求
//! - ICMP: 回答回显请求
//! - UDP: 端口 7 回显，端口 53 回答 DNS 查询
//! - TCP: 回答 SYN，确认数据和 FIN

#![allow(dead_code)]

use std::collections::VecDeque;

use rux_net::arp::{ArpOp, ArpPacket, ARP_PLEN};
use rux_net::buffer::FrameBuf;
use rux_net::dns::{skip_name, DnsHeader, DNS_HLEN};
use rux_net::ethernet::{eth_push_header, EthHdr, ETH_HLEN};
use rux_net::ipv4::checksum::ip_checksum;
use rux_net::ipv4::{ip_build_frame, IpHdr};
use rux_net::tcp::{tcp_build_segment, TcpFlags, TcpHdr, TCP_MIN_HLEN};
use rux_net::udp::{UdpHdr, UDP_HLEN};
use rux_net::{
    DeviceStats, EthProtocol, InAddr, IpProtocol, MacAddr, NetDevice, NetError, NetStack,
    StepClock,
};

/// 协议栈的默认地址
pub const HOST_IP: InAddr = 0x0A00_0001;
pub const HOST_MAC: MacAddr = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];

/// 对端 (同时是默认网关)
pub const PEER_IP: InAddr = 0x0A00_0002;
pub const PEER_MAC: MacAddr = [0x52, 0x54, 0x00, 0xAA, 0xBB, 0xCC];

/// 对端 TCP 的初始序列号
pub const PEER_ISN: u32 = 5000;

/// 对端的回显端口
pub const ECHO_PORT: u16 = 7;

pub fn ip(a: u8, b: u8, c: u8, d: u8) -> InAddr {
    u32::from_be_bytes([a, b, c, d])
}

/// 对端看到的 TCP 连接
#[derive(Debug, Clone, Copy)]
pub struct PeerConn {
    pub host_port: u16,
    pub peer_port: u16,
    pub host_ip: InAddr,
    pub peer_ip: InAddr,
    pub host_mac: MacAddr,
    /// 对端下一个要发送的序列号
    pub peer_seq: u32,
    /// 期望协议栈发送的下一个序列号
    pub host_next: u32,
}

pub struct Peer {
    rx: VecDeque<Vec<u8>>,
    /// 协议栈发出的全部帧
    pub sent: Vec<Vec<u8>>,
    pub answer_arp: bool,
    pub answer_icmp: bool,
    pub answer_tcp: bool,
    pub refuse_tcp: bool,
    /// SYN|ACK 之后紧跟着发出的数据，随后立即发 FIN
    pub synack_burst: Option<Vec<u8>>,
    pub answer_dns: bool,
    /// DNS 应答中的地址；None 时应答不带记录
    pub dns_answer: Option<InAddr>,
    /// 加到应答事务 ID 上的偏移
    pub dns_id_offset: u16,
    pub conn: Option<PeerConn>,
    /// TCP 收到的数据
    pub tcp_data: Vec<u8>,
    pub fin_seen: bool,
    stats: DeviceStats,
}

impl Peer {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            sent: Vec::new(),
            answer_arp: true,
            answer_icmp: true,
            answer_tcp: true,
            refuse_tcp: false,
            synack_burst: None,
            answer_dns: true,
            dns_answer: Some(ip(93, 184, 216, 34)),
            dns_id_offset: 0,
            conn: None,
            tcp_data: Vec::new(),
            fin_seen: false,
            stats: DeviceStats::default(),
        }
    }

    /// 直接把一帧放进协议栈的接收队列
    pub fn inject(&mut self, frame: Vec<u8>) {
        self.rx.push_back(frame);
    }

    /// 协议栈发出的 ARP 报文
    pub fn sent_arp(&self) -> Vec<ArpPacket> {
        self.sent
            .iter()
            .filter_map(|f| {
                let eth = EthHdr::from_bytes(f)?;
                if eth.protocol() != Some(EthProtocol::ETH_P_ARP) {
                    return None;
                }
                ArpPacket::from_bytes(&f[ETH_HLEN..])
            })
            .collect()
    }

    pub fn arp_requests(&self) -> Vec<ArpPacket> {
        self.sent_arp().into_iter().filter(|p| p.is_request()).collect()
    }

    pub fn arp_replies(&self) -> Vec<ArpPacket> {
        self.sent_arp().into_iter().filter(|p| p.is_reply()).collect()
    }

    /// 协议栈发出的指定协议的 IP 报文 (头部, 负载)
    pub fn sent_ip(&self, proto: IpProtocol) -> Vec<(IpHdr, Vec<u8>)> {
        self.sent
            .iter()
            .filter_map(|f| {
                let eth = EthHdr::from_bytes(f)?;
                if eth.protocol() != Some(EthProtocol::ETH_P_IP) {
                    return None;
                }
                let data = &f[ETH_HLEN..];
                let hdr = IpHdr::from_bytes(data)?;
                if hdr.protocol != proto.to_u8() {
                    return None;
                }
                Some((hdr, data[hdr.ihl..hdr.tot_len as usize].to_vec()))
            })
            .collect()
    }

    /// 协议栈发出的 TCP 报文段头部
    pub fn sent_tcp(&self) -> Vec<TcpHdr> {
        self.sent_ip(IpProtocol::IPPROTO_TCP)
            .iter()
            .filter_map(|(_, seg)| TcpHdr::from_bytes(seg))
            .collect()
    }

    /// 以当前连接向协议栈发送一个 TCP 报文段
    pub fn inject_tcp(&mut self, flags: TcpFlags, data: &[u8]) {
        let conn = self.conn.expect("no tcp connection");
        self.send_tcp(conn, flags, data);
    }

    fn send_tcp(&mut self, conn: PeerConn, flags: TcpFlags, data: &[u8]) {
        let hdr = TcpHdr {
            source: conn.peer_port,
            dest: conn.host_port,
            seq: conn.peer_seq,
            ack_seq: conn.host_next,
            doff: TCP_MIN_HLEN,
            flags,
            window: 8192,
            check: 0,
        };
        let mut seg = [0u8; 1500];
        let len = tcp_build_segment(&mut seg, &hdr, data, conn.peer_ip, conn.host_ip);
        self.send_ip(conn.host_mac, conn.peer_ip, conn.host_ip, IpProtocol::IPPROTO_TCP, &seg[..len]);

        let mut advance = data.len() as u32;
        if flags.intersects(TcpFlags::SYN | TcpFlags::FIN) {
            advance += 1;
        }
        if let Some(c) = self.conn.as_mut() {
            c.peer_seq = c.peer_seq.wrapping_add(advance);
        }
    }

    fn send_ip(&mut self, dest_mac: MacAddr, src: InAddr, dst: InAddr, proto: IpProtocol, payload: &[u8]) {
        let mut fb = FrameBuf::new();
        let hdr = IpHdr::new(src, dst, proto, 0, payload.len());
        ip_build_frame(&mut fb, dest_mac, PEER_MAC, &hdr, payload).unwrap();
        self.rx.push_back(fb.as_slice().to_vec());
    }

    fn respond(&mut self, frame: &[u8]) {
        let eth = match EthHdr::from_bytes(frame) {
            Some(eth) => eth,
            None => return,
        };
        let payload = &frame[ETH_HLEN..];

        match eth.protocol() {
            Some(EthProtocol::ETH_P_ARP) => self.respond_arp(payload),
            Some(EthProtocol::ETH_P_IP) => self.respond_ip(eth.h_source, payload),
            None => {}
        }
    }

    fn respond_arp(&mut self, data: &[u8]) {
        let req = match ArpPacket::from_bytes(data) {
            Some(p) => p,
            None => return,
        };
        if !self.answer_arp || !req.is_request() || req.tpa != PEER_IP {
            return;
        }

        let reply = ArpPacket {
            op: ArpOp::ARPOP_REPLY as u16,
            sha: PEER_MAC,
            spa: PEER_IP,
            tha: req.sha,
            tpa: req.spa,
        };
        let mut fb = FrameBuf::new();
        eth_push_header(&mut fb, req.sha, PEER_MAC, EthProtocol::ETH_P_ARP).unwrap();
        reply.write_to(fb.put(ARP_PLEN).unwrap());
        self.rx.push_back(fb.as_slice().to_vec());
    }

    fn respond_ip(&mut self, host_mac: MacAddr, data: &[u8]) {
        let hdr = match IpHdr::from_bytes(data) {
            Some(hdr) => hdr,
            None => return,
        };
        let payload = data[hdr.ihl..hdr.tot_len as usize].to_vec();

        // 作为路由器时以原目的地址的名义应答
        let (src, dst) = (hdr.daddr, hdr.saddr);

        match IpProtocol::from_u8(hdr.protocol) {
            Some(IpProtocol::IPPROTO_ICMP) => {
                if self.answer_icmp && payload.len() >= 8 && payload[0] == 8 {
                    let mut reply = payload;
                    reply[0] = 0;
                    reply[2] = 0;
                    reply[3] = 0;
                    let csum = ip_checksum(&reply);
                    reply[2..4].copy_from_slice(&csum.to_be_bytes());
                    self.send_ip(host_mac, src, dst, IpProtocol::IPPROTO_ICMP, &reply);
                }
            }
            Some(IpProtocol::IPPROTO_UDP) => self.respond_udp(host_mac, src, dst, &payload),
            Some(IpProtocol::IPPROTO_TCP) => self.respond_tcp(host_mac, src, dst, &payload),
            None => {}
        }
    }

    fn respond_udp(&mut self, host_mac: MacAddr, src: InAddr, dst: InAddr, pkt: &[u8]) {
        let hdr = match UdpHdr::from_bytes(pkt) {
            Some(hdr) => hdr,
            None => return,
        };
        let data = &pkt[UDP_HLEN..hdr.len as usize];

        let reply = match hdr.dest {
            ECHO_PORT => data.to_vec(),
            53 if self.answer_dns => self.dns_reply(data),
            _ => return,
        };

        let mut out = vec![0u8; UDP_HLEN + reply.len()];
        UdpHdr {
            source: hdr.dest,
            dest: hdr.source,
            len: out.len() as u16,
            check: 0,
        }
        .write_to(&mut out);
        out[UDP_HLEN..].copy_from_slice(&reply);
        self.send_ip(host_mac, src, dst, IpProtocol::IPPROTO_UDP, &out);
    }

    fn dns_reply(&self, query: &[u8]) -> Vec<u8> {
        let qhdr = DnsHeader::from_bytes(query).unwrap();
        let qend = skip_name(query, DNS_HLEN).unwrap() + 4;

        let mut resp = vec![0u8; DNS_HLEN];
        DnsHeader {
            id: qhdr.id.wrapping_add(self.dns_id_offset),
            flags: 0x8180,
            qdcount: 1,
            ancount: self.dns_answer.is_some() as u16,
            nscount: 0,
            arcount: 0,
        }
        .write_to(&mut resp);
        resp.extend_from_slice(&query[DNS_HLEN..qend]);

        if let Some(addr) = self.dns_answer {
            resp.extend_from_slice(&[0xC0, 0x0C, 0, 1, 0, 1, 0, 0, 0, 60, 0, 4]);
            resp.extend_from_slice(&addr.to_be_bytes());
        }
        resp
    }

    fn respond_tcp(&mut self, host_mac: MacAddr, src: InAddr, dst: InAddr, seg: &[u8]) {
        let hdr = match TcpHdr::from_bytes(seg) {
            Some(hdr) => hdr,
            None => return,
        };
        let data = &seg[hdr.doff..];
        let flags = hdr.flags;

        if flags.contains(TcpFlags::SYN) && !flags.contains(TcpFlags::ACK) {
            let conn = PeerConn {
                host_port: hdr.source,
                peer_port: hdr.dest,
                host_ip: dst,
                peer_ip: src,
                host_mac,
                peer_seq: PEER_ISN,
                host_next: hdr.seq.wrapping_add(1),
            };
            if self.refuse_tcp {
                self.send_tcp(PeerConn { peer_seq: 0, ..conn }, TcpFlags::RST | TcpFlags::ACK, &[]);
            } else if self.answer_tcp {
                self.conn = Some(conn);
                self.send_tcp(conn, TcpFlags::SYN | TcpFlags::ACK, &[]);
                if let Some(data) = self.synack_burst.take() {
                    self.inject_tcp(TcpFlags::ACK | TcpFlags::PSH, &data);
                    self.inject_tcp(TcpFlags::FIN | TcpFlags::ACK, &[]);
                }
            }
            return;
        }

        let conn = match self.conn.as_mut() {
            Some(c) if c.host_port == hdr.source => c,
            _ => return,
        };
        if flags.contains(TcpFlags::RST) {
            self.conn = None;
            return;
        }

        let mut need_ack = false;
        if !data.is_empty() {
            conn.host_next = hdr.seq.wrapping_add(data.len() as u32);
            self.tcp_data.extend_from_slice(data);
            need_ack = true;
        }
        if flags.contains(TcpFlags::FIN) {
            conn.host_next = hdr.seq.wrapping_add(data.len() as u32 + 1);
            self.fin_seen = true;
            need_ack = true;
        }

        if need_ack {
            let conn = *conn;
            self.send_tcp(conn, TcpFlags::ACK, &[]);
        }
    }
}

impl NetDevice for Peer {
    fn name(&self) -> &str {
        "peer0"
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<(), NetError> {
        self.stats.tx_packets += 1;
        self.stats.tx_bytes += frame.len() as u64;
        self.sent.push(frame.to_vec());
        self.respond(frame);
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        let frame = match self.rx.pop_front() {
            Some(f) => f,
            None => return Ok(0),
        };
        if frame.len() > buf.len() {
            self.stats.rx_dropped += 1;
            return Err(NetError::LinkError);
        }
        buf[..frame.len()].copy_from_slice(&frame);
        self.stats.rx_packets += 1;
        self.stats.rx_bytes += frame.len() as u64;
        Ok(frame.len())
    }

    fn stats(&self) -> DeviceStats {
        self.stats
    }
}

/// 默认配置的协议栈，时钟每次读取前进 1 毫秒
pub fn stack() -> NetStack<Peer, StepClock> {
    NetStack::new(Peer::new(), StepClock::new(0, 1))
}

/// 对端发给协议栈的 UDP 帧
pub fn udp_frame(src: InAddr, dst: InAddr, src_port: u16, dst_port: u16, data: &[u8]) -> Vec<u8> {
    let mut pkt = vec![0u8; UDP_HLEN + data.len()];
    UdpHdr {
        source: src_port,
        dest: dst_port,
        len: pkt.len() as u16,
        check: 0,
    }
    .write_to(&mut pkt);
    pkt[UDP_HLEN..].copy_from_slice(data);

    let mut fb = FrameBuf::new();
    let hdr = IpHdr::new(src, dst, IpProtocol::IPPROTO_UDP, 0, pkt.len());
    ip_build_frame(&mut fb, HOST_MAC, PEER_MAC, &hdr, &pkt).unwrap();
    fb.as_slice().to_vec()
}
