//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! ICMP 协议
//!
//! 只实现回显请求/应答：应答别人的 ping，以及自己发起 ping 并计算往返时间。
//! 参考: net/ipv4/icmp.c, include/uapi/linux/icmp.h

use log::{debug, info, warn};

use crate::buffer::IpProtocol;
use crate::config::{ETH_MTU, ICMP_REPLY_ARP_TIMEOUT_MS, PING_TIMEOUT_MS};
use crate::drivers::space::{Clock, NetDevice};
use crate::errno::NetError;
use crate::ethernet::ETH_HLEN;
use crate::ifconfig::Ipv4Display;
use crate::ipv4::checksum::ip_checksum;
use crate::ipv4::{route, InAddr, IPHDR_LEN};
use crate::stack::NetStack;

/// ICMP 头部长度
pub const ICMP_HLEN: usize = 8;

/// ping 负载长度
pub const PING_DATA_LEN: usize = 32;

/// ping 报文使用的标识符
pub const PING_IDENT: u16 = 0x1234;

/// ICMP 消息类型
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum IcmpType {
    /// 回显应答
    ICMP_ECHOREPLY = 0,
    /// 回显请求
    ICMP_ECHO = 8,
}

/// ICMP 回显头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpEchoHdr {
    /// 类型
    pub type_: u8,
    /// 代码
    pub code: u8,
    /// 校验和
    pub checksum: u16,
    /// 标识符
    pub id: u16,
    /// 序列号
    pub sequence: u16,
}

impl IcmpEchoHdr {
    /// 从字节切片解析
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < ICMP_HLEN {
            return None;
        }
        Some(Self {
            type_: data[0],
            code: data[1],
            checksum: u16::from_be_bytes([data[2], data[3]]),
            id: u16::from_be_bytes([data[4], data[5]]),
            sequence: u16::from_be_bytes([data[6], data[7]]),
        })
    }

    /// 写入 8 字节头部 (校验和字段原样写入)
    pub fn write_to(&self, out: &mut [u8]) {
        out[0] = self.type_;
        out[1] = self.code;
        out[2..4].copy_from_slice(&self.checksum.to_be_bytes());
        out[4..6].copy_from_slice(&self.id.to_be_bytes());
        out[6..8].copy_from_slice(&self.sequence.to_be_bytes());
    }
}

/// 构造回显请求报文 (头部 + 32 字节负载)
///
/// 负载前 4 字节是大端发送时间戳，其余为 'A'..'Z' 循环填充。
pub fn icmp_build_echo_request(seq: u16, timestamp: u32) -> [u8; ICMP_HLEN + PING_DATA_LEN] {
    let mut pkt = [0u8; ICMP_HLEN + PING_DATA_LEN];
    IcmpEchoHdr {
        type_: IcmpType::ICMP_ECHO as u8,
        code: 0,
        checksum: 0,
        id: PING_IDENT,
        sequence: seq,
    }
    .write_to(&mut pkt);

    let ts = timestamp.to_be_bytes();
    for (i, byte) in pkt[ICMP_HLEN..].iter_mut().enumerate() {
        *byte = if i < 4 { ts[i] } else { b'A' + (i % 26) as u8 };
    }

    let csum = ip_checksum(&pkt);
    pkt[2..4].copy_from_slice(&csum.to_be_bytes());
    pkt
}

/// 等待中的 ping 状态
#[derive(Debug, Default, Clone, Copy)]
pub struct PingState {
    /// 最近一次收到的应答序列号
    seq: u16,
    /// 最近一次应答的往返时间
    rtt: u64,
    /// 是否收到应答
    received: bool,
}

impl PingState {
    /// 初始状态
    pub const fn new() -> Self {
        Self {
            seq: 0,
            rtt: 0,
            received: false,
        }
    }
}

/// 一次 ping 会话的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PingStats {
    /// 发送的探测数
    pub sent: u32,
    /// 收到的应答数
    pub received: u32,
    /// 往返时间总和 (毫秒)
    pub total_rtt_ms: u64,
}

impl<D: NetDevice, C: Clock> NetStack<D, C> {
    /// 发送一次回显请求并等待应答
    ///
    /// # 参数
    /// - `dest`: 目标地址
    /// - `seq`: 序列号
    ///
    /// # 返回
    /// 往返时间 (毫秒)；无法解析下一跳返回 `ArpFailed`，
    /// 3 秒内没有应答返回 `Timeout`
    pub fn ping(&mut self, dest: InAddr, seq: u16) -> Result<u64, NetError> {
        let dest_mac = self
            .arp_resolve_default(dest)
            .map_err(|_| NetError::ArpFailed)?;

        let pkt = icmp_build_echo_request(seq, self.now_ms() as u32);

        self.ping = PingState::new();
        self.ip_transmit(dest_mac, dest, IpProtocol::IPPROTO_ICMP, seq & 0xFF, &pkt)?;

        if self.wait_until(PING_TIMEOUT_MS, |s| s.ping.received && s.ping.seq == seq) {
            Ok(self.ping.rtt)
        } else {
            Err(NetError::Timeout)
        }
    }

    /// 连续 ping 一个主机
    ///
    /// 127.0.0.0/8 和本机地址不经过网络，直接记为 0 毫秒的应答。
    /// 序列号从 1 开始；ARP 失败时提前结束，超时的探测只计入发送数。
    pub fn ping_host(&mut self, dest: InAddr, count: u32) -> PingStats {
        let mut stats = PingStats::default();
        let local = route::is_loopback(dest) || dest == self.cfg.ip;

        info!("PING {}", Ipv4Display(dest));

        for i in 0..count {
            let seq = ping_seq(i);
            stats.sent += 1;

            if local {
                info!("Reply: seq={} loopback", seq);
                stats.received += 1;
                continue;
            }

            match self.ping(dest, seq) {
                Ok(rtt) => {
                    info!("Reply: seq={} time={}ms", seq, rtt);
                    stats.received += 1;
                    stats.total_rtt_ms += rtt;
                }
                Err(NetError::ArpFailed) => {
                    warn!("icmp: {}", NetError::ArpFailed);
                    break;
                }
                Err(e) => warn!("icmp: seq={} {}", seq, e),
            }
        }

        info!("--- statistics --- sent={} recv={}", stats.sent, stats.received);
        stats
    }

    /// 处理接收到的 ICMP 报文
    pub(crate) fn icmp_handle(&mut self, data: &[u8], src: InAddr) {
        let hdr = match IcmpEchoHdr::from_bytes(data) {
            Some(hdr) => hdr,
            None => return,
        };
        if hdr.code != 0 {
            return;
        }

        if hdr.type_ == IcmpType::ICMP_ECHOREPLY as u8 {
            let rtt = if data.len() >= ICMP_HLEN + 4 {
                let sent = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
                (self.now_ms() as u32).wrapping_sub(sent) as u64
            } else {
                0
            };
            debug!("icmp: echo reply from {} seq={}", Ipv4Display(src), hdr.sequence);
            self.ping = PingState {
                seq: hdr.sequence,
                rtt,
                received: true,
            };
        } else if hdr.type_ == IcmpType::ICMP_ECHO as u8 {
            self.icmp_send_reply(src, data);
        }
    }

    /// 回复回显请求：复制请求，改为应答类型并重算校验和
    fn icmp_send_reply(&mut self, dest: InAddr, request: &[u8]) {
        if ETH_HLEN + IPHDR_LEN + request.len() > ETH_MTU {
            return;
        }

        let dest_mac = match self.arp_resolve(dest, ICMP_REPLY_ARP_TIMEOUT_MS) {
            Ok(mac) => mac,
            Err(_) => return,
        };

        let mut reply = [0u8; ETH_MTU - ETH_HLEN - IPHDR_LEN];
        let reply = &mut reply[..request.len()];
        reply.copy_from_slice(request);
        reply[0] = IcmpType::ICMP_ECHOREPLY as u8;
        reply[2..4].copy_from_slice(&[0, 0]);
        let csum = ip_checksum(reply);
        reply[2..4].copy_from_slice(&csum.to_be_bytes());

        let id = self.next_ip_id();
        if let Err(e) = self.ip_transmit(dest_mac, dest, IpProtocol::IPPROTO_ICMP, id, reply) {
            debug!("icmp: reply to {} failed: {}", Ipv4Display(dest), e);
        }
    }
}

/// 第 `i` 次探测的序列号，从 1 开始，超过 16 位后回绕
fn ping_seq(i: u32) -> u16 {
    (i as u16).wrapping_add(1)
}
