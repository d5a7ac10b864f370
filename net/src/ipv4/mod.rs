//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! IPv4 协议
//!
//! 只发送 20 字节无选项的头部，不分片；接收时按协议号分发到
//! ICMP、TCP、UDP。不做转发，目的地址既不是本机也不是受限广播的
//! 报文直接丢弃。
//! 参考: net/ipv4/ip_input.c, net/ipv4/ip_output.c, include/uapi/linux/ip.h

pub mod checksum;
pub mod route;

use log::debug;
#[cfg(feature = "debug_log")]
use log::trace;

use crate::buffer::{EthProtocol, FrameBuf, IpProtocol};
use crate::config::{ETH_MTU, IP_DEFAULT_TTL};
use crate::drivers::space::{Clock, NetDevice};
use crate::errno::NetError;
use crate::ethernet::{eth_push_header, MacAddr};
use crate::ifconfig::Ipv4Display;
use crate::stack::NetStack;

/// IPv4 地址 (主机字节序)
pub type InAddr = u32;

/// IPv4 头部长度
pub const IPHDR_LEN: usize = 20;

/// 单个 IP 报文可承载的最大负载
pub const IP_MAX_PAYLOAD: usize = ETH_MTU - IPHDR_LEN;

/// IPv4 头部
///
/// 对应 Linux 的 iphdr (include/uapi/linux/ip.h)，字段为主机字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpHdr {
    /// 头部长度 (字节)
    pub ihl: usize,
    /// 总长度
    pub tot_len: u16,
    /// 标识
    pub id: u16,
    /// TTL
    pub ttl: u8,
    /// 协议
    pub protocol: u8,
    /// 头部校验和
    pub check: u16,
    /// 源 IP 地址
    pub saddr: InAddr,
    /// 目标 IP 地址
    pub daddr: InAddr,
}

impl IpHdr {
    /// 构造发送用的头部 (IHL=5, TTL=64, 不分片)
    pub fn new(saddr: InAddr, daddr: InAddr, protocol: IpProtocol, id: u16, payload_len: usize) -> Self {
        Self {
            ihl: IPHDR_LEN,
            tot_len: (IPHDR_LEN + payload_len) as u16,
            id,
            ttl: IP_DEFAULT_TTL,
            protocol: protocol.to_u8(),
            check: 0,
            saddr,
            daddr,
        }
    }

    /// 从字节切片解析 IPv4 头部
    ///
    /// 检查版本号为 4、头部长度不小于 20 且不超过数据长度。
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < IPHDR_LEN {
            return None;
        }

        let version = data[0] >> 4;
        if version != 4 {
            return None;
        }

        let ihl = ((data[0] & 0x0F) as usize) * 4;
        if ihl < IPHDR_LEN || ihl > data.len() {
            return None;
        }

        Some(Self {
            ihl,
            tot_len: u16::from_be_bytes([data[2], data[3]]),
            id: u16::from_be_bytes([data[4], data[5]]),
            ttl: data[8],
            protocol: data[9],
            check: u16::from_be_bytes([data[10], data[11]]),
            saddr: u32::from_be_bytes([data[12], data[13], data[14], data[15]]),
            daddr: u32::from_be_bytes([data[16], data[17], data[18], data[19]]),
        })
    }

    /// 写入 20 字节头部并填入校验和
    pub fn write_to(&self, out: &mut [u8]) {
        let out = &mut out[..IPHDR_LEN];
        out[0] = (4 << 4) | 5;
        out[1] = 0;
        out[2..4].copy_from_slice(&self.tot_len.to_be_bytes());
        out[4..6].copy_from_slice(&self.id.to_be_bytes());
        out[6..8].copy_from_slice(&[0, 0]);
        out[8] = self.ttl;
        out[9] = self.protocol;
        out[10..12].copy_from_slice(&[0, 0]);
        out[12..16].copy_from_slice(&self.saddr.to_be_bytes());
        out[16..20].copy_from_slice(&self.daddr.to_be_bytes());

        let csum = checksum::ip_checksum(out);
        out[10..12].copy_from_slice(&csum.to_be_bytes());
    }
}

/// 在帧缓冲区中追加 IPv4 头部
pub fn ip_push_header(fb: &mut FrameBuf, hdr: &IpHdr) -> Result<(), NetError> {
    let area = fb.put(IPHDR_LEN).ok_or(NetError::MessageTooLong)?;
    hdr.write_to(area);
    Ok(())
}

/// 构造完整的 以太网 + IPv4 + 负载 帧
pub fn ip_build_frame(
    fb: &mut FrameBuf,
    dest_mac: MacAddr,
    src_mac: MacAddr,
    hdr: &IpHdr,
    payload: &[u8],
) -> Result<(), NetError> {
    eth_push_header(fb, dest_mac, src_mac, EthProtocol::ETH_P_IP)?;
    ip_push_header(fb, hdr)?;
    fb.put_data(payload)
}

impl<D: NetDevice, C: Clock> NetStack<D, C> {
    /// 取下一个 IP 标识
    pub(crate) fn next_ip_id(&mut self) -> u16 {
        let id = self.ip_id;
        self.ip_id = self.ip_id.wrapping_add(1);
        id
    }

    /// 发送 IP 报文
    ///
    /// # 参数
    /// - `dest`: 目的地址 (不在本子网时 ARP 解析网关)
    /// - `protocol`: 上层协议
    /// - `payload`: 上层报文
    ///
    /// # 返回
    /// 负载超过 1480 字节返回 `MessageTooLong`，
    /// 无法解析下一跳返回 `ArpFailed`
    pub fn ip_send(&mut self, dest: InAddr, protocol: IpProtocol, payload: &[u8]) -> Result<(), NetError> {
        if payload.len() > IP_MAX_PAYLOAD {
            return Err(NetError::MessageTooLong);
        }

        let dest_mac = self
            .arp_resolve_default(dest)
            .map_err(|_| NetError::ArpFailed)?;

        let id = self.next_ip_id();
        self.ip_transmit(dest_mac, dest, protocol, id, payload)
    }

    /// 已知下一跳 MAC 时直接构帧发送
    pub(crate) fn ip_transmit(
        &mut self,
        dest_mac: MacAddr,
        dest: InAddr,
        protocol: IpProtocol,
        id: u16,
        payload: &[u8],
    ) -> Result<(), NetError> {
        let hdr = IpHdr::new(self.cfg.ip, dest, protocol, id, payload.len());
        let mut fb = FrameBuf::new();
        ip_build_frame(&mut fb, dest_mac, self.cfg.mac, &hdr, payload)?;
        self.transmit(fb.as_slice())
    }

    /// 处理接收到的 IP 报文
    pub(crate) fn ip_handle(&mut self, data: &[u8]) {
        let hdr = match IpHdr::from_bytes(data) {
            Some(hdr) => hdr,
            None => return,
        };

        if !checksum::verify_ip_checksum(&data[..hdr.ihl]) {
            debug!("ipv4: bad header checksum from {}", Ipv4Display(hdr.saddr));
            return;
        }

        // 以太网最小帧的填充不属于负载
        let tot_len = hdr.tot_len as usize;
        if tot_len < hdr.ihl || tot_len > data.len() {
            return;
        }

        if hdr.daddr != self.cfg.ip && !route::is_broadcast(hdr.daddr) {
            #[cfg(feature = "debug_log")]
            trace!("ipv4: not for us: {}", Ipv4Display(hdr.daddr));
            return;
        }

        let payload = &data[hdr.ihl..tot_len];

        match IpProtocol::from_u8(hdr.protocol) {
            Some(IpProtocol::IPPROTO_ICMP) => self.icmp_handle(payload, hdr.saddr),
            Some(IpProtocol::IPPROTO_TCP) => self.tcp_handle(payload, hdr.saddr),
            Some(IpProtocol::IPPROTO_UDP) => self.udp_handle(payload, hdr.saddr),
            None => {
                #[cfg(feature = "debug_log")]
                trace!("ipv4: drop protocol {}", hdr.protocol);
            }
        }
    }
}
