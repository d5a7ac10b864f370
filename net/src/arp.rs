//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! ARP 协议
//!
//! IPv4 地址到 MAC 地址的映射：固定大小的缓存加上请求/应答协议。
//! 参考: net/ipv4/arp.c, include/uapi/linux/if_arp.h

use log::{debug, warn};

use crate::buffer::{EthProtocol, FrameBuf};
use crate::config::{ARP_CACHE_SIZE, ARP_RESOLVE_TIMEOUT_MS};
use crate::drivers::space::{Clock, NetDevice};
use crate::errno::NetError;
use crate::ethernet::{eth_push_header, MacAddr, MacDisplay, ETH_ALEN, ETH_BROADCAST};
use crate::ifconfig::Ipv4Display;
use crate::ipv4::{route, InAddr};
use crate::stack::NetStack;

/// ARP 硬件类型: 以太网
pub const ARPHRD_ETHER: u16 = 1;

/// ARP 报文长度 (以太网 + IPv4)
pub const ARP_PLEN: usize = 28;

/// ARP 操作类型
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum ArpOp {
    /// ARP 请求
    ARPOP_REQUEST = 1,
    /// ARP 响应
    ARPOP_REPLY = 2,
}

/// ARP 报文 (以太网 + IPv4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    /// 操作码
    pub op: u16,
    /// 发送方硬件地址 (MAC)
    pub sha: MacAddr,
    /// 发送方协议地址 (IP)
    pub spa: InAddr,
    /// 目标硬件地址 (MAC)
    pub tha: MacAddr,
    /// 目标协议地址 (IP)
    pub tpa: InAddr,
}

impl ArpPacket {
    /// 从字节切片解析 ARP 报文
    ///
    /// 只检查长度，硬件/协议类型字段不做校验。
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < ARP_PLEN {
            return None;
        }

        let mut sha = [0u8; ETH_ALEN];
        let mut tha = [0u8; ETH_ALEN];
        sha.copy_from_slice(&data[8..14]);
        tha.copy_from_slice(&data[18..24]);

        Some(Self {
            op: u16::from_be_bytes([data[6], data[7]]),
            sha,
            spa: u32::from_be_bytes([data[14], data[15], data[16], data[17]]),
            tha,
            tpa: u32::from_be_bytes([data[24], data[25], data[26], data[27]]),
        })
    }

    /// 写入 28 字节报文
    pub fn write_to(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&ARPHRD_ETHER.to_be_bytes());
        out[2..4].copy_from_slice(&EthProtocol::ETH_P_IP.to_u16().to_be_bytes());
        out[4] = ETH_ALEN as u8;
        out[5] = 4;
        out[6..8].copy_from_slice(&self.op.to_be_bytes());
        out[8..14].copy_from_slice(&self.sha);
        out[14..18].copy_from_slice(&self.spa.to_be_bytes());
        out[18..24].copy_from_slice(&self.tha);
        out[24..28].copy_from_slice(&self.tpa.to_be_bytes());
    }

    /// 检查是否为 ARP 请求
    pub fn is_request(&self) -> bool {
        self.op == ArpOp::ARPOP_REQUEST as u16
    }

    /// 检查是否为 ARP 响应
    pub fn is_reply(&self) -> bool {
        self.op == ArpOp::ARPOP_REPLY as u16
    }
}

/// ARP 缓存条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpEntry {
    /// IP 地址
    pub ip: InAddr,
    /// MAC 地址
    pub mac: MacAddr,
    /// 最后一次看到该映射的时间 (毫秒)
    pub last_seen: u64,
    /// 是否有效
    pub valid: bool,
}

impl ArpEntry {
    const EMPTY: ArpEntry = ArpEntry {
        ip: 0,
        mac: [0; ETH_ALEN],
        last_seen: 0,
        valid: false,
    };
}

/// ARP 缓存
///
/// 条目从不主动删除；缓存满且地址不在其中时，
/// 替换 `last_seen` 最小的条目。
pub struct ArpCache {
    entries: [ArpEntry; ARP_CACHE_SIZE],
}

impl ArpCache {
    /// 创建空缓存
    pub const fn new() -> Self {
        Self {
            entries: [ArpEntry::EMPTY; ARP_CACHE_SIZE],
        }
    }

    /// 查找 ARP 缓存条目
    pub fn lookup(&self, ip: InAddr) -> Option<MacAddr> {
        self.entries
            .iter()
            .find(|e| e.valid && e.ip == ip)
            .map(|e| e.mac)
    }

    /// 添加或刷新条目
    ///
    /// # 参数
    /// - `ip`: IP 地址
    /// - `mac`: MAC 地址
    /// - `now`: 当前时间，作为条目的时间戳
    pub fn add(&mut self, ip: InAddr, mac: MacAddr, now: u64) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.valid && e.ip == ip) {
            entry.mac = mac;
            entry.last_seen = now;
            return;
        }

        // 优先使用空槽，否则淘汰最旧的条目
        let slot = match self.entries.iter().position(|e| !e.valid) {
            Some(i) => i,
            None => self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_seen)
                .map(|(i, _)| i)
                .unwrap_or(0),
        };

        self.entries[slot] = ArpEntry {
            ip,
            mac,
            last_seen: now,
            valid: true,
        };
    }

    /// 遍历有效条目
    pub fn iter(&self) -> impl Iterator<Item = &ArpEntry> {
        self.entries.iter().filter(|e| e.valid)
    }

    /// 有效条目数
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: NetDevice, C: Clock> NetStack<D, C> {
    /// 查找 ARP 缓存
    ///
    /// # 返回
    /// 返回找到的 MAC 地址，如果未找到则返回 None
    pub fn arp_lookup(&self, ip: InAddr) -> Option<MacAddr> {
        self.arp.lookup(ip)
    }

    /// 添加或刷新 ARP 缓存条目
    pub fn arp_add(&mut self, ip: InAddr, mac: MacAddr) {
        let now = self.now_ms();
        self.arp.add(ip, mac, now);
    }

    /// ARP 缓存中的有效条目
    pub fn arp_entries(&self) -> impl Iterator<Item = &ArpEntry> {
        self.arp.iter()
    }

    /// 广播 ARP 请求
    ///
    /// # 参数
    /// - `target_ip`: 要解析的 IP 地址
    pub fn arp_request(&mut self, target_ip: InAddr) -> Result<(), NetError> {
        let our_mac = self.cfg.mac;
        let pkt = ArpPacket {
            op: ArpOp::ARPOP_REQUEST as u16,
            sha: our_mac,
            spa: self.cfg.ip,
            tha: [0; ETH_ALEN],
            tpa: target_ip,
        };

        let mut fb = FrameBuf::new();
        eth_push_header(&mut fb, ETH_BROADCAST, our_mac, EthProtocol::ETH_P_ARP)?;
        pkt.write_to(fb.put(ARP_PLEN).ok_or(NetError::MessageTooLong)?);

        debug!("arp: who-has {} tell {}", Ipv4Display(target_ip), Ipv4Display(self.cfg.ip));
        self.transmit(fb.as_slice())
    }

    /// 解析 IP 地址对应的 MAC 地址
    ///
    /// 目标不在本子网时改为解析网关。缓存未命中时只发送一次请求，
    /// 之后轮询设备直到缓存出现该条目或超时。
    ///
    /// # 参数
    /// - `ip`: 最终目的地址
    /// - `timeout_ms`: 超时时间
    ///
    /// # 返回
    /// 下一跳的 MAC 地址；超时返回 `NetError::Timeout`
    pub fn arp_resolve(&mut self, ip: InAddr, timeout_ms: u64) -> Result<MacAddr, NetError> {
        let target = route::next_hop(ip, self.cfg.ip, self.cfg.netmask, self.cfg.gateway);

        if let Some(mac) = self.arp.lookup(target) {
            return Ok(mac);
        }

        self.arp_request(target)?;

        let mut found = None;
        self.wait_until(timeout_ms, |s| {
            found = s.arp.lookup(target);
            found.is_some()
        });

        found.ok_or_else(|| {
            warn!("arp: no reply from {}", Ipv4Display(target));
            NetError::Timeout
        })
    }

    /// 以默认超时解析下一跳
    pub(crate) fn arp_resolve_default(&mut self, ip: InAddr) -> Result<MacAddr, NetError> {
        self.arp_resolve(ip, ARP_RESOLVE_TIMEOUT_MS)
    }

    /// 处理接收到的 ARP 报文
    ///
    /// 无论请求还是应答都缓存发送方的映射；
    /// 询问本机地址的请求单播回复。
    pub(crate) fn arp_handle(&mut self, data: &[u8]) {
        let pkt = match ArpPacket::from_bytes(data) {
            Some(pkt) => pkt,
            None => return,
        };

        self.arp_add(pkt.spa, pkt.sha);
        debug!("arp: {} is-at {}", Ipv4Display(pkt.spa), MacDisplay(&pkt.sha));

        if pkt.is_request() && pkt.tpa == self.cfg.ip {
            if let Err(e) = self.arp_send_reply(&pkt) {
                debug!("arp: reply to {} not sent: {}", Ipv4Display(pkt.spa), e);
            }
        }
    }

    fn arp_send_reply(&mut self, req: &ArpPacket) -> Result<(), NetError> {
        let our_mac = self.cfg.mac;
        let reply = ArpPacket {
            op: ArpOp::ARPOP_REPLY as u16,
            sha: our_mac,
            spa: self.cfg.ip,
            tha: req.sha,
            tpa: req.spa,
        };

        let mut fb = FrameBuf::new();
        eth_push_header(&mut fb, req.sha, our_mac, EthProtocol::ETH_P_ARP)?;
        reply.write_to(fb.put(ARP_PLEN).ok_or(NetError::MessageTooLong)?);
        self.transmit(fb.as_slice())
    }
}
