//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 以太网层
//!
//! Ethernet II 帧头的编码与解析。头部按固定偏移逐字节读写，
//! 不依赖结构体内存布局。

use core::fmt;

use crate::buffer::{EthProtocol, FrameBuf};
use crate::errno::NetError;

/// 以太网头部长度
pub const ETH_HLEN: usize = 14;

/// 以太网最小帧长度
pub const ETH_ZLEN: usize = 60;

/// 以太网最大负载长度
pub const ETH_DATA_LEN: usize = 1500;

/// 以太网地址长度 (MAC 地址)
pub const ETH_ALEN: usize = 6;

/// 广播 MAC 地址
pub const ETH_BROADCAST: MacAddr = [0xFF; ETH_ALEN];

/// MAC 地址
pub type MacAddr = [u8; ETH_ALEN];

/// 以太网帧头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthHdr {
    /// 目标 MAC 地址
    pub h_dest: MacAddr,
    /// 源 MAC 地址
    pub h_source: MacAddr,
    /// 协议类型 (主机字节序)
    pub h_proto: u16,
}

impl EthHdr {
    /// 从字节切片解析以太网头部
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < ETH_HLEN {
            return None;
        }

        let mut h_dest = [0u8; ETH_ALEN];
        let mut h_source = [0u8; ETH_ALEN];
        h_dest.copy_from_slice(&data[0..6]);
        h_source.copy_from_slice(&data[6..12]);

        Some(Self {
            h_dest,
            h_source,
            h_proto: u16::from_be_bytes([data[12], data[13]]),
        })
    }

    /// 写入 14 字节头部
    pub fn write_to(&self, out: &mut [u8]) {
        out[0..6].copy_from_slice(&self.h_dest);
        out[6..12].copy_from_slice(&self.h_source);
        out[12..14].copy_from_slice(&self.h_proto.to_be_bytes());
    }

    /// 获取协议类型，未知类型返回 None
    pub fn protocol(&self) -> Option<EthProtocol> {
        EthProtocol::from_u16(self.h_proto)
    }

    /// 检查是否为广播帧
    pub fn is_broadcast(&self) -> bool {
        eth_is_broadcast_addr(&self.h_dest)
    }
}

/// 在帧缓冲区中追加以太网头部
///
/// 必须是写入缓冲区的第一个头部。
pub fn eth_push_header(
    fb: &mut FrameBuf,
    dest: MacAddr,
    src: MacAddr,
    proto: EthProtocol,
) -> Result<(), NetError> {
    let area = fb.put(ETH_HLEN).ok_or(NetError::MessageTooLong)?;
    EthHdr {
        h_dest: dest,
        h_source: src,
        h_proto: proto.to_u16(),
    }
    .write_to(area);
    Ok(())
}

/// 检查以太网地址是否为多播地址
pub fn eth_is_multicast_addr(addr: &MacAddr) -> bool {
    addr[0] & 0x01 != 0
}

/// 检查以太网地址是否为广播地址
pub fn eth_is_broadcast_addr(addr: &MacAddr) -> bool {
    addr == &ETH_BROADCAST
}

/// 检查以太网地址是否为有效单播地址 (非零、非多播)
pub fn eth_is_valid_unicast_addr(addr: &MacAddr) -> bool {
    !addr.iter().all(|&b| b == 0) && !eth_is_multicast_addr(addr)
}

/// MAC 地址的显示包装 (例如 "52:54:00:12:34:56")
pub struct MacDisplay<'a>(pub &'a MacAddr);

impl fmt::Display for MacDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}
