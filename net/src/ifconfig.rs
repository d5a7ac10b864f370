//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 接口配置
//!
//! 运行时的地址配置，初值来自 Net.toml 生成的常量。

use core::fmt;

use crate::config::{DEFAULT_DNS_SERVER, DEFAULT_GATEWAY, DEFAULT_IP, DEFAULT_MAC, DEFAULT_NETMASK};
use crate::ethernet::MacAddr;
use crate::ipv4::InAddr;

/// 接口配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetConfig {
    /// 本机 IP
    pub ip: InAddr,
    /// 默认网关
    pub gateway: InAddr,
    /// 子网掩码
    pub netmask: InAddr,
    /// 本机 MAC
    pub mac: MacAddr,
    /// DNS 服务器
    pub dns_server: InAddr,
}

impl NetConfig {
    /// 编译期默认配置
    pub const fn new() -> Self {
        Self {
            ip: DEFAULT_IP,
            gateway: DEFAULT_GATEWAY,
            netmask: DEFAULT_NETMASK,
            mac: DEFAULT_MAC,
            dns_server: DEFAULT_DNS_SERVER,
        }
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// 解析点分十进制 IPv4 地址
///
/// # 返回
/// 主机字节序地址；格式不合法返回 None
pub fn parse_ipv4(text: &str) -> Option<InAddr> {
    let mut octets = [0u8; 4];
    let mut count = 0;

    for part in text.split('.') {
        if count == 4 || part.is_empty() || part.len() > 3 {
            return None;
        }
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        octets[count] = part.parse::<u8>().ok()?;
        count += 1;
    }

    if count != 4 {
        return None;
    }
    Some(u32::from_be_bytes(octets))
}

/// IPv4 地址的显示包装 (例如 "10.0.0.1")
pub struct Ipv4Display(pub InAddr);

impl fmt::Display for Ipv4Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0.to_be_bytes();
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}
