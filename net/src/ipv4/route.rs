//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! IPv4 下一跳选择
//!
//! 协议栈只有一个接口和一条默认路由：同子网直接投递，
//! 其余一律交给网关。

use super::InAddr;

/// 受限广播地址 255.255.255.255
pub const INADDR_BROADCAST: InAddr = 0xFFFF_FFFF;

/// 检查两个地址是否在同一子网
///
/// # 参数
/// - `a`, `b`: IP 地址 (主机字节序)
/// - `netmask`: 子网掩码
pub fn same_subnet(a: InAddr, b: InAddr, netmask: InAddr) -> bool {
    (a & netmask) == (b & netmask)
}

/// 选择下一跳地址
///
/// # 参数
/// - `dest`: 最终目的地址
/// - `our_ip`: 本机地址
/// - `netmask`: 子网掩码
/// - `gateway`: 默认网关
///
/// # 返回
/// 需要解析 MAC 地址的 IP：同子网为 `dest` 本身，否则为 `gateway`
pub fn next_hop(dest: InAddr, our_ip: InAddr, netmask: InAddr, gateway: InAddr) -> InAddr {
    if same_subnet(dest, our_ip, netmask) {
        dest
    } else {
        gateway
    }
}

/// 检查是否为回环地址 (127.0.0.0/8)
pub fn is_loopback(addr: InAddr) -> bool {
    (addr >> 24) == 127
}

/// 检查是否为受限广播地址
pub fn is_broadcast(addr: InAddr) -> bool {
    addr == INADDR_BROADCAST
}
