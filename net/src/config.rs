//! Rux 网络协议栈配置（自动生成）
//!
//! 此文件由 build.rs 根据 Net.toml 自动生成，请勿手动修改

// ============================================================
// 网络配置
// ============================================================

/// 以太网 MTU
pub const ETH_MTU: usize = 1500;

/// IPv4 默认 TTL
pub const IP_DEFAULT_TTL: u8 = 64;

/// ARP 缓存大小
pub const ARP_CACHE_SIZE: usize = 16;

/// UDP 套接字表大小
pub const UDP_SOCKET_TABLE_SIZE: usize = 8;

/// TCP 套接字表大小
pub const TCP_SOCKET_TABLE_SIZE: usize = 16;

/// UDP 单槽接收缓冲区大小（字节）
pub const UDP_RECV_BUF_SIZE: usize = 512;

/// TCP 接收环形缓冲区大小（字节）
pub const TCP_RECV_BUF_SIZE: usize = 4096;

// ============================================================
// 接口默认地址
// ============================================================

/// 默认本机 IP
pub const DEFAULT_IP: u32 = 0x0a000001;

/// 默认网关
pub const DEFAULT_GATEWAY: u32 = 0x0a000002;

/// 默认子网掩码
pub const DEFAULT_NETMASK: u32 = 0xffffff00;

/// 默认 DNS 服务器
pub const DEFAULT_DNS_SERVER: u32 = 0x08080808;

/// 默认 MAC 地址
pub const DEFAULT_MAC: [u8; 6] = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];

// ============================================================
// 超时配置（毫秒）
// ============================================================

/// IP/TCP 发送时的 ARP 解析超时
pub const ARP_RESOLVE_TIMEOUT_MS: u64 = 1000;

/// 回复 ICMP 回显请求时的 ARP 解析超时
pub const ICMP_REPLY_ARP_TIMEOUT_MS: u64 = 500;

/// ping 等待回显应答的超时
pub const PING_TIMEOUT_MS: u64 = 3000;

/// TCP 主动连接的超时
pub const TCP_CONNECT_TIMEOUT_MS: u64 = 5000;

/// DNS 查询等待应答的超时
pub const DNS_TIMEOUT_MS: u64 = 3000;
