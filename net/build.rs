//! Rux 网络协议栈构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析工作区根目录下的 Net.toml 配置文件
//! 2. 生成 src/config.rs 常量

use std::env;
use std::fs;
use std::path::PathBuf;

/// 读取整数配置项，缺省时返回默认值
fn int_or(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

/// 读取字符串配置项，缺省时返回默认值
fn str_or<'a>(config: &'a toml::Value, section: &str, key: &str, default: &'a str) -> &'a str {
    config.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

/// 解析点分十进制 IPv4 地址为主机字节序 u32
fn parse_ipv4(key: &str, text: &str) -> u32 {
    let mut octets = [0u8; 4];
    let mut count = 0;
    for part in text.split('.') {
        if count == 4 {
            panic!("{} 不是合法的 IPv4 地址: {}", key, text);
        }
        octets[count] = part.trim().parse::<u8>()
            .unwrap_or_else(|_| panic!("{} 不是合法的 IPv4 地址: {}", key, text));
        count += 1;
    }
    if count != 4 {
        panic!("{} 不是合法的 IPv4 地址: {}", key, text);
    }
    u32::from_be_bytes(octets)
}

/// 解析 "aa:bb:cc:dd:ee:ff" 形式的 MAC 地址
fn parse_mac(key: &str, text: &str) -> [u8; 6] {
    let mut mac = [0u8; 6];
    let mut count = 0;
    for part in text.split(':') {
        if count == 6 {
            panic!("{} 不是合法的 MAC 地址: {}", key, text);
        }
        mac[count] = u8::from_str_radix(part.trim(), 16)
            .unwrap_or_else(|_| panic!("{} 不是合法的 MAC 地址: {}", key, text));
        count += 1;
    }
    if count != 6 {
        panic!("{} 不是合法的 MAC 地址: {}", key, text);
    }
    mac
}

fn main() {
    println!("cargo:rerun-if-changed=../Net.toml");
    println!("cargo:rerun-if-changed=build.rs");

    // 配置文件不存在时全部使用默认值
    let config: toml::Value = match fs::read_to_string("../Net.toml") {
        Ok(content) => toml::from_str(&content).expect("Net.toml 解析失败"),
        Err(_) => {
            println!("cargo:warning=Net.toml not found, using built-in defaults");
            toml::Value::Table(toml::map::Map::new())
        }
    };

    generate_config_code(&config);
}

fn generate_config_code(config: &toml::Value) {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());

    let ip = parse_ipv4("default_ip", str_or(config, "network", "default_ip", "10.0.0.1"));
    let gateway = parse_ipv4("default_gateway", str_or(config, "network", "default_gateway", "10.0.0.2"));
    let netmask = parse_ipv4("default_netmask", str_or(config, "network", "default_netmask", "255.255.255.0"));
    let dns = parse_ipv4("default_dns_server", str_or(config, "network", "default_dns_server", "8.8.8.8"));
    let mac = parse_mac("default_mac", str_or(config, "network", "default_mac", "52:54:00:12:34:56"));

    let config_header = format!(
        r#"//! Rux 网络协议栈配置（自动生成）
//!
//! 此文件由 build.rs 根据 Net.toml 自动生成，请勿手动修改

// ============================================================
// 网络配置
// ============================================================

/// 以太网 MTU
pub const ETH_MTU: usize = {};

/// IPv4 默认 TTL
pub const IP_DEFAULT_TTL: u8 = {};

/// ARP 缓存大小
pub const ARP_CACHE_SIZE: usize = {};

/// UDP 套接字表大小
pub const UDP_SOCKET_TABLE_SIZE: usize = {};

/// TCP 套接字表大小
pub const TCP_SOCKET_TABLE_SIZE: usize = {};

/// UDP 单槽接收缓冲区大小（字节）
pub const UDP_RECV_BUF_SIZE: usize = {};

/// TCP 接收环形缓冲区大小（字节）
pub const TCP_RECV_BUF_SIZE: usize = {};

// ============================================================
// 接口默认地址
// ============================================================

/// 默认本机 IP
pub const DEFAULT_IP: u32 = {:#010x};

/// 默认网关
pub const DEFAULT_GATEWAY: u32 = {:#010x};

/// 默认子网掩码
pub const DEFAULT_NETMASK: u32 = {:#010x};

/// 默认 DNS 服务器
pub const DEFAULT_DNS_SERVER: u32 = {:#010x};

/// 默认 MAC 地址
pub const DEFAULT_MAC: [u8; 6] = [{:#04x}, {:#04x}, {:#04x}, {:#04x}, {:#04x}, {:#04x}];

// ============================================================
// 超时配置（毫秒）
// ============================================================

/// IP/TCP 发送时的 ARP 解析超时
pub const ARP_RESOLVE_TIMEOUT_MS: u64 = {};

/// 回复 ICMP 回显请求时的 ARP 解析超时
pub const ICMP_REPLY_ARP_TIMEOUT_MS: u64 = {};

/// ping 等待回显应答的超时
pub const PING_TIMEOUT_MS: u64 = {};

/// TCP 主动连接的超时
pub const TCP_CONNECT_TIMEOUT_MS: u64 = {};

/// DNS 查询等待应答的超时
pub const DNS_TIMEOUT_MS: u64 = {};
"#,
        int_or(config, "network", "eth_mtu", 1500),
        int_or(config, "network", "ip_default_ttl", 64),
        int_or(config, "network", "arp_cache_size", 16),
        int_or(config, "network", "udp_socket_table_size", 8),
        int_or(config, "network", "tcp_socket_table_size", 16),
        int_or(config, "network", "udp_recv_buf_size", 512),
        int_or(config, "network", "tcp_recv_buf_size", 4096),
        ip,
        gateway,
        netmask,
        dns,
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5],
        int_or(config, "timeouts", "arp_resolve_ms", 1000),
        int_or(config, "timeouts", "icmp_reply_arp_ms", 500),
        int_or(config, "timeouts", "ping_ms", 3000),
        int_or(config, "timeouts", "tcp_connect_ms", 5000),
        int_or(config, "timeouts", "dns_ms", 3000),
    );

    let config_file = manifest_dir.join("src").join("config.rs");

    // 只有内容变化时才写入，避免每次编译都更新文件时间戳
    let existing_content = fs::read_to_string(&config_file).unwrap_or_default();
    if existing_content != config_header {
        fs::write(&config_file, &config_header)
            .expect("写入配置文件失败");
    }
}
