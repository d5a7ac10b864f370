//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Rux 网络协议栈
//!
//! 遵循 Linux 内核网络子系统的分层与命名
//! 参考: net/
//!
//! 以太网 → ARP / IPv4 → ICMP / UDP / TCP → DNS，
//! 不依赖堆分配，链路层设备和时钟由使用者通过
//! [`NetDevice`] 和 [`Clock`] 提供。

#![cfg_attr(not(test), no_std)]

pub mod arp;
pub mod buffer;
pub mod config;
pub mod dns;
pub mod drivers;
pub mod errno;
pub mod ethernet;
pub mod icmp;
pub mod ifconfig;
pub mod ipv4;
pub mod stack;
pub mod tcp;
pub mod udp;

pub use buffer::{EthProtocol, IpProtocol};
pub use drivers::{Clock, DeviceStats, Loopback, NetDevice, StepClock};
pub use errno::NetError;
pub use ethernet::MacAddr;
pub use icmp::PingStats;
pub use ifconfig::{parse_ipv4, Ipv4Display, NetConfig};
pub use ipv4::InAddr;
pub use stack::{NetStack, SharedNetStack};
pub use tcp::{TcpHandle, TcpState};
pub use udp::{UdpHandle, UdpRecv};
