//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 协议栈上下文
//!
//! `NetStack` 持有一个网络接口的全部状态：地址配置、ARP 缓存、
//! UDP/TCP 套接字表、ICMP 与 DNS 的计数器，以及链路层设备和时钟。
//! 各协议模块以 `impl NetStack` 的形式在这里挂载自己的操作。
//!
//! 协议栈是单线程、不可重入的：所有"阻塞"操作都是一个有界循环，
//! 反复调用 `poll()` 并检查条件，直到条件满足或时钟越过截止时间。
//! 需要在多个执行流之间共享时使用 `SharedNetStack`。

use log::{debug, warn};
#[cfg(feature = "debug_log")]
use log::trace;
use spin::Mutex;

use crate::arp::ArpCache;
use crate::buffer::{EthProtocol, MAX_FRAME_LEN};
use crate::drivers::space::{Clock, DeviceStats, NetDevice};
use crate::errno::NetError;
use crate::ethernet::{EthHdr, MacAddr, ETH_HLEN, ETH_ZLEN};
use crate::icmp::PingState;
use crate::ifconfig::NetConfig;
use crate::ipv4::InAddr;
use crate::tcp::TcpTable;
use crate::udp::UdpTable;

/// 单次 `poll()` 最多处理的帧数
///
/// 回环设备上处理一帧可能又产生新帧，预算保证 `poll()` 一定返回。
/// 超出预算的帧留在设备队列里，由下一次 `poll()` 处理。
pub const POLL_BUDGET: usize = 64;

/// 协议栈上下文
pub struct NetStack<D: NetDevice, C: Clock> {
    pub(crate) cfg: NetConfig,
    pub(crate) arp: ArpCache,
    pub(crate) udp: UdpTable,
    pub(crate) tcp: TcpTable,
    pub(crate) ping: PingState,
    /// IP 标识字段计数器
    pub(crate) ip_id: u16,
    /// DNS 事务 ID 计数器
    pub(crate) dns_id: u16,
    device: D,
    clock: C,
}

impl<D: NetDevice, C: Clock> NetStack<D, C> {
    /// 使用默认配置创建协议栈
    pub fn new(device: D, clock: C) -> Self {
        Self::with_config(device, clock, NetConfig::new())
    }

    /// 使用指定配置创建协议栈
    pub fn with_config(device: D, clock: C, cfg: NetConfig) -> Self {
        debug!(
            "net: stack up on {} ip={} mac={}",
            device.name(),
            crate::ifconfig::Ipv4Display(cfg.ip),
            crate::ethernet::MacDisplay(&cfg.mac)
        );
        let isn = clock.now_ms() as u32;
        Self {
            cfg,
            arp: ArpCache::new(),
            udp: UdpTable::new(),
            tcp: TcpTable::new(isn),
            ping: PingState::new(),
            ip_id: 0,
            dns_id: 1,
            device,
            clock,
        }
    }

    // ========================================================
    // 配置
    // ========================================================

    /// 当前接口配置
    pub fn config(&self) -> &NetConfig {
        &self.cfg
    }

    /// 设置本机 IP
    pub fn set_ip(&mut self, ip: InAddr) {
        self.cfg.ip = ip;
    }

    /// 本机 IP
    pub fn ip(&self) -> InAddr {
        self.cfg.ip
    }

    /// 设置默认网关
    pub fn set_gateway(&mut self, gateway: InAddr) {
        self.cfg.gateway = gateway;
    }

    /// 默认网关
    pub fn gateway(&self) -> InAddr {
        self.cfg.gateway
    }

    /// 设置子网掩码
    pub fn set_netmask(&mut self, netmask: InAddr) {
        self.cfg.netmask = netmask;
    }

    /// 子网掩码
    pub fn netmask(&self) -> InAddr {
        self.cfg.netmask
    }

    /// 设置本机 MAC
    pub fn set_mac(&mut self, mac: MacAddr) {
        self.cfg.mac = mac;
    }

    /// 本机 MAC
    pub fn mac(&self) -> MacAddr {
        self.cfg.mac
    }

    /// 设置 DNS 服务器
    pub fn set_dns_server(&mut self, server: InAddr) {
        self.cfg.dns_server = server;
    }

    /// DNS 服务器
    pub fn dns_server(&self) -> InAddr {
        self.cfg.dns_server
    }

    // ========================================================
    // 设备与时钟
    // ========================================================

    /// 链路层设备
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 链路层设备 (可变)
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// 设备统计信息
    pub fn device_stats(&self) -> DeviceStats {
        self.device.stats()
    }

    /// 当前时间 (毫秒)
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// 发送一个以太网帧
    ///
    /// 不足最小帧长的帧补零到 60 字节。
    pub(crate) fn transmit(&mut self, frame: &[u8]) -> Result<(), NetError> {
        if frame.len() < ETH_HLEN || frame.len() > MAX_FRAME_LEN {
            return Err(NetError::LinkError);
        }

        if frame.len() < ETH_ZLEN {
            let mut padded = [0u8; ETH_ZLEN];
            padded[..frame.len()].copy_from_slice(frame);
            self.device.transmit(&padded)
        } else {
            self.device.transmit(frame)
        }
    }

    // ========================================================
    // 接收路径
    // ========================================================

    /// 轮询设备，处理当前已到达的帧
    ///
    /// 一次最多处理 [`POLL_BUDGET`] 帧，积压更多帧时需要再次调用。
    ///
    /// # 返回
    /// 本次处理的帧数
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;

        while handled < POLL_BUDGET {
            let mut buf = [0u8; MAX_FRAME_LEN];
            let len = match self.device.receive(&mut buf) {
                Ok(0) => break,
                Ok(len) => len,
                Err(e) => {
                    warn!("net: receive on {} failed: {}", self.device.name(), e);
                    break;
                }
            };

            self.handle_frame(&buf[..len]);
            handled += 1;
        }

        handled
    }

    /// 处理一个以太网帧，按以太网类型分发到 ARP 或 IP
    pub fn handle_frame(&mut self, frame: &[u8]) {
        let hdr = match EthHdr::from_bytes(frame) {
            Some(hdr) => hdr,
            None => return,
        };
        let payload = &frame[ETH_HLEN..];

        match hdr.protocol() {
            Some(EthProtocol::ETH_P_ARP) => self.arp_handle(payload),
            Some(EthProtocol::ETH_P_IP) => self.ip_handle(payload),
            None => {
                #[cfg(feature = "debug_log")]
                trace!("net: drop ethertype {:#06x}", hdr.h_proto);
            }
        }
    }

    /// 有界等待
    ///
    /// 先检查条件，不满足则 `poll()` 一次再检查，
    /// 直到条件满足或超过 `timeout_ms`。
    ///
    /// # 返回
    /// 条件是否在截止时间前满足
    pub(crate) fn wait_until<F>(&mut self, timeout_ms: u64, mut done: F) -> bool
    where
        F: FnMut(&mut Self) -> bool,
    {
        let deadline = self.now_ms().saturating_add(timeout_ms);
        loop {
            if done(self) {
                return true;
            }
            if self.now_ms() >= deadline {
                return false;
            }
            self.poll();
        }
    }
}

/// 加锁共享的协议栈
///
/// 内核中多个执行流 (系统调用、网卡中断下半部) 访问同一个协议栈时，
/// 由自旋锁保证同一时刻只有一个调用者。
pub struct SharedNetStack<D: NetDevice, C: Clock> {
    inner: Mutex<NetStack<D, C>>,
}

impl<D: NetDevice, C: Clock> SharedNetStack<D, C> {
    /// 包装一个协议栈
    pub fn new(stack: NetStack<D, C>) -> Self {
        Self {
            inner: Mutex::new(stack),
        }
    }

    /// 在持锁状态下访问协议栈
    pub fn with<R>(&self, f: impl FnOnce(&mut NetStack<D, C>) -> R) -> R {
        let mut stack = self.inner.lock();
        f(&mut stack)
    }

    /// 非阻塞轮询
    ///
    /// 锁被占用时 (例如中断打断了一个阻塞调用) 直接返回 None，
    /// 那个调用者自己的等待循环会处理到达的帧。
    pub fn try_poll(&self) -> Option<usize> {
        self.inner.try_lock().map(|mut stack| stack.poll())
    }

    /// 取回内部的协议栈
    pub fn into_inner(self) -> NetStack<D, C> {
        self.inner.into_inner()
    }
}
