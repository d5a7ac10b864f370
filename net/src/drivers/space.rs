//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络设备接口
//!
//! 协议栈与外部世界的两个边界：
//! - `NetDevice`: 收发原始以太网帧的链路层设备
//! - `Clock`: 毫秒时钟，所有阻塞操作的截止时间都以它为准

use core::sync::atomic::{AtomicU64, Ordering};

use crate::errno::NetError;

/// 网络设备统计信息
///
/// 对应 Linux 的 rtnl_link_stats64 的子集
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStats {
    /// 接收包数
    pub rx_packets: u64,
    /// 发送包数
    pub tx_packets: u64,
    /// 接收字节数
    pub rx_bytes: u64,
    /// 发送字节数
    pub tx_bytes: u64,
    /// 接收错误数
    pub rx_errors: u64,
    /// 发送错误数
    pub tx_errors: u64,
    /// 接收丢弃数
    pub rx_dropped: u64,
    /// 发送丢弃数
    pub tx_dropped: u64,
}

/// 链路层设备
///
/// 网卡驱动实现此 trait 后即可挂到 `NetStack` 上。
pub trait NetDevice {
    /// 设备名 (例如 "lo", "eth0")
    fn name(&self) -> &str;

    /// 发送一个完整的以太网帧
    ///
    /// # 参数
    /// - `frame`: 以太网头部 + 负载
    ///
    /// # 返回
    /// 失败返回 `NetError::LinkError`
    fn transmit(&mut self, frame: &[u8]) -> Result<(), NetError>;

    /// 取出一个接收到的帧
    ///
    /// 协议栈每次 `poll()` 最多调用 `POLL_BUDGET` 次，
    /// 驱动应把其余的帧留在队列里，而不是丢弃。
    ///
    /// # 返回
    /// 帧长度；`Ok(0)` 表示当前没有待接收的帧
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, NetError>;

    /// 获取统计信息
    fn stats(&self) -> DeviceStats {
        DeviceStats::default()
    }
}

/// 毫秒时钟
pub trait Clock {
    /// 当前时间 (毫秒，单调不减)
    fn now_ms(&self) -> u64;
}

/// 步进时钟
///
/// 每次读取后时间前进 `step` 毫秒。在没有定时器中断的环境里，
/// 轮询循环依靠它保证在有限次迭代后到达截止时间。
/// `step` 为 0 时是冻结的时钟。
pub struct StepClock {
    now: AtomicU64,
    step: u64,
}

impl StepClock {
    /// 创建步进时钟
    pub const fn new(start: u64, step: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
            step,
        }
    }

    /// 手动推进时间
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::Relaxed);
    }
}

impl Clock for StepClock {
    fn now_ms(&self) -> u64 {
        self.now.fetch_add(self.step, Ordering::Relaxed)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}
