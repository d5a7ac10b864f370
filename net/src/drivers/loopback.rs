//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 回环网络设备
//!
//! 发送的每一帧都原样放回接收队列，下一次 `poll()` 时
//! 由协议栈自己收到。ARP 请求、ICMP 回显等发给本机的流量
//! 因此可以在没有硬件的情况下走完整的收发路径。
//! 参考: drivers/net/loopback.c

use crate::buffer::MAX_FRAME_LEN;
use crate::drivers::space::{DeviceStats, NetDevice};
use crate::errno::NetError;

/// 接收队列可容纳的帧数
pub const LOOPBACK_QUEUE_LEN: usize = 16;

/// 回环设备
pub struct Loopback {
    frames: [[u8; MAX_FRAME_LEN]; LOOPBACK_QUEUE_LEN],
    lens: [usize; LOOPBACK_QUEUE_LEN],
    head: usize,
    count: usize,
    stats: DeviceStats,
}

impl Loopback {
    /// 创建回环设备
    pub const fn new() -> Self {
        Self {
            frames: [[0; MAX_FRAME_LEN]; LOOPBACK_QUEUE_LEN],
            lens: [0; LOOPBACK_QUEUE_LEN],
            head: 0,
            count: 0,
            stats: DeviceStats {
                rx_packets: 0,
                tx_packets: 0,
                rx_bytes: 0,
                tx_bytes: 0,
                rx_errors: 0,
                tx_errors: 0,
                rx_dropped: 0,
                tx_dropped: 0,
            },
        }
    }

    /// 接收队列中待处理的帧数
    pub fn pending(&self) -> usize {
        self.count
    }

    /// 重置统计信息
    pub fn reset_stats(&mut self) {
        self.stats = DeviceStats::default();
    }
}

impl Default for Loopback {
    fn default() -> Self {
        Self::new()
    }
}

impl NetDevice for Loopback {
    fn name(&self) -> &str {
        "lo"
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<(), NetError> {
        if frame.len() > MAX_FRAME_LEN || self.count == LOOPBACK_QUEUE_LEN {
            self.stats.tx_dropped += 1;
            return Err(NetError::LinkError);
        }

        let slot = (self.head + self.count) % LOOPBACK_QUEUE_LEN;
        self.frames[slot][..frame.len()].copy_from_slice(frame);
        self.lens[slot] = frame.len();
        self.count += 1;

        self.stats.tx_packets += 1;
        self.stats.tx_bytes += frame.len() as u64;
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        if self.count == 0 {
            return Ok(0);
        }

        let slot = self.head;
        let len = self.lens[slot];
        self.head = (self.head + 1) % LOOPBACK_QUEUE_LEN;
        self.count -= 1;

        if len > buf.len() {
            self.stats.rx_dropped += 1;
            return Err(NetError::LinkError);
        }

        buf[..len].copy_from_slice(&self.frames[slot][..len]);
        self.stats.rx_packets += 1;
        self.stats.rx_bytes += len as u64;
        Ok(len)
    }

    fn stats(&self) -> DeviceStats {
        self.stats
    }
}
