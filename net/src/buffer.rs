//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络缓冲区
//!
//! 协议栈不做动态分配：
//! - `FrameBuf` 是发送路径上逐层追加头部和数据的定长帧缓冲区
//! - `RingBuffer` 是 TCP 连接的定长接收环

use crate::errno::NetError;

/// 以太网帧最大长度 (不含 FCS)
pub const MAX_FRAME_LEN: usize = 1514;

/// 以太网协议类型
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum EthProtocol {
    /// IPv4
    ETH_P_IP = 0x0800,
    /// ARP
    ETH_P_ARP = 0x0806,
}

impl EthProtocol {
    /// 从 u16 转换
    pub fn from_u16(val: u16) -> Option<Self> {
        match val {
            0x0800 => Some(EthProtocol::ETH_P_IP),
            0x0806 => Some(EthProtocol::ETH_P_ARP),
            _ => None,
        }
    }

    /// 转换为 u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// IP 协议类型
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum IpProtocol {
    /// ICMP
    IPPROTO_ICMP = 1,
    /// TCP
    IPPROTO_TCP = 6,
    /// UDP
    IPPROTO_UDP = 17,
}

impl IpProtocol {
    /// 从 u8 转换
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            1 => Some(IpProtocol::IPPROTO_ICMP),
            6 => Some(IpProtocol::IPPROTO_TCP),
            17 => Some(IpProtocol::IPPROTO_UDP),
            _ => None,
        }
    }

    /// 转换为 u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// 定长帧缓冲区
///
/// 发送路径按 以太网头 → IP 头 → 传输层头 → 数据 的顺序追加，
/// 不会超过一个以太网帧的长度。
pub struct FrameBuf {
    data: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl FrameBuf {
    /// 创建空缓冲区
    pub const fn new() -> Self {
        Self {
            data: [0; MAX_FRAME_LEN],
            len: 0,
        }
    }

    /// 在尾部预留 `len` 字节（已清零）并返回该区域
    pub fn put(&mut self, len: usize) -> Option<&mut [u8]> {
        if self.len + len > MAX_FRAME_LEN {
            return None;
        }
        let start = self.len;
        self.len += len;
        let area = &mut self.data[start..self.len];
        area.fill(0);
        Some(area)
    }

    /// 在尾部追加数据
    pub fn put_data(&mut self, data: &[u8]) -> Result<(), NetError> {
        let area = self.put(data.len()).ok_or(NetError::MessageTooLong)?;
        area.copy_from_slice(data);
        Ok(())
    }

    /// 当前长度
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 已写入的数据
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl Default for FrameBuf {
    fn default() -> Self {
        Self::new()
    }
}

/// 定长接收环
///
/// 写满后多余的字节被丢弃，不会覆盖未读数据。
pub struct RingBuffer<const N: usize> {
    buf: [u8; N],
    head: usize,
    len: usize,
}

impl<const N: usize> RingBuffer<N> {
    /// 创建空环
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            head: 0,
            len: 0,
        }
    }

    /// 未读字节数
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 剩余空间
    pub fn free_space(&self) -> usize {
        N - self.len
    }

    /// 写入数据，返回实际写入的字节数
    pub fn push(&mut self, data: &[u8]) -> usize {
        let count = data.len().min(self.free_space());
        let mut tail = (self.head + self.len) % N;
        for &b in &data[..count] {
            self.buf[tail] = b;
            tail = (tail + 1) % N;
        }
        self.len += count;
        count
    }

    /// 读出数据到 `out`，返回读出的字节数
    pub fn pop_into(&mut self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.len);
        for slot in out[..count].iter_mut() {
            *slot = self.buf[self.head];
            self.head = (self.head + 1) % N;
        }
        self.len -= count;
        if self.len == 0 {
            self.head = 0;
        }
        count
    }

    /// 清空
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
