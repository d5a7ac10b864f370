//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! UDP 协议
//!
//! 固定大小的套接字表，每个套接字只缓存一个未读数据报，
//! 新数据报到达时覆盖旧的。发送时校验和填 0 (IPv4 允许)。
//! 参考: net/ipv4/udp.c, include/uapi/linux/udp.h

use log::{debug, warn};

use crate::buffer::IpProtocol;
use crate::config::{UDP_RECV_BUF_SIZE, UDP_SOCKET_TABLE_SIZE};
use crate::drivers::space::{Clock, NetDevice};
use crate::errno::NetError;
use crate::ipv4::{InAddr, IP_MAX_PAYLOAD};
use crate::stack::NetStack;

/// UDP 头部长度
pub const UDP_HLEN: usize = 8;

/// 单个数据报的最大负载
pub const UDP_MAX_PAYLOAD: usize = IP_MAX_PAYLOAD - UDP_HLEN;

/// UDP 头部
///
/// 对应 Linux 的 udphdr (include/uapi/linux/udp.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHdr {
    /// 源端口
    pub source: u16,
    /// 目标端口
    pub dest: u16,
    /// 长度 (头部 + 数据)
    pub len: u16,
    /// 校验和
    pub check: u16,
}

impl UdpHdr {
    /// 从字节切片解析 UDP 头部
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < UDP_HLEN {
            return None;
        }
        Some(Self {
            source: u16::from_be_bytes([data[0], data[1]]),
            dest: u16::from_be_bytes([data[2], data[3]]),
            len: u16::from_be_bytes([data[4], data[5]]),
            check: u16::from_be_bytes([data[6], data[7]]),
        })
    }

    /// 写入 8 字节头部
    pub fn write_to(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.source.to_be_bytes());
        out[2..4].copy_from_slice(&self.dest.to_be_bytes());
        out[4..6].copy_from_slice(&self.len.to_be_bytes());
        out[6..8].copy_from_slice(&self.check.to_be_bytes());
    }
}

/// UDP 套接字句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHandle(pub usize);

/// 接收到的数据报的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpRecv {
    /// 复制到调用者缓冲区的字节数
    pub len: usize,
    /// 来源 IP
    pub from_ip: InAddr,
    /// 来源端口
    pub from_port: u16,
}

/// UDP 套接字
struct UdpSocket {
    local_port: u16,
    in_use: bool,
    buf: [u8; UDP_RECV_BUF_SIZE],
    recv_len: usize,
    recv_from_ip: InAddr,
    recv_from_port: u16,
    has_data: bool,
}

impl UdpSocket {
    const EMPTY: UdpSocket = UdpSocket {
        local_port: 0,
        in_use: false,
        buf: [0; UDP_RECV_BUF_SIZE],
        recv_len: 0,
        recv_from_ip: 0,
        recv_from_port: 0,
        has_data: false,
    };
}

/// UDP 套接字表
pub struct UdpTable {
    socks: [UdpSocket; UDP_SOCKET_TABLE_SIZE],
}

impl UdpTable {
    /// 创建空表
    pub const fn new() -> Self {
        Self {
            socks: [UdpSocket::EMPTY; UDP_SOCKET_TABLE_SIZE],
        }
    }

    fn get(&self, handle: UdpHandle) -> Result<&UdpSocket, NetError> {
        self.socks
            .get(handle.0)
            .filter(|s| s.in_use)
            .ok_or(NetError::BadHandle)
    }

    fn get_mut(&mut self, handle: UdpHandle) -> Result<&mut UdpSocket, NetError> {
        self.socks
            .get_mut(handle.0)
            .filter(|s| s.in_use)
            .ok_or(NetError::BadHandle)
    }
}

impl Default for UdpTable {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: NetDevice, C: Clock> NetStack<D, C> {
    /// 打开 UDP 套接字
    ///
    /// # 参数
    /// - `local_port`: 本地端口
    ///
    /// # 返回
    /// 套接字句柄；表满返回 `NoFreeSocket`
    pub fn udp_open(&mut self, local_port: u16) -> Result<UdpHandle, NetError> {
        let idx = match self.udp.socks.iter().position(|s| !s.in_use) {
            Some(idx) => idx,
            None => {
                warn!("udp: socket table full");
                return Err(NetError::NoFreeSocket);
            }
        };

        let sock = &mut self.udp.socks[idx];
        sock.local_port = local_port;
        sock.in_use = true;
        sock.has_data = false;
        sock.recv_len = 0;

        debug!("udp: open sock {} port {}", idx, local_port);
        Ok(UdpHandle(idx))
    }

    /// 关闭 UDP 套接字
    pub fn udp_close(&mut self, handle: UdpHandle) {
        if let Some(sock) = self.udp.socks.get_mut(handle.0) {
            sock.in_use = false;
            sock.has_data = false;
        }
    }

    /// 套接字的本地端口
    pub fn udp_local_port(&self, handle: UdpHandle) -> Result<u16, NetError> {
        Ok(self.udp.get(handle)?.local_port)
    }

    /// 发送数据报
    ///
    /// # 参数
    /// - `handle`: 套接字句柄
    /// - `dest_ip`: 目标地址
    /// - `dest_port`: 目标端口
    /// - `data`: 数据，最多 1472 字节
    pub fn udp_send(
        &mut self,
        handle: UdpHandle,
        dest_ip: InAddr,
        dest_port: u16,
        data: &[u8],
    ) -> Result<(), NetError> {
        let src_port = self.udp.get(handle)?.local_port;

        if data.len() > UDP_MAX_PAYLOAD {
            return Err(NetError::MessageTooLong);
        }

        let mut pkt = [0u8; IP_MAX_PAYLOAD];
        let udp_len = UDP_HLEN + data.len();
        UdpHdr {
            source: src_port,
            dest: dest_port,
            len: udp_len as u16,
            check: 0,
        }
        .write_to(&mut pkt);
        pkt[UDP_HLEN..udp_len].copy_from_slice(data);

        self.ip_send(dest_ip, IpProtocol::IPPROTO_UDP, &pkt[..udp_len])
    }

    /// 接收数据报
    ///
    /// 轮询设备直到套接字上有数据或超时。数据报长于 `buf` 时截断。
    ///
    /// # 返回
    /// 复制的字节数和来源；超时返回 `Timeout`
    pub fn udp_recv(
        &mut self,
        handle: UdpHandle,
        buf: &mut [u8],
        timeout_ms: u64,
    ) -> Result<UdpRecv, NetError> {
        self.udp.get(handle)?;

        let ready = self.wait_until(timeout_ms, |s| {
            s.udp.get(handle).map(|sock| sock.has_data).unwrap_or(true)
        });
        if !ready {
            return Err(NetError::Timeout);
        }

        // 等待期间套接字可能被关闭
        let sock = self.udp.get_mut(handle)?;
        let len = sock.recv_len.min(buf.len());
        buf[..len].copy_from_slice(&sock.buf[..len]);
        sock.has_data = false;

        Ok(UdpRecv {
            len,
            from_ip: sock.recv_from_ip,
            from_port: sock.recv_from_port,
        })
    }

    /// 处理接收到的 UDP 数据报
    ///
    /// 按目标端口匹配第一个打开的套接字，覆盖其中未读的数据报。
    pub(crate) fn udp_handle(&mut self, data: &[u8], src_ip: InAddr) {
        let hdr = match UdpHdr::from_bytes(data) {
            Some(hdr) => hdr,
            None => return,
        };

        let udp_len = hdr.len as usize;
        if udp_len < UDP_HLEN || udp_len > data.len() {
            return;
        }
        let payload = &data[UDP_HLEN..udp_len];

        let sock = match self
            .udp
            .socks
            .iter_mut()
            .find(|s| s.in_use && s.local_port == hdr.dest)
        {
            Some(sock) => sock,
            None => return,
        };

        let len = payload.len().min(UDP_RECV_BUF_SIZE);
        sock.buf[..len].copy_from_slice(&payload[..len]);
        sock.recv_len = len;
        sock.recv_from_ip = src_ip;
        sock.recv_from_port = hdr.source;
        sock.has_data = true;
    }
}
