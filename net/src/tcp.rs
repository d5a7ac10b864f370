//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! TCP 协议
//!
//! 面向点对点受控链路的最小 TCP：完整的状态机和套接字接口，
//! 但没有重传定时器、拥塞控制和乱序重组，假定报文按序且只到达一次。
//! 参考: net/ipv4/tcp.c, net/ipv4/tcp_input.c, include/uapi/linux/tcp.h

use bitflags::bitflags;
use log::{debug, warn};

use crate::buffer::{IpProtocol, RingBuffer};
use crate::config::{TCP_CONNECT_TIMEOUT_MS, TCP_RECV_BUF_SIZE, TCP_SOCKET_TABLE_SIZE};
use crate::drivers::space::{Clock, NetDevice};
use crate::errno::NetError;
use crate::ifconfig::Ipv4Display;
use crate::ipv4::checksum::transport_checksum;
use crate::ipv4::{InAddr, IP_MAX_PAYLOAD};
use crate::stack::NetStack;

/// TCP 头部长度 (不带选项)
pub const TCP_MIN_HLEN: usize = 20;

/// 单个报文段的最大数据长度
pub const TCP_MAX_PAYLOAD: usize = IP_MAX_PAYLOAD - TCP_MIN_HLEN;

/// 临时端口起点
pub const TCP_EPHEMERAL_BASE: u16 = 49152;

/// 临时端口范围
pub const TCP_EPHEMERAL_RANGE: u32 = 16384;

/// 通告的接收窗口
pub const TCP_WINDOW: u16 = window_for(TCP_RECV_BUF_SIZE);

/// 接收缓冲区大小对应的窗口值，超出 16 位时取 `u16::MAX`
const fn window_for(buf_size: usize) -> u16 {
    if buf_size > u16::MAX as usize {
        u16::MAX
    } else {
        buf_size as u16
    }
}

bitflags! {
    /// TCP 标志位
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TcpFlags: u8 {
        const FIN = 0x01;
        const SYN = 0x02;
        const RST = 0x04;
        const PSH = 0x08;
        const ACK = 0x10;
        const URG = 0x20;
    }
}

/// TCP 状态
///
/// 对应 Linux 的 TCP 状态机
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum TcpState {
    /// 关闭
    TCP_CLOSED = 0,
    /// 监听
    TCP_LISTEN = 1,
    /// SYN 发送
    TCP_SYN_SENT = 2,
    /// SYN 接收
    TCP_SYN_RCVD = 3,
    /// 已建立
    TCP_ESTABLISHED = 4,
    /// FIN 等待 1
    TCP_FIN_WAIT1 = 5,
    /// FIN 等待 2
    TCP_FIN_WAIT2 = 6,
    /// 关闭等待
    TCP_CLOSE_WAIT = 7,
    /// 关闭中
    TCP_CLOSING = 8,
    /// 最后 ACK
    TCP_LAST_ACK = 9,
    /// 时间等待
    TCP_TIME_WAIT = 10,
}

/// TCP 头部
///
/// 对应 Linux 的 tcphdr (include/uapi/linux/tcp.h)，字段为主机字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHdr {
    /// 源端口
    pub source: u16,
    /// 目标端口
    pub dest: u16,
    /// 序列号
    pub seq: u32,
    /// 确认号
    pub ack_seq: u32,
    /// 头部长度 (字节)
    pub doff: usize,
    /// 标志
    pub flags: TcpFlags,
    /// 窗口大小
    pub window: u16,
    /// 校验和
    pub check: u16,
}

impl TcpHdr {
    /// 从字节切片解析 TCP 头部
    ///
    /// 检查数据偏移不小于 20 且不超过报文长度。
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < TCP_MIN_HLEN {
            return None;
        }

        let doff = ((data[12] >> 4) as usize) * 4;
        if doff < TCP_MIN_HLEN || doff > data.len() {
            return None;
        }

        Some(Self {
            source: u16::from_be_bytes([data[0], data[1]]),
            dest: u16::from_be_bytes([data[2], data[3]]),
            seq: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ack_seq: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            doff,
            flags: TcpFlags::from_bits_truncate(data[13]),
            window: u16::from_be_bytes([data[14], data[15]]),
            check: u16::from_be_bytes([data[16], data[17]]),
        })
    }

    /// 写入 20 字节头部 (校验和与紧急指针清零)
    pub fn write_to(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.source.to_be_bytes());
        out[2..4].copy_from_slice(&self.dest.to_be_bytes());
        out[4..8].copy_from_slice(&self.seq.to_be_bytes());
        out[8..12].copy_from_slice(&self.ack_seq.to_be_bytes());
        out[12] = ((TCP_MIN_HLEN / 4) as u8) << 4;
        out[13] = self.flags.bits();
        out[14..16].copy_from_slice(&self.window.to_be_bytes());
        out[16..20].copy_from_slice(&[0, 0, 0, 0]);
    }
}

/// 构造带校验和的 TCP 报文段
///
/// # 参数
/// - `out`: 输出缓冲区，至少 20 + data.len() 字节
/// - `hdr`: 头部
/// - `data`: 数据
/// - `saddr`, `daddr`: 用于伪头部的源/目的地址
///
/// # 返回
/// 报文段长度
pub fn tcp_build_segment(out: &mut [u8], hdr: &TcpHdr, data: &[u8], saddr: InAddr, daddr: InAddr) -> usize {
    let len = TCP_MIN_HLEN + data.len();
    let seg = &mut out[..len];
    hdr.write_to(seg);
    seg[TCP_MIN_HLEN..].copy_from_slice(data);

    let csum = transport_checksum(saddr, daddr, IpProtocol::IPPROTO_TCP.to_u8(), seg);
    seg[16..18].copy_from_slice(&csum.to_be_bytes());
    len
}

/// TCP 套接字句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHandle(pub usize);

/// TCP 连接
struct TcpSocket {
    state: TcpState,
    local_port: u16,
    remote_port: u16,
    remote_ip: InAddr,
    /// 我方下一个要发送的序列号
    seq: u32,
    /// 期望对方发送的下一个序列号
    ack: u32,
    recv: RingBuffer<TCP_RECV_BUF_SIZE>,
    /// 收到过对端的 RST
    reset: bool,
    in_use: bool,
}

impl TcpSocket {
    const EMPTY: TcpSocket = TcpSocket {
        state: TcpState::TCP_CLOSED,
        local_port: 0,
        remote_port: 0,
        remote_ip: 0,
        seq: 0,
        ack: 0,
        recv: RingBuffer::new(),
        reset: false,
        in_use: false,
    };
}

/// TCP 连接表
pub struct TcpTable {
    socks: [TcpSocket; TCP_SOCKET_TABLE_SIZE],
    /// 初始序列号计数器
    isn: u32,
}

impl TcpTable {
    /// 创建空表
    pub const fn new(isn: u32) -> Self {
        Self {
            socks: [TcpSocket::EMPTY; TCP_SOCKET_TABLE_SIZE],
            isn,
        }
    }

    fn get(&self, handle: TcpHandle) -> Result<&TcpSocket, NetError> {
        self.socks
            .get(handle.0)
            .filter(|s| s.in_use)
            .ok_or(NetError::BadHandle)
    }

    fn get_mut(&mut self, handle: TcpHandle) -> Result<&mut TcpSocket, NetError> {
        self.socks
            .get_mut(handle.0)
            .filter(|s| s.in_use)
            .ok_or(NetError::BadHandle)
    }

    fn set_state(&mut self, idx: usize, state: TcpState) {
        let sock = &mut self.socks[idx];
        if sock.state != state {
            debug!("tcp: sock {} {:?} -> {:?}", idx, sock.state, state);
            sock.state = state;
        }
    }

    fn free(&mut self, idx: usize) {
        self.set_state(idx, TcpState::TCP_CLOSED);
        let sock = &mut self.socks[idx];
        sock.in_use = false;
        sock.recv.clear();
    }

    /// 按四元组查找连接，找不到时退回到该端口上的监听套接字
    fn demux(&self, local_port: u16, remote_ip: InAddr, remote_port: u16) -> Option<usize> {
        let live = |s: &TcpSocket| s.in_use && s.local_port == local_port;

        self.socks
            .iter()
            .position(|s| {
                live(s)
                    && s.state != TcpState::TCP_LISTEN
                    && s.remote_ip == remote_ip
                    && s.remote_port == remote_port
            })
            .or_else(|| {
                self.socks
                    .iter()
                    .position(|s| live(s) && s.state == TcpState::TCP_LISTEN)
            })
    }
}

impl<D: NetDevice, C: Clock> NetStack<D, C> {
    /// 创建 TCP 套接字
    ///
    /// # 返回
    /// 处于 CLOSED 状态的套接字；表满返回 `NoFreeSocket`
    pub fn tcp_socket(&mut self) -> Result<TcpHandle, NetError> {
        let idx = match self.tcp.socks.iter().position(|s| !s.in_use) {
            Some(idx) => idx,
            None => {
                warn!("tcp: socket table full");
                return Err(NetError::NoFreeSocket);
            }
        };

        let isn = self.tcp.isn;
        self.tcp.isn = isn.wrapping_add(1);

        let sock = &mut self.tcp.socks[idx];
        sock.in_use = true;
        sock.state = TcpState::TCP_CLOSED;
        sock.local_port = 0;
        sock.remote_port = 0;
        sock.remote_ip = 0;
        sock.seq = isn;
        sock.ack = 0;
        sock.reset = false;
        sock.recv.clear();

        Ok(TcpHandle(idx))
    }

    /// 绑定本地端口
    pub fn tcp_bind(&mut self, handle: TcpHandle, port: u16) -> Result<(), NetError> {
        self.tcp.get_mut(handle)?.local_port = port;
        Ok(())
    }

    /// 进入监听状态
    ///
    /// 收到 SYN 后该套接字本身转为连接 (LISTEN → SYN_RCVD → ESTABLISHED)。
    pub fn tcp_listen(&mut self, handle: TcpHandle) -> Result<(), NetError> {
        self.tcp.get(handle)?;
        self.tcp.set_state(handle.0, TcpState::TCP_LISTEN);
        Ok(())
    }

    /// 主动连接
    ///
    /// 未绑定端口时分配临时端口，发送 SYN 后序列号加 1，
    /// 然后等待最多 5 秒离开 SYN_SENT。超时后回到 CLOSED，不发送 RST。
    /// 同一批帧里对端紧接着发来 FIN 时套接字已到 CLOSE_WAIT，仍算连接成功。
    ///
    /// # 返回
    /// 超时返回 `Timeout`；收到 RST 返回 `ConnectionReset`
    pub fn tcp_connect(&mut self, handle: TcpHandle, ip: InAddr, port: u16) -> Result<(), NetError> {
        let isn = self.tcp.isn;
        let sock = self.tcp.get_mut(handle)?;
        if sock.state != TcpState::TCP_CLOSED {
            return Err(NetError::InvalidState);
        }

        sock.remote_ip = ip;
        sock.remote_port = port;
        sock.reset = false;
        if sock.local_port == 0 {
            sock.local_port = TCP_EPHEMERAL_BASE + (isn % TCP_EPHEMERAL_RANGE) as u16;
        }

        let idx = handle.0;
        self.tcp.set_state(idx, TcpState::TCP_SYN_SENT);
        if let Err(e) = self.tcp_send_segment(idx, TcpFlags::SYN, &[]) {
            self.tcp.set_state(idx, TcpState::TCP_CLOSED);
            return Err(e);
        }
        self.tcp.socks[idx].seq = self.tcp.socks[idx].seq.wrapping_add(1);

        let settled = self.wait_until(TCP_CONNECT_TIMEOUT_MS, |s| {
            s.tcp.socks[idx].state != TcpState::TCP_SYN_SENT
        });

        let reset = self.tcp.socks[idx].reset;
        match self.tcp.socks[idx].state {
            TcpState::TCP_ESTABLISHED | TcpState::TCP_CLOSE_WAIT => {
                debug!("tcp: connected to {}:{}", Ipv4Display(ip), port);
                Ok(())
            }
            _ if reset => {
                self.tcp.set_state(idx, TcpState::TCP_CLOSED);
                Err(NetError::ConnectionReset)
            }
            _ => {
                if !settled {
                    warn!("tcp: connect to {}:{} timed out", Ipv4Display(ip), port);
                }
                self.tcp.set_state(idx, TcpState::TCP_CLOSED);
                Err(NetError::Timeout)
            }
        }
    }

    /// 发送数据
    ///
    /// 只在 ESTABLISHED 状态下允许。整段数据以一个 ACK|PSH 报文段发出，
    /// 发送成功后序列号前进数据长度。
    ///
    /// # 返回
    /// 发送的字节数
    pub fn tcp_send(&mut self, handle: TcpHandle, data: &[u8]) -> Result<usize, NetError> {
        if self.tcp.get(handle)?.state != TcpState::TCP_ESTABLISHED {
            return Err(NetError::InvalidState);
        }
        if data.len() > TCP_MAX_PAYLOAD {
            return Err(NetError::MessageTooLong);
        }

        let idx = handle.0;
        self.tcp_send_segment(idx, TcpFlags::ACK | TcpFlags::PSH, data)?;
        let sock = &mut self.tcp.socks[idx];
        sock.seq = sock.seq.wrapping_add(data.len() as u32);
        Ok(data.len())
    }

    /// 接收数据
    ///
    /// 先 `poll()` 一次，再取出接收环中已有的数据，不会阻塞。
    ///
    /// # 返回
    /// 读出的字节数，没有数据时为 0
    pub fn tcp_recv(&mut self, handle: TcpHandle, buf: &mut [u8]) -> Result<usize, NetError> {
        self.tcp.get(handle)?;
        self.poll();
        Ok(self.tcp.get_mut(handle)?.recv.pop_into(buf))
    }

    /// 关闭连接
    ///
    /// - ESTABLISHED: 发送 FIN|ACK，序列号加 1，立即释放槽位
    /// - CLOSE_WAIT: 发送 FIN|ACK 进入 LAST_ACK，收到对方的 ACK 后释放
    /// - 其他状态: 立即释放
    pub fn tcp_close(&mut self, handle: TcpHandle) -> Result<(), NetError> {
        let state = self.tcp.get(handle)?.state;
        let idx = handle.0;

        match state {
            TcpState::TCP_ESTABLISHED => {
                self.tcp_send_fin(idx, TcpState::TCP_FIN_WAIT1);
                self.tcp.free(idx);
            }
            TcpState::TCP_CLOSE_WAIT => {
                self.tcp_send_fin(idx, TcpState::TCP_LAST_ACK);
            }
            _ => self.tcp.free(idx),
        }
        Ok(())
    }

    /// 半关闭
    ///
    /// 发送 FIN|ACK 进入 FIN_WAIT1，保留槽位以便继续接收对方的数据和 FIN。
    pub fn tcp_shutdown(&mut self, handle: TcpHandle) -> Result<(), NetError> {
        if self.tcp.get(handle)?.state != TcpState::TCP_ESTABLISHED {
            return Err(NetError::InvalidState);
        }
        self.tcp_send_fin(handle.0, TcpState::TCP_FIN_WAIT1);
        Ok(())
    }

    /// 连接状态
    pub fn tcp_state(&self, handle: TcpHandle) -> Result<TcpState, NetError> {
        Ok(self.tcp.get(handle)?.state)
    }

    /// 本地端口
    pub fn tcp_local_port(&self, handle: TcpHandle) -> Result<u16, NetError> {
        Ok(self.tcp.get(handle)?.local_port)
    }

    /// 对端地址和端口
    pub fn tcp_remote(&self, handle: TcpHandle) -> Result<(InAddr, u16), NetError> {
        let sock = self.tcp.get(handle)?;
        Ok((sock.remote_ip, sock.remote_port))
    }

    /// 我方下一个序列号
    pub fn tcp_seq(&self, handle: TcpHandle) -> Result<u32, NetError> {
        Ok(self.tcp.get(handle)?.seq)
    }

    /// 期望对方的下一个序列号
    pub fn tcp_ack(&self, handle: TcpHandle) -> Result<u32, NetError> {
        Ok(self.tcp.get(handle)?.ack)
    }

    /// 接收环中未读的字节数
    pub fn tcp_pending(&self, handle: TcpHandle) -> Result<usize, NetError> {
        Ok(self.tcp.get(handle)?.recv.len())
    }

    fn tcp_send_fin(&mut self, idx: usize, next: TcpState) {
        if let Err(e) = self.tcp_send_segment(idx, TcpFlags::FIN | TcpFlags::ACK, &[]) {
            debug!("tcp: sock {} FIN not sent: {}", idx, e);
        }
        let sock = &mut self.tcp.socks[idx];
        sock.seq = sock.seq.wrapping_add(1);
        self.tcp.set_state(idx, next);
    }

    /// 按连接当前的序列号/确认号发送一个报文段
    fn tcp_send_segment(&mut self, idx: usize, flags: TcpFlags, data: &[u8]) -> Result<(), NetError> {
        let sock = &self.tcp.socks[idx];
        let hdr = TcpHdr {
            source: sock.local_port,
            dest: sock.remote_port,
            seq: sock.seq,
            ack_seq: sock.ack,
            doff: TCP_MIN_HLEN,
            flags,
            window: TCP_WINDOW,
            check: 0,
        };
        let remote_ip = sock.remote_ip;

        let mut seg = [0u8; IP_MAX_PAYLOAD];
        let len = tcp_build_segment(&mut seg, &hdr, data, self.cfg.ip, remote_ip);
        self.ip_send(remote_ip, IpProtocol::IPPROTO_TCP, &seg[..len])
    }

    fn tcp_send_ack(&mut self, idx: usize) {
        if let Err(e) = self.tcp_send_segment(idx, TcpFlags::ACK, &[]) {
            debug!("tcp: sock {} ACK not sent: {}", idx, e);
        }
    }

    /// 处理接收到的 TCP 报文段
    pub(crate) fn tcp_handle(&mut self, data: &[u8], src_ip: InAddr) {
        let hdr = match TcpHdr::from_bytes(data) {
            Some(hdr) => hdr,
            None => return,
        };

        let idx = match self.tcp.demux(hdr.dest, src_ip, hdr.source) {
            Some(idx) => idx,
            None => {
                debug!("tcp: no socket for port {}", hdr.dest);
                return;
            }
        };

        let flags = hdr.flags;
        let state = self.tcp.socks[idx].state;

        if flags.contains(TcpFlags::RST) {
            if state != TcpState::TCP_LISTEN && state != TcpState::TCP_CLOSED {
                warn!("tcp: sock {} reset by {}", idx, Ipv4Display(src_ip));
                self.tcp.socks[idx].reset = true;
                self.tcp.set_state(idx, TcpState::TCP_CLOSED);
            }
            return;
        }

        match state {
            TcpState::TCP_LISTEN => {
                if flags.contains(TcpFlags::SYN) {
                    let sock = &mut self.tcp.socks[idx];
                    sock.remote_ip = src_ip;
                    sock.remote_port = hdr.source;
                    sock.ack = hdr.seq.wrapping_add(1);
                    self.tcp.set_state(idx, TcpState::TCP_SYN_RCVD);
                    if let Err(e) = self.tcp_send_segment(idx, TcpFlags::SYN | TcpFlags::ACK, &[]) {
                        debug!("tcp: sock {} SYN|ACK not sent: {}", idx, e);
                    }
                    let sock = &mut self.tcp.socks[idx];
                    sock.seq = sock.seq.wrapping_add(1);
                }
            }
            TcpState::TCP_SYN_SENT => {
                if flags.contains(TcpFlags::SYN | TcpFlags::ACK) {
                    self.tcp.socks[idx].ack = hdr.seq.wrapping_add(1);
                    self.tcp.set_state(idx, TcpState::TCP_ESTABLISHED);
                    self.tcp_send_ack(idx);
                }
            }
            TcpState::TCP_SYN_RCVD => {
                if flags.contains(TcpFlags::ACK) {
                    self.tcp.set_state(idx, TcpState::TCP_ESTABLISHED);
                }
            }
            TcpState::TCP_ESTABLISHED => {
                if flags.contains(TcpFlags::FIN) {
                    self.tcp.socks[idx].ack = hdr.seq.wrapping_add(1);
                    self.tcp.set_state(idx, TcpState::TCP_CLOSE_WAIT);
                    self.tcp_send_ack(idx);
                } else if flags.contains(TcpFlags::ACK) {
                    let payload = &data[hdr.doff..];
                    if !payload.is_empty() {
                        let sock = &mut self.tcp.socks[idx];
                        let stored = sock.recv.push(payload);
                        if stored < payload.len() {
                            debug!("tcp: sock {} dropped {} bytes", idx, payload.len() - stored);
                        }
                        sock.ack = sock.ack.wrapping_add(payload.len() as u32);
                        self.tcp_send_ack(idx);
                    }
                }
            }
            TcpState::TCP_FIN_WAIT1 => {
                if flags.contains(TcpFlags::ACK) {
                    self.tcp.set_state(idx, TcpState::TCP_FIN_WAIT2);
                }
                if flags.contains(TcpFlags::FIN) {
                    self.tcp.socks[idx].ack = hdr.seq.wrapping_add(1);
                    self.tcp_send_ack(idx);
                    self.tcp.set_state(idx, TcpState::TCP_TIME_WAIT);
                }
            }
            TcpState::TCP_FIN_WAIT2 => {
                if flags.contains(TcpFlags::FIN) {
                    self.tcp.socks[idx].ack = hdr.seq.wrapping_add(1);
                    self.tcp_send_ack(idx);
                    self.tcp.set_state(idx, TcpState::TCP_TIME_WAIT);
                }
            }
            TcpState::TCP_LAST_ACK => {
                if flags.contains(TcpFlags::ACK) {
                    self.tcp.free(idx);
                }
            }
            TcpState::TCP_CLOSED
            | TcpState::TCP_CLOSE_WAIT
            | TcpState::TCP_CLOSING
            | TcpState::TCP_TIME_WAIT => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{Loopback, StepClock};

    const PEER_IP: InAddr = 0x0A00_0002;
    const PEER_MAC: [u8; 6] = [0x52, 0x54, 0x00, 0xAA, 0xBB, 0xCC];

    fn stack() -> NetStack<Loopback, StepClock> {
        let mut s = NetStack::new(Loopback::new(), StepClock::new(0, 1));
        s.arp_add(PEER_IP, PEER_MAC);
        s
    }

    fn segment(s: &NetStack<Loopback, StepClock>, dst_port: u16, seq: u32, flags: TcpFlags, data: &[u8]) -> ([u8; 1500], usize) {
        let hdr = TcpHdr {
            source: 40000,
            dest: dst_port,
            seq,
            ack_seq: 0,
            doff: TCP_MIN_HLEN,
            flags,
            window: 1024,
            check: 0,
        };
        let mut out = [0u8; 1500];
        let len = tcp_build_segment(&mut out, &hdr, data, PEER_IP, s.ip());
        (out, len)
    }

    fn feed(s: &mut NetStack<Loopback, StepClock>, port: u16, seq: u32, flags: TcpFlags, data: &[u8]) {
        let (seg, len) = segment(s, port, seq, flags, data);
        s.tcp_handle(&seg[..len], PEER_IP);
    }

    #[test]
    fn test_tcp_header_roundtrip() {
        let hdr = TcpHdr {
            source: 1234,
            dest: 80,
            seq: 0x0102_0304,
            ack_seq: 0x0A0B_0C0D,
            doff: TCP_MIN_HLEN,
            flags: TcpFlags::SYN | TcpFlags::ACK,
            window: TCP_WINDOW,
            check: 0,
        };
        let mut buf = [0u8; 64];
        let len = tcp_build_segment(&mut buf, &hdr, b"hi", 1, 2);
        assert_eq!(len, 22);
        assert_eq!(buf[12], 0x50);
        assert_eq!(buf[13], 0x12);
        assert_eq!(transport_checksum(1, 2, 6, &buf[..len]), 0);

        let parsed = TcpHdr::from_bytes(&buf[..len]).unwrap();
        assert_eq!(parsed.seq, hdr.seq);
        assert_eq!(parsed.ack_seq, hdr.ack_seq);
        assert_eq!(parsed.flags, hdr.flags);
        assert_eq!(parsed.doff, TCP_MIN_HLEN);
    }

    #[test]
    fn test_tcp_header_rejects_bad_offset() {
        let mut buf = [0u8; 20];
        buf[12] = 0x40;
        assert!(TcpHdr::from_bytes(&buf).is_none());
        buf[12] = 0x60;
        assert!(TcpHdr::from_bytes(&buf).is_none());
    }

    #[test]
    fn test_socket_starts_closed() {
        let mut s = stack();
        let h = s.tcp_socket().unwrap();
        assert_eq!(s.tcp_state(h), Ok(TcpState::TCP_CLOSED));
        assert_eq!(s.tcp_local_port(h), Ok(0));
    }

    #[test]
    fn test_socket_table_full() {
        let mut s = stack();
        for _ in 0..TCP_SOCKET_TABLE_SIZE {
            s.tcp_socket().unwrap();
        }
        assert_eq!(s.tcp_socket(), Err(NetError::NoFreeSocket));
    }

    #[test]
    fn test_listen_handshake_in_two_segments() {
        let mut s = stack();
        let h = s.tcp_socket().unwrap();
        s.tcp_bind(h, 80).unwrap();
        s.tcp_listen(h).unwrap();
        let isn = s.tcp_seq(h).unwrap();

        feed(&mut s, 80, 1000, TcpFlags::SYN, &[]);
        assert_eq!(s.tcp_state(h), Ok(TcpState::TCP_SYN_RCVD));
        assert_eq!(s.tcp_ack(h), Ok(1001));
        assert_eq!(s.tcp_seq(h), Ok(isn.wrapping_add(1)));
        assert_eq!(s.tcp_remote(h), Ok((PEER_IP, 40000)));

        feed(&mut s, 80, 1001, TcpFlags::ACK, &[]);
        assert_eq!(s.tcp_state(h), Ok(TcpState::TCP_ESTABLISHED));
    }

    #[test]
    fn test_established_data_and_fin() {
        let mut s = stack();
        let h = s.tcp_socket().unwrap();
        s.tcp_bind(h, 80).unwrap();
        s.tcp_listen(h).unwrap();
        feed(&mut s, 80, 1000, TcpFlags::SYN, &[]);
        feed(&mut s, 80, 1001, TcpFlags::ACK, &[]);

        feed(&mut s, 80, 1001, TcpFlags::ACK | TcpFlags::PSH, b"hello");
        assert_eq!(s.tcp_ack(h), Ok(1006));
        assert_eq!(s.tcp_pending(h), Ok(5));

        let mut buf = [0u8; 16];
        let n = s.tcp_recv(h, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(s.tcp_recv(h, &mut buf), Ok(0));

        feed(&mut s, 80, 1006, TcpFlags::FIN | TcpFlags::ACK, &[]);
        assert_eq!(s.tcp_state(h), Ok(TcpState::TCP_CLOSE_WAIT));
        assert_eq!(s.tcp_ack(h), Ok(1007));
    }

    #[test]
    fn test_data_beyond_ring_is_dropped_but_acked() {
        let mut s = stack();
        let h = s.tcp_socket().unwrap();
        s.tcp_bind(h, 80).unwrap();
        s.tcp_listen(h).unwrap();
        feed(&mut s, 80, 1000, TcpFlags::SYN, &[]);
        feed(&mut s, 80, 1001, TcpFlags::ACK, &[]);

        let chunk = [0x5Au8; 1400];
        let mut seq = 1001u32;
        for _ in 0..3 {
            feed(&mut s, 80, seq, TcpFlags::ACK | TcpFlags::PSH, &chunk);
            seq += chunk.len() as u32;
        }

        assert_eq!(s.tcp_pending(h), Ok(TCP_RECV_BUF_SIZE));
        assert_eq!(s.tcp_ack(h), Ok(1001 + 3 * 1400));
    }

    #[test]
    fn test_window_saturates_at_u16_max() {
        assert_eq!(TCP_WINDOW as usize, TCP_RECV_BUF_SIZE.min(u16::MAX as usize));
        assert_eq!(window_for(4096), 4096);
        assert_eq!(window_for(65535), 65535);
        assert_eq!(window_for(65536), u16::MAX);
        assert_eq!(window_for(1 << 20), u16::MAX);
    }

    #[test]
    fn test_close_wait_to_last_ack() {
        let mut s = stack();
        let h = s.tcp_socket().unwrap();
        s.tcp_bind(h, 80).unwrap();
        s.tcp_listen(h).unwrap();
        feed(&mut s, 80, 1000, TcpFlags::SYN, &[]);
        feed(&mut s, 80, 1001, TcpFlags::ACK, &[]);
        feed(&mut s, 80, 1001, TcpFlags::FIN | TcpFlags::ACK, &[]);

        s.tcp_close(h).unwrap();
        assert_eq!(s.tcp_state(h), Ok(TcpState::TCP_LAST_ACK));

        feed(&mut s, 80, 1002, TcpFlags::ACK, &[]);
        assert_eq!(s.tcp_state(h), Err(NetError::BadHandle));
    }

    #[test]
    fn test_shutdown_reaches_time_wait() {
        let mut s = stack();
        let h = s.tcp_socket().unwrap();
        s.tcp_bind(h, 80).unwrap();
        s.tcp_listen(h).unwrap();
        feed(&mut s, 80, 1000, TcpFlags::SYN, &[]);
        feed(&mut s, 80, 1001, TcpFlags::ACK, &[]);

        s.tcp_shutdown(h).unwrap();
        assert_eq!(s.tcp_state(h), Ok(TcpState::TCP_FIN_WAIT1));

        feed(&mut s, 80, 1001, TcpFlags::ACK, &[]);
        assert_eq!(s.tcp_state(h), Ok(TcpState::TCP_FIN_WAIT2));

        feed(&mut s, 80, 1001, TcpFlags::FIN | TcpFlags::ACK, &[]);
        assert_eq!(s.tcp_state(h), Ok(TcpState::TCP_TIME_WAIT));
        assert_eq!(s.tcp_ack(h), Ok(1002));

        s.tcp_close(h).unwrap();
        assert_eq!(s.tcp_state(h), Err(NetError::BadHandle));
    }

    #[test]
    fn test_close_established_frees_slot() {
        let mut s = stack();
        let h = s.tcp_socket().unwrap();
        s.tcp_bind(h, 80).unwrap();
        s.tcp_listen(h).unwrap();
        feed(&mut s, 80, 1000, TcpFlags::SYN, &[]);
        feed(&mut s, 80, 1001, TcpFlags::ACK, &[]);

        s.tcp_close(h).unwrap();
        assert_eq!(s.tcp_state(h), Err(NetError::BadHandle));
        let mut buf = [0u8; 4];
        assert_eq!(s.tcp_recv(h, &mut buf), Err(NetError::BadHandle));
    }

    #[test]
    fn test_rst_forces_closed() {
        let mut s = stack();
        let h = s.tcp_socket().unwrap();
        s.tcp_bind(h, 80).unwrap();
        s.tcp_listen(h).unwrap();
        feed(&mut s, 80, 1000, TcpFlags::SYN, &[]);
        feed(&mut s, 80, 1001, TcpFlags::ACK, &[]);

        feed(&mut s, 80, 1001, TcpFlags::RST, &[]);
        assert_eq!(s.tcp_state(h), Ok(TcpState::TCP_CLOSED));
        assert_eq!(s.tcp_send(h, b"x"), Err(NetError::InvalidState));
    }

    #[test]
    fn test_send_requires_established() {
        let mut s = stack();
        let h = s.tcp_socket().unwrap();
        assert_eq!(s.tcp_send(h, b"data"), Err(NetError::InvalidState));
        assert_eq!(s.tcp_shutdown(h), Err(NetError::InvalidState));
    }

    #[test]
    fn test_segment_for_unknown_port_is_ignored() {
        let mut s = stack();
        let h = s.tcp_socket().unwrap();
        s.tcp_bind(h, 80).unwrap();
        s.tcp_listen(h).unwrap();

        feed(&mut s, 81, 1000, TcpFlags::SYN, &[]);
        assert_eq!(s.tcp_state(h), Ok(TcpState::TCP_LISTEN));
        assert_eq!(s.device_stats().tx_packets, 0);
    }
}
