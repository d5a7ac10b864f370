//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! DNS 客户端
//!
//! 基于 UDP 的 A 记录查询 (RFC 1035 子集)：单个问题，
//! 解析应答时支持名字压缩指针。

use log::{debug, info};

use crate::config::DNS_TIMEOUT_MS;
use crate::drivers::space::{Clock, NetDevice};
use crate::errno::NetError;
use crate::ifconfig::{parse_ipv4, Ipv4Display};
use crate::ipv4::InAddr;
use crate::stack::NetStack;

/// DNS 服务端口
pub const DNS_PORT: u16 = 53;

/// DNS 头部长度
pub const DNS_HLEN: usize = 12;

/// 标准 UDP DNS 报文最大长度
pub const DNS_MAX_MSG: usize = 512;

/// 名字最大长度
pub const DNS_NAME_MAX: usize = 253;

/// 标签最大长度
pub const DNS_LABEL_MAX: usize = 63;

/// QR 标志：报文是应答
pub const DNS_FLAG_QR: u16 = 0x8000;

/// RD 标志：期望递归
pub const DNS_FLAG_RD: u16 = 0x0100;

/// 记录类型 A
pub const DNS_TYPE_A: u16 = 1;

/// 记录类 IN
pub const DNS_CLASS_IN: u16 = 1;

/// 查询使用的本地端口基数
const DNS_LOCAL_PORT_BASE: u16 = 1024;

/// DNS 头部
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DnsHeader {
    /// 事务 ID
    pub id: u16,
    /// 标志
    pub flags: u16,
    /// 问题数
    pub qdcount: u16,
    /// 应答记录数
    pub ancount: u16,
    /// 授权记录数
    pub nscount: u16,
    /// 附加记录数
    pub arcount: u16,
}

impl DnsHeader {
    /// 从字节切片解析
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < DNS_HLEN {
            return None;
        }
        Some(Self {
            id: u16::from_be_bytes([buf[0], buf[1]]),
            flags: u16::from_be_bytes([buf[2], buf[3]]),
            qdcount: u16::from_be_bytes([buf[4], buf[5]]),
            ancount: u16::from_be_bytes([buf[6], buf[7]]),
            nscount: u16::from_be_bytes([buf[8], buf[9]]),
            arcount: u16::from_be_bytes([buf[10], buf[11]]),
        })
    }

    /// 写入 12 字节头部
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.id.to_be_bytes());
        buf[2..4].copy_from_slice(&self.flags.to_be_bytes());
        buf[4..6].copy_from_slice(&self.qdcount.to_be_bytes());
        buf[6..8].copy_from_slice(&self.ancount.to_be_bytes());
        buf[8..10].copy_from_slice(&self.nscount.to_be_bytes());
        buf[10..12].copy_from_slice(&self.arcount.to_be_bytes());
    }

    /// 是否为应答
    pub fn is_response(&self) -> bool {
        self.flags & DNS_FLAG_QR != 0
    }
}

/// 把主机名编码为长度前缀的标签序列
///
/// `"example.com"` → `[7, e,x,a,m,p,l,e, 3, c,o,m, 0]`
///
/// 允许一个结尾的点；空标签或超过 63 字节的标签返回 `InvalidArgument`。
///
/// # 返回
/// 写入的字节数
pub fn dns_encode_name(name: &str, out: &mut [u8]) -> Result<usize, NetError> {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() || name.len() > DNS_NAME_MAX {
        return Err(NetError::InvalidArgument);
    }

    let mut pos = 0;
    for label in name.split('.') {
        let label = label.as_bytes();
        if label.is_empty() || label.len() > DNS_LABEL_MAX {
            return Err(NetError::InvalidArgument);
        }
        // 长度字节 + 标签 + 至少一个结尾的 0
        if pos + 1 + label.len() >= out.len() {
            return Err(NetError::MessageTooLong);
        }
        out[pos] = label.len() as u8;
        out[pos + 1..pos + 1 + label.len()].copy_from_slice(label);
        pos += 1 + label.len();
    }

    out[pos] = 0;
    Ok(pos + 1)
}

/// 构造 A 记录查询
///
/// # 返回
/// 查询报文长度
pub fn dns_build_query(id: u16, name: &str, out: &mut [u8]) -> Result<usize, NetError> {
    if out.len() < DNS_HLEN {
        return Err(NetError::MessageTooLong);
    }

    DnsHeader {
        id,
        flags: DNS_FLAG_RD,
        qdcount: 1,
        ..DnsHeader::default()
    }
    .write_to(out);

    let mut pos = DNS_HLEN + dns_encode_name(name, &mut out[DNS_HLEN..])?;
    if pos + 4 > out.len() {
        return Err(NetError::MessageTooLong);
    }
    out[pos..pos + 2].copy_from_slice(&DNS_TYPE_A.to_be_bytes());
    out[pos + 2..pos + 4].copy_from_slice(&DNS_CLASS_IN.to_be_bytes());
    pos += 4;

    Ok(pos)
}

/// 跳过报文中 `pos` 处的名字
///
/// 遇到压缩指针 (高两位为 11) 时名字在指针之后结束。
///
/// # 返回
/// 名字之后的偏移；越界返回 None
pub fn skip_name(msg: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = *msg.get(pos)?;
        if len == 0 {
            return Some(pos + 1);
        }
        if len & 0xC0 == 0xC0 {
            msg.get(pos + 1)?;
            return Some(pos + 2);
        }
        pos += 1 + len as usize;
    }
}

fn be16(msg: &[u8], pos: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*msg.get(pos)?, *msg.get(pos + 1)?]))
}

/// 解析应答，取第一条 A 记录
///
/// # 参数
/// - `id`: 查询时使用的事务 ID
/// - `resp`: 应答报文
///
/// # 返回
/// 依次检查：报文长度、事务 ID、QR 标志、应答数，失败时返回各自的错误码
pub fn dns_parse_response(id: u16, resp: &[u8]) -> Result<InAddr, NetError> {
    let hdr = DnsHeader::from_bytes(resp).ok_or(NetError::DnsNoResponse)?;

    if hdr.id != id {
        return Err(NetError::DnsIdMismatch);
    }
    if !hdr.is_response() {
        return Err(NetError::DnsNotResponse);
    }
    if hdr.ancount == 0 {
        return Err(NetError::DnsNoAnswers);
    }

    // 跳过问题部分
    let mut pos = DNS_HLEN;
    for _ in 0..hdr.qdcount {
        pos = skip_name(resp, pos).ok_or(NetError::DnsNoARecord)? + 4;
    }

    for _ in 0..hdr.ancount {
        pos = match skip_name(resp, pos) {
            Some(p) => p,
            None => break,
        };

        // TYPE(2) CLASS(2) TTL(4) RDLENGTH(2)
        let (rtype, rdlen) = match (be16(resp, pos), be16(resp, pos + 8)) {
            (Some(t), Some(l)) => (t, l as usize),
            _ => break,
        };
        pos += 10;

        if pos + rdlen > resp.len() {
            break;
        }
        if rtype == DNS_TYPE_A && rdlen == 4 {
            return Ok(u32::from_be_bytes([resp[pos], resp[pos + 1], resp[pos + 2], resp[pos + 3]]));
        }
        pos += rdlen;
    }

    Err(NetError::DnsNoARecord)
}

impl<D: NetDevice, C: Clock> NetStack<D, C> {
    /// 解析主机名
    ///
    /// 点分十进制地址直接返回，不发送查询。否则向配置的 DNS 服务器
    /// 发送一次查询并等待最多 3 秒。
    ///
    /// # 返回
    /// 第一条 A 记录的地址
    pub fn dns_lookup(&mut self, hostname: &str) -> Result<InAddr, NetError> {
        if let Some(ip) = parse_ipv4(hostname) {
            return Ok(ip);
        }

        let id = self.dns_id;
        self.dns_id = self.dns_id.wrapping_add(1);

        let mut query = [0u8; DNS_MAX_MSG];
        let qlen = dns_build_query(id, hostname, &mut query)?;

        let server = self.cfg.dns_server;
        let sock = self.udp_open(DNS_LOCAL_PORT_BASE + id % 1000)?;

        if let Err(e) = self.udp_send(sock, server, DNS_PORT, &query[..qlen]) {
            self.udp_close(sock);
            return Err(e);
        }
        debug!("dns: query {} id={} to {}", hostname, id, Ipv4Display(server));

        let mut resp = [0u8; DNS_MAX_MSG];
        let received = self.udp_recv(sock, &mut resp, DNS_TIMEOUT_MS);
        self.udp_close(sock);

        let len = match received {
            Ok(r) => r.len,
            Err(NetError::Timeout) => return Err(NetError::DnsNoResponse),
            Err(e) => return Err(e),
        };

        let ip = dns_parse_response(id, &resp[..len])?;
        info!("dns: {} -> {}", hostname, Ipv4Display(ip));
        Ok(ip)
    }
}
