//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络协议栈错误代码定义
//!
//! 所有可失败的操作都返回 `Result<T, NetError>`；
//! 接收路径上的解析错误在发现处直接丢弃，不会向上传递。
//!
//! 使用方法：
//! ```rust
//! use rux_net::errno::NetError;
//!
//! // 系统调用风格，返回负数
//! assert_eq!(NetError::Timeout.as_neg_i32(), -1);
//! ```

use core::fmt;

/// 网络错误代码
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NetError {
    /// 等待超过截止时间 (ARP 解析、TCP 连接、UDP/DNS 接收、ping)
    Timeout = 1,

    /// 负载超过单帧可承载的长度
    MessageTooLong = 2,

    /// 套接字句柄无效或已关闭
    BadHandle = 3,

    /// 套接字表已满
    NoFreeSocket = 4,

    /// 当前连接状态不允许该操作
    InvalidState = 5,

    /// 无法解析下一跳的 MAC 地址
    ArpFailed = 6,

    /// 链路层发送/接收失败
    LinkError = 7,

    /// 参数非法（主机名格式等）
    InvalidArgument = 8,

    /// 对端复位了连接
    ConnectionReset = 9,

    /// DNS: 没有收到应答
    DnsNoResponse = 10,

    /// DNS: 应答的事务 ID 与查询不符
    DnsIdMismatch = 11,

    /// DNS: 报文的 QR 位未置位
    DnsNotResponse = 12,

    /// DNS: 应答记录数为 0
    DnsNoAnswers = 13,

    /// DNS: 应答中没有 A 记录
    DnsNoARecord = 14,
}

impl NetError {
    /// 获取错误码（正数）
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 获取错误码（负数，调用方按状态码分支时使用）
    #[inline]
    pub const fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }

    /// 面向用户的错误描述
    pub const fn as_str(self) -> &'static str {
        match self {
            NetError::Timeout => "Timeout",
            NetError::MessageTooLong => "Message too long",
            NetError::BadHandle => "Bad socket handle",
            NetError::NoFreeSocket => "No free socket",
            NetError::InvalidState => "Invalid connection state",
            NetError::ArpFailed => "ARP failed",
            NetError::LinkError => "Link error",
            NetError::InvalidArgument => "Invalid argument",
            NetError::ConnectionReset => "Connection reset by peer",
            NetError::DnsNoResponse => "No response from DNS server",
            NetError::DnsIdMismatch => "DNS transaction id mismatch",
            NetError::DnsNotResponse => "DNS packet is not a response",
            NetError::DnsNoAnswers => "DNS response has no answers",
            NetError::DnsNoARecord => "No A record in DNS response",
        }
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
