//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! IP 校验和计算
//!
//! 完全遵循 RFC 1071 - Computing the Internet Checksum

/// 把数据按 16 位大端字累加到 `sum` 上（不折叠、不取反）
///
/// 奇数长度时最后一个字节按高 8 位补零处理。
pub fn checksum_add(mut sum: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum = sum.wrapping_add(u16::from_be_bytes([word[0], word[1]]) as u32);
    }
    if let [last] = chunks.remainder() {
        sum = sum.wrapping_add((*last as u32) << 8);
    }
    sum
}

/// 折叠进位并取反
pub fn checksum_fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// 计算 IP 校验和
///
/// # 参数
/// - `data`: 数据
///
/// # 返回
/// 校验和 (主机字节序，写入报文时使用 to_be_bytes)
pub fn ip_checksum(data: &[u8]) -> u16 {
    checksum_fold(checksum_add(0, data))
}

/// 验证 IP 校验和
///
/// 校验和字段已填入时，对同一段数据重新求和结果为 0。
pub fn verify_ip_checksum(data: &[u8]) -> bool {
    ip_checksum(data) == 0
}

/// 伪头部部分和 (用于 TCP/UDP)
///
/// # 参数
/// - `src_addr`: 源 IP 地址
/// - `dst_addr`: 目标 IP 地址
/// - `protocol`: 协议号
/// - `len`: TCP/UDP 头部加数据的长度
///
/// # 返回
/// 未折叠的部分和，需继续累加报文内容
pub fn pseudo_header_sum(src_addr: u32, dst_addr: u32, protocol: u8, len: u16) -> u32 {
    let mut pseudo_header = [0u8; 12];

    // 源 IP 地址 (4 字节)
    pseudo_header[0..4].copy_from_slice(&src_addr.to_be_bytes());

    // 目标 IP 地址 (4 字节)
    pseudo_header[4..8].copy_from_slice(&dst_addr.to_be_bytes());

    // 保留 (1 字节) + 协议 (1 字节)
    pseudo_header[9] = protocol;

    // TCP/UDP 长度 (2 字节)
    pseudo_header[10..12].copy_from_slice(&len.to_be_bytes());

    checksum_add(0, &pseudo_header)
}

/// 带伪头部的传输层校验和
///
/// `segment` 是完整的传输层报文 (头部 + 数据)，校验和字段应为 0。
pub fn transport_checksum(src_addr: u32, dst_addr: u32, protocol: u8, segment: &[u8]) -> u16 {
    let sum = pseudo_header_sum(src_addr, dst_addr, protocol, segment.len() as u16);
    checksum_fold(checksum_add(sum, segment))
}
