//! 日志脱敏
//! 地址、交易哈希等用户可识别信息只输出首尾

/// 脱敏十六进制字符串（显示前缀和后缀）
pub fn redact_hex_string(hex: &str, show_chars: usize) -> String {
    if hex.len() <= show_chars * 2 {
        return "*".repeat(hex.len());
    }

    let prefix = &hex[..show_chars];
    let suffix = &hex[hex.len() - show_chars..];
    format!("{}...{}", prefix, suffix)
}

/// 脱敏地址（显示前6位和后4位）
pub fn redact_address(address: &str) -> String {
    if address.len() < 10 || !address.is_ascii() {
        return "*".repeat(address.len());
    }

    let prefix = &address[..6];
    let suffix = &address[address.len() - 4..];
    format!("{}...{}", prefix, suffix)
}
