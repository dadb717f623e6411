/// 秒数转为展示用的时长字符串
///
/// - 不足一分钟: `00:SS`
/// - 不足一小时: `MM:SS`
/// - 不足一天: `HH:MM:SS`
/// - 其余: `DD:HH:MM:SS`
/// - 0 秒返回 `-`
pub fn seconds_to_min(seconds: u64) -> String {
    let days = seconds / (3600 * 24);
    let hours = seconds / 3600 % 24;
    let minutes = seconds % 3600 / 60;
    let secs = seconds % 60;
    if days > 0 {
        format!("{:02}:{:02}:{:02}:{:02}", days, hours, minutes, secs)
    } else if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{:02}:{:02}", minutes, secs)
    } else if secs > 0 {
        format!("00:{:02}", secs)
    } else {
        "-".to_string()
    }
}

/// 秒数转为 ffmpeg 可识别的 `HH:MM:SS`
pub fn seconds_to_hms(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = seconds % 3600 / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// 解析 `HH:MM:SS` / `MM:SS` / `SS` 格式，非法输入返回 None
pub fn time_to_seconds(text: &str) -> Option<u64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut total: u64 = 0;
    for part in trimmed.split(':') {
        let value: u64 = part.trim().parse().ok()?;
        total = total.checked_mul(60)?.checked_add(value)?;
    }
    Some(total)
}
