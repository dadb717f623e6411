use domain::transcoding::TranscodeError;
use std::process::Stdio;
use tokio::process::Command;

fn build_probe_arguments(path: &str) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        path.to_string(),
    ]
}

/// ffprobe 输出的秒数（可能带小数）取整
pub fn parse_duration(stdout: &str) -> Option<u64> {
    let seconds: f64 = stdout.lines().next()?.trim().parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| seconds.round() as u64)
}

/// 用 ffprobe 读取媒体时长（秒）
pub async fn probe_duration(ffprobe_path: &str, path: &str) -> Result<u64, TranscodeError> {
    let output = Command::new(ffprobe_path)
        .args(build_probe_arguments(path))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            log::error!("[FFprobe] Failed to execute: {}", e);
            TranscodeError::Probe(format!("Failed to execute ffprobe: {}", e))
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        log::error!("[FFprobe] Probe failed: input={}, stderr={}", path, stderr);
        return Err(TranscodeError::Probe(stderr.to_string()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_duration(&stdout)
        .ok_or_else(|| TranscodeError::Probe(format!("unexpected ffprobe output: {}", stdout.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("212.480000\n"), Some(212));
        assert_eq!(parse_duration("59.6"), Some(60));
        assert_eq!(parse_duration("N/A\n"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[tokio::test]
    async fn test_missing_binary_is_probe_error() {
        let err = probe_duration("/nonexistent/ffprobe", "/tmp/a.mp3")
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Probe(_)));
    }
}
