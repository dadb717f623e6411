use std::fmt::{self, Display};

/// 支持的播放倍速
///
/// 只有固定的几档会触发重新编码，其余数值一律按 1.0 处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlaybackSpeed {
    Half,
    ThreeQuarters,
    #[default]
    Normal,
    OneAndHalf,
    Double,
}

impl PlaybackSpeed {
    pub fn from_f32(value: f32) -> Self {
        match (value * 100.0).round() as i32 {
            50 => PlaybackSpeed::Half,
            75 => PlaybackSpeed::ThreeQuarters,
            150 => PlaybackSpeed::OneAndHalf,
            200 => PlaybackSpeed::Double,
            _ => PlaybackSpeed::Normal,
        }
    }

    pub fn as_f32(&self) -> f32 {
        match self {
            PlaybackSpeed::Half => 0.5,
            PlaybackSpeed::ThreeQuarters => 0.75,
            PlaybackSpeed::Normal => 1.0,
            PlaybackSpeed::OneAndHalf => 1.5,
            PlaybackSpeed::Double => 2.0,
        }
    }

    /// 缓存子目录名，同时也是 atempo 滤镜的参数
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackSpeed::Half => "0.5",
            PlaybackSpeed::ThreeQuarters => "0.75",
            PlaybackSpeed::Normal => "1.0",
            PlaybackSpeed::OneAndHalf => "1.5",
            PlaybackSpeed::Double => "2.0",
        }
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, PlaybackSpeed::Normal)
    }

    /// 视频轨 `setpts` 系数
    pub fn setpts_factor(&self) -> f32 {
        match self {
            PlaybackSpeed::Half => 2.0,
            PlaybackSpeed::ThreeQuarters => 1.35,
            PlaybackSpeed::Normal => 1.0,
            PlaybackSpeed::OneAndHalf => 0.68,
            PlaybackSpeed::Double => 0.5,
        }
    }

    /// 原速时间轴上的位置换算到当前倍速文件的时间轴
    pub fn convert_played(&self, seconds: u64) -> u64 {
        match self {
            PlaybackSpeed::Half => seconds * 2,
            PlaybackSpeed::ThreeQuarters => seconds + (50 * seconds) / 100,
            PlaybackSpeed::Normal => seconds,
            PlaybackSpeed::OneAndHalf => seconds - (25 * seconds) / 100,
            PlaybackSpeed::Double => seconds - (50 * seconds) / 100,
        }
    }

    /// `convert_played` 的逆运算：倍速文件上的位置还原到原速时间轴
    pub fn to_source_position(&self, seconds: u64) -> u64 {
        match self {
            PlaybackSpeed::Half => seconds / 2,
            PlaybackSpeed::ThreeQuarters => seconds * 100 / 150,
            PlaybackSpeed::Normal => seconds,
            PlaybackSpeed::OneAndHalf => seconds * 100 / 75,
            PlaybackSpeed::Double => seconds * 2,
        }
    }
}

impl Display for PlaybackSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
