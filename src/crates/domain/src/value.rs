use std::fmt::{self, Display};

// Helper macro to define id newtypes and common trait impls
macro_rules! define_id {
    ($name:ident $(, $extra:ident)*) => {
        #[derive(Debug, Clone, Copy, PartialEq $(, $extra)*)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// 群组/频道 id（语音聊天所在的会话，或发起播放请求的会话）
define_id!(ChatId, Eq, Hash, PartialOrd, Ord);
// 助手账号 id（用于占用语音聊天席位的用户会话）
define_id!(AccountId, Eq, Hash, PartialOrd, Ord);
// 语音聊天参与者 id
define_id!(ParticipantId, Eq, Hash);
// 已发送消息的句柄（正在播放卡片、进度提示等）
define_id!(MessageId, Eq, Hash);
