pub const URL_PATH_API: &str = "/api";

/// 桥接服务与命令端共用的访问令牌头
pub const AUTHORIZATION_HEADER: &str = "Authorization";
