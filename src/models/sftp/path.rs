// 远程路径工具

/// 连接路径，保证中间只有一个 /
pub fn join_path(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name.trim_start_matches('/'))
}
