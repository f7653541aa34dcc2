use std::time::Duration;

/// 请求超时扩展
///
/// 插入请求扩展信息后，本次请求使用给定的整体超时时长
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimeoutExtension(Duration);

impl TimeoutExtension {
    /// 创建请求超时扩展
    #[inline]
    pub fn new(timeout: Duration) -> Self {
        Self(timeout)
    }

    /// 获取超时时长
    #[inline]
    pub fn get(&self) -> Duration {
        self.0
    }
}
