use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use std::fmt::{self, Debug};

/// 请求上下文
///
/// 随 HTTP 请求传递的取消信号，克隆后共享同一个取消源
#[derive(Clone)]
pub struct Context {
    done: Option<Receiver<()>>,
}

impl Context {
    /// 创建不可取消的请求上下文
    #[inline]
    pub fn background() -> Self {
        Self { done: None }
    }

    /// 创建可取消的请求上下文
    ///
    /// 调用返回的 [`Canceller`] 的 `cancel()` 方法后，
    /// 该上下文以及它的所有克隆都进入取消状态
    pub fn with_cancel() -> (Self, Canceller) {
        let (tx, rx) = bounded::<()>(0);
        (Self { done: Some(rx) }, Canceller { _tx: tx })
    }

    /// 判定上下文是否已被取消
    pub fn is_cancelled(&self) -> bool {
        match &self.done {
            Some(done) => matches!(done.try_recv(), Err(TryRecvError::Disconnected)),
            None => false,
        }
    }

    /// 获取取消信号的接收端
    ///
    /// 上下文被取消时该通道断开，可用于 `select!` 等待
    #[inline]
    pub fn done(&self) -> Option<&Receiver<()>> {
        self.done.as_ref()
    }
}

impl Default for Context {
    #[inline]
    fn default() -> Self {
        Self::background()
    }
}

impl Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancellable", &self.done.is_some())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// 请求上下文的取消句柄
///
/// 丢弃该句柄与调用 `cancel()` 等效
#[derive(Debug)]
pub struct Canceller {
    _tx: Sender<()>,
}

impl Canceller {
    /// 取消关联的上下文
    #[inline]
    pub fn cancel(self) {
        drop(self)
    }
}
