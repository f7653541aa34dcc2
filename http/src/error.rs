use std::{
    error,
    fmt,
    io::{Error as IoError, ErrorKind as IoErrorKind},
};

/// HTTP 传输错误类型
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 非法的请求 / 响应错误
    InvalidRequestResponse,

    /// 非法的 URL
    InvalidUrl,

    /// 非法的 HTTP 头
    InvalidHeader,

    /// 网络连接失败
    ConnectError,

    /// 代理连接失败
    ProxyError,

    /// DNS 服务器连接失败
    DnsServerError,

    /// 域名解析失败
    UnknownHostError,

    /// 发送失败
    SendError,

    /// 接受失败
    ReceiveError,

    /// 本地 IO 失败
    LocalIoError,

    /// 超时失败
    TimeoutError,

    /// SSL 错误
    SslError,

    /// 重定向次数过多
    TooManyRedirect,

    /// 响应提前结束
    UnexpectedEof,

    /// 连接被重置
    ConnectionReset,

    /// 连接被中止
    ConnectionAborted,

    /// 管道损坏
    BrokenPipe,

    /// 未知错误
    UnknownError,

    /// 用户取消
    UserCanceled,
}

impl ErrorKind {
    /// 判定错误类型是否为瞬时网络故障
    ///
    /// 瞬时故障指重新发起同一个请求有机会成功的故障
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::UnexpectedEof
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::TimeoutError
        )
    }
}

/// HTTP 传输错误
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    error: Box<dyn error::Error + Send + Sync>,
}

impl Error {
    /// 创建 HTTP 传输错误
    #[inline]
    pub fn new(kind: ErrorKind, err: impl Into<Box<dyn error::Error + Send + Sync>>) -> Self {
        Error {
            kind,
            error: err.into(),
        }
    }

    /// 获取 HTTP 传输错误类型
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn into_inner(self) -> Box<dyn error::Error + Send + Sync> {
        self.error
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl error::Error for Error {
    #[inline]
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

impl From<IoErrorKind> for ErrorKind {
    fn from(kind: IoErrorKind) -> Self {
        match kind {
            IoErrorKind::UnexpectedEof => ErrorKind::UnexpectedEof,
            IoErrorKind::ConnectionReset => ErrorKind::ConnectionReset,
            IoErrorKind::ConnectionAborted => ErrorKind::ConnectionAborted,
            IoErrorKind::BrokenPipe => ErrorKind::BrokenPipe,
            IoErrorKind::TimedOut | IoErrorKind::WouldBlock => ErrorKind::TimeoutError,
            IoErrorKind::ConnectionRefused | IoErrorKind::NotConnected => ErrorKind::ConnectError,
            _ => ErrorKind::LocalIoError,
        }
    }
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Self {
        Self::new(err.kind().into(), err)
    }
}
