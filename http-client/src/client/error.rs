use anyhow::Error as AnyError;
use assert_impl::assert_impl;
use sling_http::{
    Response, StatusCode, TransportError, TransportErrorKind,
};
use std::{
    error::Error as StdError,
    fmt::{self, Debug, Display},
    result,
};

/// 客户端错误类型
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 选项应用失败
    Config,

    /// 请求体序列化失败
    Marshal,

    /// 响应体反序列化失败
    Unmarshal,

    /// 没有匹配响应媒体类型的编解码器
    UnsupportedContentType,

    /// 读取响应体失败
    Io,

    /// HTTP 传输层错误
    Transport(TransportErrorKind),

    /// 响应状态码不符合预期
    UnexpectedStatus(StatusCode),

    /// 请求上下文被取消
    Cancelled,

    /// 重试次数用尽
    MaxAttemptsExceeded,
}

/// 客户端错误
///
/// 携带错误类型与产生错误的响应（如果有），
/// 便于调用方在出错时仍然检查原始响应内容
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    error: AnyError,
    response: Option<Box<Response>>,
}

impl Error {
    /// 创建客户端错误
    #[inline]
    pub fn new(kind: ErrorKind, err: impl Into<AnyError>) -> Self {
        Error {
            kind,
            error: err.into(),
            response: None,
        }
    }

    /// 通过描述信息创建客户端错误
    #[inline]
    pub fn new_with_msg(kind: ErrorKind, msg: impl Display + Debug + Send + Sync + 'static) -> Self {
        Error {
            kind,
            error: AnyError::msg(msg),
            response: None,
        }
    }

    /// 获取客户端错误类型
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 设置产生错误的响应
    #[inline]
    #[must_use]
    pub fn with_response(mut self, response: Response) -> Self {
        self.response = Some(Box::new(response));
        self
    }

    /// 获取产生错误的响应
    #[inline]
    pub fn response(&self) -> Option<&Response> {
        self.response.as_deref()
    }

    /// 取出产生错误的响应
    #[inline]
    pub fn take_response(&mut self) -> Option<Response> {
        self.response.take().map(|boxed| *boxed)
    }

    #[allow(dead_code)]
    fn assert() {
        assert_impl!(Send: Self);
        assert_impl!(Sync: Self);
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.error)
    }
}

impl StdError for Error {
    #[inline]
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.error.source()
    }
}

impl From<TransportError> for Error {
    #[inline]
    fn from(error: TransportError) -> Self {
        let kind = match error.kind() {
            TransportErrorKind::UserCanceled => ErrorKind::Cancelled,
            kind => ErrorKind::Transport(kind),
        };
        Self::new(kind, error)
    }
}

/// 客户端调用结果
pub type ApiResult<T> = result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use sling_http::ResponseBody;
    use std::io::{Error as IoError, ErrorKind as IoErrorKind};

    #[test]
    fn test_error_display_contains_kind() {
        let err = Error::new_with_msg(ErrorKind::Config, "invalid url");
        assert!(err.to_string().contains("Config"));
        assert!(err.to_string().contains("invalid url"));
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: Error = TransportError::new(
            TransportErrorKind::TimeoutError,
            IoError::new(IoErrorKind::TimedOut, "deadline exceeded"),
        )
        .into();
        assert_eq!(err.kind(), ErrorKind::Transport(TransportErrorKind::TimeoutError));

        let err: Error =
            TransportError::new(TransportErrorKind::UserCanceled, "user cancelled the request").into();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_error_carries_response() {
        let response = Response::builder()
            .status_code(StatusCode::INTERNAL_SERVER_ERROR)
            .bytes_as_body(b"boom!".to_vec())
            .build();
        let mut err = Error::new_with_msg(ErrorKind::UnexpectedStatus(StatusCode::INTERNAL_SERVER_ERROR), "boom")
            .with_response(response);
        assert_eq!(
            err.response().unwrap().status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let taken: Response<ResponseBody> = err.take_response().unwrap();
        assert_eq!(taken.body().bytes(), Some(b"boom!".as_slice()));
        assert!(err.response().is_none());
    }
}
