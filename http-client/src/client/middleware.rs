use super::{
    error::{ApiResult, Error, ErrorKind},
    response::is_success,
};
use auto_impl::auto_impl;
use log::debug;
use sling_http::{
    HttpCaller, Request, RequestBody, RequestParts, Response, ResponseParts, StatusCode,
};
use std::{
    fmt::{self, Debug, Write as FmtWrite},
    io::{Read, Write},
    mem::take,
    sync::{Arc, Mutex},
};

/// 请求执行接口
///
/// 执行一次 HTTP 请求并返回响应，是中间件组合的基础单元
#[auto_impl(&, Box, Arc)]
pub trait Executor: Debug + Send + Sync {
    /// 执行 HTTP 请求
    fn execute(&self, request: &mut Request) -> ApiResult<Response>;
}

/// 函数形式的请求执行器
pub struct ExecutorFunc<F>(F);

impl<F> ExecutorFunc<F>
where
    F: Fn(&mut Request) -> ApiResult<Response> + Send + Sync,
{
    /// 通过函数创建请求执行器
    #[inline]
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Executor for ExecutorFunc<F>
where
    F: Fn(&mut Request) -> ApiResult<Response> + Send + Sync,
{
    #[inline]
    fn execute(&self, request: &mut Request) -> ApiResult<Response> {
        (self.0)(request)
    }
}

impl<F> Debug for ExecutorFunc<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExecutorFunc").finish()
    }
}

/// 中间件接口
///
/// 把一个执行器包装成带有横切行为的新执行器
#[auto_impl(&, Box, Arc)]
pub trait Middleware: Debug + Send + Sync {
    /// 包装执行器
    fn wrap(&self, next: Arc<dyn Executor>) -> Arc<dyn Executor>;
}

/// 函数形式的中间件
pub struct MiddlewareFunc<F>(F);

impl<F> MiddlewareFunc<F>
where
    F: Fn(Arc<dyn Executor>) -> Arc<dyn Executor> + Send + Sync,
{
    /// 通过函数创建中间件
    #[inline]
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Middleware for MiddlewareFunc<F>
where
    F: Fn(Arc<dyn Executor>) -> Arc<dyn Executor> + Send + Sync,
{
    #[inline]
    fn wrap(&self, next: Arc<dyn Executor>) -> Arc<dyn Executor> {
        (self.0)(next)
    }
}

impl<F> Debug for MiddlewareFunc<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MiddlewareFunc").finish()
    }
}

/// 将执行器包进中间件链
///
/// 先注册的中间件在最外层：`wrap(base, [m1, m2, m3])`
/// 得到 `m1(m2(m3(base)))`，即 m1 最先看到请求、最后看到响应
pub fn wrap(executor: Arc<dyn Executor>, middleware: &[Arc<dyn Middleware>]) -> Arc<dyn Executor> {
    middleware
        .iter()
        .rev()
        .fold(executor, |inner, middleware| middleware.wrap(inner))
}

/// 以 HTTP 传输层调用器为底的执行器
///
/// 位于中间件链的最内层，把传输层错误转换为客户端错误
#[derive(Debug, Clone)]
pub struct CallerExecutor<C> {
    caller: C,
}

impl<C: HttpCaller> CallerExecutor<C> {
    /// 创建传输层执行器
    #[inline]
    pub fn new(caller: C) -> Self {
        Self { caller }
    }
}

impl<C: HttpCaller> Executor for CallerExecutor<C> {
    fn execute(&self, request: &mut Request) -> ApiResult<Response> {
        if request.context().is_cancelled() {
            return Err(Error::new_with_msg(
                ErrorKind::Cancelled,
                "request context was cancelled before execution",
            ));
        }
        self.caller.call(request).map_err(Error::from)
    }
}

#[cfg(feature = "ureq")]
pub(super) fn default_executor() -> ApiResult<Arc<dyn Executor>> {
    use once_cell::sync::Lazy;

    static DEFAULT_EXECUTOR: Lazy<Arc<dyn Executor>> =
        Lazy::new(|| Arc::new(CallerExecutor::new(sling_ureq::Client::default())));
    Ok(DEFAULT_EXECUTOR.to_owned())
}

#[cfg(not(feature = "ureq"))]
pub(super) fn default_executor() -> ApiResult<Arc<dyn Executor>> {
    Err(Error::new_with_msg(
        ErrorKind::Config,
        "no executor configured and the default executor feature is disabled",
    ))
}

/// 断言响应状态码等于预期值的中间件
///
/// 状态码不符时返回错误，响应仍然附在错误上供调用方检查
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExpectCode(StatusCode);

impl ExpectCode {
    /// 创建响应状态码断言中间件
    #[inline]
    pub fn new(code: StatusCode) -> Self {
        Self(code)
    }
}

impl Middleware for ExpectCode {
    fn wrap(&self, next: Arc<dyn Executor>) -> Arc<dyn Executor> {
        let expected = self.0;
        Arc::new(ExecutorFunc::new(move |request: &mut Request| {
            let response = next.execute(request)?;
            if response.status_code() != expected {
                let received = response.status_code();
                return Err(Error::new_with_msg(
                    ErrorKind::UnexpectedStatus(received),
                    format!(
                        "unexpected response status, expected: {}, received: {}",
                        expected.as_u16(),
                        received.as_u16()
                    ),
                )
                .with_response(response));
            }
            Ok(response)
        }))
    }
}

/// 断言响应状态码为预期值的选项
pub fn expect_code(code: u16) -> super::options::RequestOption {
    super::options::RequestOption::new(move |requester| {
        let code = StatusCode::from_u16(code)
            .map_err(|err| Error::new_with_msg(ErrorKind::Config, format!("invalid status code {}: {}", code, err)))?;
        super::options::with_middleware(ExpectCode::new(code)).apply(requester)
    })
}

/// 断言响应状态码为成功状态码的中间件
#[derive(Debug, Copy, Clone, Default)]
pub struct ExpectSuccessCode;

impl Middleware for ExpectSuccessCode {
    fn wrap(&self, next: Arc<dyn Executor>) -> Arc<dyn Executor> {
        Arc::new(ExecutorFunc::new(move |request: &mut Request| {
            let response = next.execute(request)?;
            if !is_success(response.status_code()) {
                let received = response.status_code();
                return Err(Error::new_with_msg(
                    ErrorKind::UnexpectedStatus(received),
                    format!(
                        "expected a successful response code, received: {}",
                        received.as_u16()
                    ),
                )
                .with_response(response));
            }
            Ok(response)
        }))
    }
}

/// 断言响应状态码为成功状态码的选项
pub fn expect_success_code() -> super::options::RequestOption {
    super::options::with_middleware(ExpectSuccessCode)
}

pub(super) fn buffer_request_body(request: &mut Request) -> ApiResult<Vec<u8>> {
    if request.body().is_empty() {
        return Ok(Vec::new());
    }
    let mut body = take(request.body_mut());
    let mut buf = Vec::new();
    body.read_to_end(&mut buf)
        .map_err(|err| Error::new(ErrorKind::Io, err))?;
    *request.body_mut() = RequestBody::from_bytes(buf.to_owned());
    Ok(buf)
}

pub(super) fn buffer_response_body(response: Response) -> ApiResult<(Response, Vec<u8>)> {
    let (parts, mut body) = response.into_parts_and_body();
    let mut buf = Vec::new();
    body.read_to_end(&mut buf)
        .map_err(|err| Error::new(ErrorKind::Io, err))?;
    Ok((
        Response::from_parts_and_body(parts, sling_http::ResponseBody::from_bytes(buf.to_owned())),
        buf,
    ))
}

fn format_request(parts: &RequestParts, body: &[u8]) -> String {
    let mut text = format!("{} {} HTTP/1.1\r\n", parts.method(), parts.url());
    for (name, value) in parts.headers() {
        let _ = write!(text, "{}: {}\r\n", name, String::from_utf8_lossy(value.as_bytes()));
    }
    text.push_str("\r\n");
    text.push_str(&String::from_utf8_lossy(body));
    text
}

fn format_response(parts: &ResponseParts, body: &[u8]) -> String {
    let mut text = format!("{:?} {}\r\n", parts.version(), parts.status_code());
    for (name, value) in parts.headers() {
        let _ = write!(text, "{}: {}\r\n", name, String::from_utf8_lossy(value.as_bytes()));
    }
    text.push_str("\r\n");
    text.push_str(&String::from_utf8_lossy(body));
    text
}

type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// 把请求与响应全文写入输出流的中间件
///
/// 请求体与响应体会被完整读出后换成等价的缓冲数据流
#[derive(Clone)]
pub struct Dump {
    writer: SharedWriter,
}

impl Dump {
    /// 创建请求导出中间件
    #[inline]
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// 通过共享输出流创建请求导出中间件
    #[inline]
    pub fn with_shared(writer: SharedWriter) -> Self {
        Self { writer }
    }

    fn write(&self, text: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = writer.write_all(text.as_bytes());
    }
}

impl Middleware for Dump {
    fn wrap(&self, next: Arc<dyn Executor>) -> Arc<dyn Executor> {
        let dump = self.to_owned();
        Arc::new(ExecutorFunc::new(move |request: &mut Request| {
            let request_body = buffer_request_body(request)?;
            dump.write(&format_request(request.parts(), &request_body));

            let response = next.execute(request)?;
            let (response, response_body) = buffer_response_body(response)?;
            dump.write(&format_response(response.parts(), &response_body));
            Ok(response)
        }))
    }
}

impl Debug for Dump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dump").finish()
    }
}

/// 把请求与响应全文输出到日志的中间件
#[derive(Debug, Copy, Clone, Default)]
pub struct DumpToLog;

impl Middleware for DumpToLog {
    fn wrap(&self, next: Arc<dyn Executor>) -> Arc<dyn Executor> {
        Arc::new(ExecutorFunc::new(move |request: &mut Request| {
            let request_body = buffer_request_body(request)?;
            debug!("{}", format_request(request.parts(), &request_body));

            let response = next.execute(request)?;
            let (response, response_body) = buffer_response_body(response)?;
            debug!("{}", format_response(response.parts(), &response_body));
            Ok(response)
        }))
    }
}

/// 把请求与响应全文输出到日志的选项
pub fn dump_to_log() -> super::options::RequestOption {
    super::options::with_middleware(DumpToLog)
}

#[cfg(test)]
mod tests {
    use super::{
        super::mocks::{mock_executor, mock_response},
        *,
    };
    use sling_http::Method;
    use std::error::Error as StdError;

    fn labelled(label: &'static str, order: Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Middleware> {
        Arc::new(MiddlewareFunc::new(move |next: Arc<dyn Executor>| {
            let order = order.to_owned();
            let wrapped: Arc<dyn Executor> = Arc::new(ExecutorFunc::new(move |request: &mut Request| {
                order
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(label);
                next.execute(request)
            }));
            wrapped
        }))
    }

    #[test]
    fn test_wrap_order() -> Result<(), Box<dyn StdError>> {
        let order = Arc::new(Mutex::new(Vec::new()));
        let chain = wrap(
            Arc::new(mock_executor(200, &[])),
            &[
                labelled("first", order.to_owned()),
                labelled("second", order.to_owned()),
                labelled("third", order.to_owned()),
            ],
        );

        let mut request = Request::builder().method(Method::GET).build();
        chain.execute(&mut request)?;

        assert_eq!(
            order.lock().unwrap().as_slice(),
            &["first", "second", "third"]
        );
        Ok(())
    }

    #[test]
    fn test_expect_code() {
        let chain = ExpectCode::new(StatusCode::from_u16(203).unwrap())
            .wrap(Arc::new(mock_executor(407, &[super::super::options::body_text("boom!")])));

        let mut request = Request::builder().method(Method::GET).build();
        let mut err = chain.execute(&mut request).unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::UnexpectedStatus(StatusCode::from_u16(407).unwrap())
        );
        assert!(err.to_string().contains("expected: 203"));
        assert!(err.to_string().contains("received: 407"));

        // 响应未被消费，仍可读取
        let mut body = err.take_response().unwrap().into_body();
        let mut buf = Vec::new();
        body.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"boom!");
    }

    #[test]
    fn test_expect_code_match_passes() -> Result<(), Box<dyn StdError>> {
        let chain = ExpectCode::new(StatusCode::from_u16(407).unwrap())
            .wrap(Arc::new(mock_executor(407, &[])));
        let mut request = Request::builder().method(Method::GET).build();
        let response = chain.execute(&mut request)?;
        assert_eq!(response.status_code().as_u16(), 407);
        Ok(())
    }

    #[test]
    fn test_expect_success_code() {
        for code in [200u16, 201, 204, 226] {
            let chain = ExpectSuccessCode.wrap(Arc::new(mock_executor(code, &[])));
            let mut request = Request::builder().method(Method::GET).build();
            assert!(chain.execute(&mut request).is_ok(), "code {} should pass", code);
        }

        let chain = ExpectSuccessCode.wrap(Arc::new(mock_executor(407, &[])));
        let mut request = Request::builder().method(Method::GET).build();
        let err = chain.execute(&mut request).unwrap_err();
        assert!(err.to_string().contains("received: 407"));
    }

    #[test]
    fn test_dump_captures_both_directions() -> Result<(), Box<dyn StdError>> {
        let buffer: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let sink: SharedWriter = buffer.to_owned();
        let chain = Dump::with_shared(sink).wrap(Arc::new(mock_executor(
            200,
            &[super::super::options::body_text(r#"{"color":"red"}"#)],
        )));

        let mut request = Request::builder()
            .method(Method::GET)
            .url("http://test.example.com/".parse()?)
            .body("ping")
            .build();
        chain.execute(&mut request)?;

        let dumped = String::from_utf8(buffer.lock().unwrap().to_owned())?;
        assert!(dumped.contains("GET http://test.example.com/ HTTP/1.1"));
        assert!(dumped.contains("HTTP/1.1 200 OK"));
        assert!(dumped.contains("ping"));
        assert!(dumped.contains(r#"{"color":"red"}"#));
        Ok(())
    }

    #[test]
    fn test_mock_response_helper() {
        let response = mock_response(204, &[]);
        assert_eq!(response.status_code().as_u16(), 204);
    }
}
