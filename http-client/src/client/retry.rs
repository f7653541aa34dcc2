use super::{
    backoff::{Backoff, ExponentialBackoff},
    error::{ApiResult, Error, ErrorKind},
    middleware::{Executor, ExecutorFunc, Middleware},
};
use crossbeam_channel::{after, select};
use log::debug;
use sling_http::{Context, Method, Request, RequestBody, RequestParts, Response, ResponseBody, TransportError};
use std::{
    fmt::{self, Debug},
    io::{copy, sink, Read},
    sync::Arc,
    thread,
    time::Duration,
};

const DEFAULT_MAX_ATTEMPTS: usize = 3;
const DRAIN_LIMIT: u64 = 4096;

/// 重试判定接口
///
/// 根据尝试次数、请求信息和本次尝试的结果判定是否重试
#[auto_impl::auto_impl(&, Box, Arc)]
pub trait ShouldRetry: Debug + Send + Sync {
    /// 判定是否重试
    fn should_retry(&self, attempt: usize, request: &RequestParts, result: &ApiResult<Response>) -> bool;
}

/// 函数形式的重试判定
#[derive(Clone)]
pub struct ShouldRetryFn(Arc<dyn Fn(usize, &RequestParts, &ApiResult<Response>) -> bool + Send + Sync>);

impl ShouldRetryFn {
    /// 通过函数创建重试判定
    #[inline]
    pub fn new(f: impl Fn(usize, &RequestParts, &ApiResult<Response>) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl ShouldRetry for ShouldRetryFn {
    #[inline]
    fn should_retry(&self, attempt: usize, request: &RequestParts, result: &ApiResult<Response>) -> bool {
        (self.0)(attempt, request, result)
    }
}

impl Debug for ShouldRetryFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ShouldRetryFn").finish()
    }
}

/// 默认重试判定
///
/// 响应状态码为 500、429 或大于 501 时重试；
/// 传输错误为瞬时网络故障（响应提前结束、连接被重置或中止、
/// 管道损坏、超时）时重试；其余错误不重试
#[derive(Debug, Copy, Clone, Default)]
pub struct DefaultShouldRetry;

impl ShouldRetry for DefaultShouldRetry {
    fn should_retry(&self, _attempt: usize, _request: &RequestParts, result: &ApiResult<Response>) -> bool {
        match result {
            Ok(response) => {
                let code = response.status_code().as_u16();
                code == 500 || code == 429 || code > 501
            }
            Err(err) => match err.kind() {
                ErrorKind::Transport(kind) => kind.is_transient(),
                _ => false,
            },
        }
    }
}

/// 仅幂等方法重试判定
///
/// 只有 GET、HEAD、OPTIONS、TRACE 方法返回 true
#[derive(Debug, Copy, Clone, Default)]
pub struct OnlyIdempotent;

impl ShouldRetry for OnlyIdempotent {
    fn should_retry(&self, _attempt: usize, request: &RequestParts, _result: &ApiResult<Response>) -> bool {
        [Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE].contains(request.method())
    }
}

/// 重试判定的逻辑与组合
///
/// 所有判定都同意时才重试
#[derive(Debug, Clone, Default)]
pub struct AllRetryers {
    retryers: Vec<Arc<dyn ShouldRetry>>,
}

impl AllRetryers {
    /// 组合多个重试判定
    #[inline]
    pub fn new(retryers: impl Into<Vec<Arc<dyn ShouldRetry>>>) -> Self {
        Self {
            retryers: retryers.into(),
        }
    }
}

impl ShouldRetry for AllRetryers {
    fn should_retry(&self, attempt: usize, request: &RequestParts, result: &ApiResult<Response>) -> bool {
        self.retryers
            .iter()
            .all(|retryer| retryer.should_retry(attempt, request, result))
    }
}

/// 重试中间件配置
#[derive(Debug, Clone, Default)]
pub struct RetryConfig {
    /// 最多尝试次数，小于 1 时取默认值 3
    pub max_attempts: usize,
    /// 重试判定，缺省使用 [`DefaultShouldRetry`]
    pub should_retry: Option<Arc<dyn ShouldRetry>>,
    /// 退避策略，缺省使用 [`ExponentialBackoff::default`]
    pub backoff: Option<Arc<dyn Backoff>>,
    /// 判定重试前把响应体完整读入内存，
    /// 读取中途出错时按本次尝试失败处理
    pub read_response: bool,
}

/// 重试中间件
///
/// 在可重试的失败下重放请求，重放次数与判定条件、
/// 退避策略均可配置
#[derive(Debug, Clone)]
pub struct Retry {
    max_attempts: usize,
    should_retry: Arc<dyn ShouldRetry>,
    backoff: Arc<dyn Backoff>,
    read_response: bool,
}

impl Retry {
    /// 通过配置创建重试中间件，缺省字段取默认值
    pub fn new(config: RetryConfig) -> Self {
        Self {
            max_attempts: if config.max_attempts < 1 {
                DEFAULT_MAX_ATTEMPTS
            } else {
                config.max_attempts
            },
            should_retry: config
                .should_retry
                .unwrap_or_else(|| Arc::new(DefaultShouldRetry)),
            backoff: config
                .backoff
                .unwrap_or_else(|| Arc::new(ExponentialBackoff::default())),
            read_response: config.read_response,
        }
    }
}

impl Default for Retry {
    #[inline]
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl Middleware for Retry {
    fn wrap(&self, next: Arc<dyn Executor>) -> Arc<dyn Executor> {
        let policy = self.to_owned();
        Arc::new(ExecutorFunc::new(move |request: &mut Request| {
            policy.execute(next.as_ref(), request)
        }))
    }
}

/// 重试中间件的选项
pub fn retry(config: RetryConfig) -> super::options::RequestOption {
    super::options::with_middleware(Retry::new(config))
}

impl Retry {
    fn execute(&self, next: &dyn Executor, request: &mut Request) -> ApiResult<Response> {
        // 没有重放函数的非空数据流无法重放，直接透传
        if !request.body().is_empty() && request.get_body().is_none() {
            return next.execute(request);
        }

        let mut attempt = 0usize;
        loop {
            let mut result = next.execute(request);
            attempt += 1;

            if self.read_response {
                result = result.and_then(buffer_response);
            }

            if attempt >= self.max_attempts
                || !self.should_retry.should_retry(attempt, request.parts(), &result)
            {
                return result;
            }

            if let Ok(response) = result {
                drain(response.into_body());
            }

            reset_request_body(request)?;

            debug!(
                "retrying {} {} after attempt {}",
                request.method(),
                request.url(),
                attempt
            );
            wait_backoff(request.context(), self.backoff.backoff(attempt))?;
        }
    }
}

/// 把响应体完整读入内存，换成等价的缓冲数据流
///
/// 读取失败按传输错误分类，交给重试判定评估
fn buffer_response(response: Response) -> ApiResult<Response> {
    let (parts, mut body) = response.into_parts_and_body();
    let mut buf = Vec::new();
    body.read_to_end(&mut buf)
        .map_err(|err| Error::from(TransportError::from(err)))?;
    Ok(Response::from_parts_and_body(parts, ResponseBody::from_bytes(buf)))
}

/// 丢弃响应体，最多读取 4 KiB 后关闭以便连接复用
fn drain(body: ResponseBody) {
    let _ = copy(&mut body.take(DRAIN_LIMIT), &mut sink());
}

/// 通过重放函数为下一次尝试换上全新的请求体
fn reset_request_body(request: &mut Request) -> ApiResult<()> {
    if let Some(get_body) = request.get_body().map(ToOwned::to_owned) {
        let body = get_body.produce().map_err(|err| {
            Error::new_with_msg(ErrorKind::Io, format!("error producing replacement request body: {}", err))
        })?;
        *request.body_mut() = body;
    } else {
        *request.body_mut() = RequestBody::empty();
    }
    Ok(())
}

/// 等待退避时长，请求上下文被取消时立即返回取消错误
fn wait_backoff(context: &Context, delay: Duration) -> ApiResult<()> {
    let cancelled = || Error::new_with_msg(ErrorKind::Cancelled, "request context was cancelled during retry backoff");
    match context.done() {
        Some(done) => {
            if context.is_cancelled() {
                return Err(cancelled());
            }
            select! {
                recv(done) -> _ => Err(cancelled()),
                recv(after(delay)) -> _ => Ok(()),
            }
        }
        None => {
            thread::sleep(delay);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        super::{
            backoff::{constant_backoff, no_backoff},
            mocks::mock_response,
            options::body_text,
        },
        *,
    };
    use sling_http::{Canceller, GetBody, StatusCode, TransportError, TransportErrorKind};
    use std::{
        error::Error as StdError,
        io::Cursor,
        sync::{
            atomic::{AtomicUsize, Ordering::Relaxed},
            Mutex,
        },
        time::Instant,
    };

    #[derive(Debug)]
    struct CountingExecutor {
        calls: AtomicUsize,
        bodies: Mutex<Vec<Vec<u8>>>,
        status: u16,
    }

    impl CountingExecutor {
        fn new(status: u16) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                bodies: Mutex::new(Vec::new()),
                status,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Relaxed)
        }
    }

    impl Executor for CountingExecutor {
        fn execute(&self, request: &mut Request) -> ApiResult<Response> {
            self.calls.fetch_add(1, Relaxed);
            let mut body = Vec::new();
            request.body_mut().read_to_end(&mut body).unwrap();
            self.bodies.lock().unwrap().push(body);
            Ok(mock_response(self.status, &[body_text("upstream failure")]))
        }
    }

    fn retrying(executor: Arc<dyn Executor>, config: RetryConfig) -> Arc<dyn Executor> {
        Retry::new(config).wrap(executor)
    }

    #[test]
    fn test_default_should_retry() {
        let request = RequestParts::default();
        let cases: &[(u16, bool)] = &[
            (200, false),
            (400, false),
            (429, true),
            (500, true),
            (501, false),
            (502, true),
            (503, true),
        ];
        for (status, expected) in cases {
            let result = Ok(mock_response(*status, &[]));
            assert_eq!(
                DefaultShouldRetry.should_retry(1, &request, &result),
                *expected,
                "status {}",
                status
            );
        }

        let transient: ApiResult<Response> = Err(TransportError::new(
            TransportErrorKind::ConnectionReset,
            "connection reset by peer",
        )
        .into());
        assert!(DefaultShouldRetry.should_retry(1, &request, &transient));

        let permanent: ApiResult<Response> = Err(TransportError::new(
            TransportErrorKind::InvalidUrl,
            "unsupported protocol scheme",
        )
        .into());
        assert!(!DefaultShouldRetry.should_retry(1, &request, &permanent));

        let config: ApiResult<Response> =
            Err(Error::new_with_msg(ErrorKind::Config, "bad option"));
        assert!(!DefaultShouldRetry.should_retry(1, &request, &config));
    }

    #[test]
    fn test_only_idempotent() {
        let result = Ok(mock_response(500, &[]));
        for (method, expected) in [
            (Method::GET, true),
            (Method::HEAD, true),
            (Method::OPTIONS, true),
            (Method::TRACE, true),
            (Method::POST, false),
            (Method::PUT, false),
            (Method::DELETE, false),
        ] {
            let mut request = RequestParts::default();
            *request.method_mut() = method.to_owned();
            assert_eq!(
                OnlyIdempotent.should_retry(1, &request, &result),
                expected,
                "method {}",
                method
            );
        }
    }

    #[test]
    fn test_all_retryers() {
        let request = RequestParts::default();
        let result = Ok(mock_response(500, &[]));

        let yes: Arc<dyn ShouldRetry> = Arc::new(ShouldRetryFn::new(|_, _, _| true));
        let no: Arc<dyn ShouldRetry> = Arc::new(ShouldRetryFn::new(|_, _, _| false));

        assert!(AllRetryers::new(vec![yes.to_owned(), yes.to_owned()]).should_retry(1, &request, &result));
        assert!(!AllRetryers::new(vec![yes, no]).should_retry(1, &request, &result));
    }

    #[test]
    fn test_retry_until_max_attempts() -> Result<(), Box<dyn StdError>> {
        let counting = Arc::new(CountingExecutor::new(500));
        let chain = retrying(
            counting.to_owned(),
            RetryConfig {
                max_attempts: 4,
                backoff: Some(Arc::new(no_backoff())),
                ..Default::default()
            },
        );

        let mut request = Request::builder().method(Method::GET).build();
        let response = chain.execute(&mut request)?;

        assert_eq!(counting.calls(), 4);
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        Ok(())
    }

    #[test]
    fn test_success_stops_retrying() -> Result<(), Box<dyn StdError>> {
        let counting = Arc::new(CountingExecutor::new(200));
        let chain = retrying(
            counting.to_owned(),
            RetryConfig {
                max_attempts: 4,
                backoff: Some(Arc::new(no_backoff())),
                ..Default::default()
            },
        );

        let mut request = Request::builder().method(Method::GET).build();
        let response = chain.execute(&mut request)?;

        assert_eq!(counting.calls(), 1);
        assert_eq!(response.status_code(), StatusCode::OK);
        // 响应体归最终调用方所有，未被消费
        let mut body = response.into_body();
        let mut buf = Vec::new();
        body.read_to_end(&mut buf)?;
        assert_eq!(buf, b"upstream failure");
        Ok(())
    }

    #[test]
    fn test_replayed_bodies_are_identical() -> Result<(), Box<dyn StdError>> {
        let counting = Arc::new(CountingExecutor::new(500));
        let chain = retrying(
            counting.to_owned(),
            RetryConfig {
                max_attempts: 3,
                backoff: Some(Arc::new(no_backoff())),
                ..Default::default()
            },
        );

        let mut request = Request::builder().method(Method::POST).build();
        *request.body_mut() = RequestBody::from_bytes(b"payload".to_vec());
        *request.get_body_mut() = Some(GetBody::new(|| {
            Ok(RequestBody::from_bytes(b"payload".to_vec()))
        }));
        chain.execute(&mut request)?;

        assert_eq!(counting.calls(), 3);
        let bodies = counting.bodies.lock().unwrap();
        assert_eq!(bodies.as_slice(), &[b"payload".to_vec(), b"payload".to_vec(), b"payload".to_vec()]);
        Ok(())
    }

    #[test]
    fn test_unreplayable_body_is_passed_through() -> Result<(), Box<dyn StdError>> {
        let counting = Arc::new(CountingExecutor::new(500));
        let chain = retrying(
            counting.to_owned(),
            RetryConfig {
                max_attempts: 4,
                backoff: Some(Arc::new(no_backoff())),
                ..Default::default()
            },
        );

        let mut request = Request::builder().method(Method::POST).build();
        *request.body_mut() = RequestBody::from_reader(Cursor::new(b"stream".to_vec()), Some(6));
        let response = chain.execute(&mut request)?;

        assert_eq!(counting.calls(), 1);
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        Ok(())
    }

    #[test]
    fn test_empty_body_still_retries() -> Result<(), Box<dyn StdError>> {
        let counting = Arc::new(CountingExecutor::new(500));
        let chain = retrying(
            counting.to_owned(),
            RetryConfig {
                max_attempts: 2,
                backoff: Some(Arc::new(no_backoff())),
                ..Default::default()
            },
        );

        let mut request = Request::builder().method(Method::POST).build();
        chain.execute(&mut request)?;
        assert_eq!(counting.calls(), 2);
        Ok(())
    }

    #[test]
    fn test_backoff_gaps() -> Result<(), Box<dyn StdError>> {
        #[derive(Debug)]
        struct TimingExecutor {
            instants: Mutex<Vec<Instant>>,
        }

        impl Executor for TimingExecutor {
            fn execute(&self, _request: &mut Request) -> ApiResult<Response> {
                self.instants.lock().unwrap().push(Instant::now());
                Ok(mock_response(500, &[]))
            }
        }

        env_logger::builder().is_test(true).try_init().ok();

        let timing = Arc::new(TimingExecutor {
            instants: Mutex::new(Vec::new()),
        });
        let chain = retrying(
            timing.to_owned(),
            RetryConfig {
                max_attempts: 4,
                backoff: Some(Arc::new(ExponentialBackoff {
                    base_delay: Duration::from_millis(50),
                    multiplier: 2.0,
                    jitter: 0.0,
                    max_delay: Duration::from_secs(1),
                })),
                ..Default::default()
            },
        );

        let mut request = Request::builder().method(Method::GET).build();
        let response = chain.execute(&mut request)?;
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let instants = timing.instants.lock().unwrap();
        assert_eq!(instants.len(), 4);
        let expected = [
            Duration::from_millis(50),
            Duration::from_millis(100),
            Duration::from_millis(200),
        ];
        for (pair, expected) in instants.windows(2).zip(expected) {
            let gap = pair[1] - pair[0];
            assert!(gap >= expected, "gap {:?} shorter than {:?}", gap, expected);
            assert!(
                gap < expected + Duration::from_millis(40),
                "gap {:?} much longer than {:?}",
                gap,
                expected
            );
        }
        Ok(())
    }

    #[test]
    fn test_cancellation_during_backoff() -> Result<(), Box<dyn StdError>> {
        let counting = Arc::new(CountingExecutor::new(500));
        let chain = retrying(
            counting.to_owned(),
            RetryConfig {
                max_attempts: 4,
                backoff: Some(Arc::new(constant_backoff(Duration::from_secs(2)))),
                ..Default::default()
            },
        );

        let (context, canceller) = Context::with_cancel();
        let mut request = Request::builder().method(Method::GET).context(context).build();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            canceller.cancel();
        });

        let started = Instant::now();
        let err = chain.execute(&mut request).unwrap_err();
        let elapsed = started.elapsed();
        handle.join().unwrap();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(elapsed < Duration::from_millis(100), "took {:?}", elapsed);
        assert_eq!(counting.calls(), 1);
        Ok(())
    }

    #[test]
    fn test_read_response_buffers_the_body() -> Result<(), Box<dyn StdError>> {
        #[derive(Debug)]
        struct StreamingExecutor;

        impl Executor for StreamingExecutor {
            fn execute(&self, _request: &mut Request) -> ApiResult<Response> {
                Ok(Response::builder()
                    .status_code(StatusCode::OK)
                    .stream_as_body(Cursor::new(b"streamed".to_vec()))
                    .build())
            }
        }

        let chain = retrying(
            Arc::new(StreamingExecutor),
            RetryConfig {
                max_attempts: 2,
                backoff: Some(Arc::new(no_backoff())),
                read_response: true,
                ..Default::default()
            },
        );

        let mut request = Request::builder().method(Method::GET).build();
        let response = chain.execute(&mut request)?;
        assert_eq!(response.body().bytes(), Some(b"streamed".as_slice()));
        Ok(())
    }

    #[test]
    fn test_read_response_error_becomes_attempt_error() {
        #[derive(Debug)]
        struct BrokenBody;

        impl Read for BrokenBody {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "mid-stream failure",
                ))
            }
        }

        #[derive(Debug)]
        struct BrokenExecutor(AtomicUsize);

        impl Executor for BrokenExecutor {
            fn execute(&self, _request: &mut Request) -> ApiResult<Response> {
                self.0.fetch_add(1, Relaxed);
                Ok(Response::builder()
                    .status_code(StatusCode::OK)
                    .stream_as_body(BrokenBody)
                    .build())
            }
        }

        let broken = Arc::new(BrokenExecutor(AtomicUsize::new(0)));
        let chain = retrying(
            broken.to_owned(),
            RetryConfig {
                max_attempts: 2,
                backoff: Some(Arc::new(no_backoff())),
                read_response: true,
                ..Default::default()
            },
        );

        // 连接被重置是瞬时故障，默认判定重试到次数用尽
        let mut request = Request::builder().method(Method::GET).build();
        let err = chain.execute(&mut request).unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::Transport(TransportErrorKind::ConnectionReset)
        );
        assert_eq!(broken.0.load(Relaxed), 2);
    }
}
