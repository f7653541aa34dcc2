use sling_http::{
    HeaderName, HeaderValue, HttpCaller, Request, RequestParts, Response, ResponseResult,
    StatusCode, TransportError, TransportErrorKind, Version,
};
use std::{
    error::Error as StdError,
    fmt::{self, Display},
    io::{Error as IoError, Read, Result as IoResult},
};
use ureq::{Agent, Error as UreqError, ErrorKind as UreqErrorKind, Request as UreqRequest, Response as UreqResponse};

/// Ureq 客户端
#[derive(Debug, Clone)]
pub struct Client {
    agent: Agent,
}

impl Client {
    /// 通过 Ureq Agent 创建客户端
    #[inline]
    pub fn new(agent: Agent) -> Self {
        Self { agent }
    }
}

impl From<Agent> for Client {
    #[inline]
    fn from(agent: Agent) -> Self {
        Self::new(agent)
    }
}

impl Default for Client {
    #[inline]
    fn default() -> Self {
        Self { agent: ureq::agent() }
    }
}

impl HttpCaller for Client {
    fn call(&self, request: &mut Request) -> ResponseResult {
        if request.context().is_cancelled() {
            return Err(TransportError::new(
                TransportErrorKind::UserCanceled,
                "request context was cancelled",
            ));
        }

        let ureq_request = make_ureq_request(&self.agent, request.parts());
        let result = if request.body().is_empty() {
            ureq_request.call()
        } else {
            ureq_request.send(&mut *request.body_mut())
        };

        match result {
            Ok(response) => make_sync_response(response),
            Err(UreqError::Status(_, response)) => make_sync_response(response),
            Err(err @ UreqError::Transport(_)) => Err(from_ureq_error(err)),
        }
    }
}

fn make_ureq_request(agent: &Agent, parts: &RequestParts) -> UreqRequest {
    use super::TimeoutExtension;

    let mut builder = agent.request(parts.method().as_str(), &parts.url().to_string());
    for (name, value) in parts.headers() {
        builder = builder.set(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
    }
    if let Some(host) = parts.host() {
        builder = builder.set("Host", host);
    }
    if parts.close() {
        builder = builder.set("Connection", "close");
    }
    if let Some(content_length) = parts.content_length() {
        builder = builder.set("Content-Length", &content_length.to_string());
    }
    if let Some(extension) = parts.extensions().get::<TimeoutExtension>() {
        builder = builder.timeout(extension.get());
    }
    builder
}

fn make_sync_response(response: UreqResponse) -> ResponseResult {
    let status_code = StatusCode::from_u16(response.status())
        .map_err(|err| build_status_code_error(response.status(), &err))?;
    let version = parse_http_version(response.http_version())?;

    let mut builder = Response::builder().status_code(status_code).version(version);
    for name in response.headers_names() {
        if let Some(value) = response.header(&name) {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| build_header_error(&name, &err))?;
            let header_value =
                HeaderValue::from_bytes(value.as_bytes()).map_err(|err| build_header_error(value, &err))?;
            builder = builder.header(header_name, header_value);
        }
    }
    return Ok(builder
        .stream_as_body(ResponseReaderWrapper(response.into_reader()))
        .build());

    struct ResponseReaderWrapper<R>(R);

    impl<R: Read> Read for ResponseReaderWrapper<R> {
        #[inline]
        fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
            self.0.read(buf)
        }
    }

    impl<R> fmt::Debug for ResponseReaderWrapper<R> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_tuple("ResponseReaderWrapper").finish()
        }
    }
}

fn build_status_code_error(code: u16, err: &dyn Display) -> TransportError {
    TransportError::new(
        TransportErrorKind::InvalidRequestResponse,
        format!("invalid status code({}): {}", code, err),
    )
}

fn build_header_error(header: &str, err: &dyn Display) -> TransportError {
    TransportError::new(
        TransportErrorKind::InvalidHeader,
        format!("invalid header({}): {}", header, err),
    )
}

fn parse_http_version(version: &str) -> Result<Version, TransportError> {
    match version {
        "HTTP/0.9" => Ok(Version::HTTP_09),
        "HTTP/1.0" => Ok(Version::HTTP_10),
        "HTTP/1.1" => Ok(Version::HTTP_11),
        "HTTP/2.0" => Ok(Version::HTTP_2),
        "HTTP/3.0" => Ok(Version::HTTP_3),
        _ => Err(TransportError::new(
            TransportErrorKind::InvalidRequestResponse,
            format!("invalid http version: {}", version),
        )),
    }
}

fn from_ureq_error(err: UreqError) -> TransportError {
    // IO 类错误按底层原因细分，便于重试判定识别瞬时故障
    if err.kind() == UreqErrorKind::Io {
        if let Some(io_err) = find_io_error(&err) {
            return TransportError::new(io_err.kind().into(), err);
        }
    }
    let kind = match err.kind() {
        UreqErrorKind::InvalidUrl | UreqErrorKind::UnknownScheme => TransportErrorKind::InvalidUrl,
        UreqErrorKind::Dns => TransportErrorKind::DnsServerError,
        UreqErrorKind::ConnectionFailed => TransportErrorKind::ConnectError,
        UreqErrorKind::TooManyRedirects => TransportErrorKind::TooManyRedirect,
        UreqErrorKind::BadStatus | UreqErrorKind::HTTP => TransportErrorKind::InvalidRequestResponse,
        UreqErrorKind::BadHeader => TransportErrorKind::InvalidHeader,
        UreqErrorKind::Io => TransportErrorKind::LocalIoError,
        UreqErrorKind::InvalidProxyUrl | UreqErrorKind::ProxyConnect | UreqErrorKind::ProxyUnauthorized => {
            TransportErrorKind::ProxyError
        }
        UreqErrorKind::InsecureRequestHttpsOnly => TransportErrorKind::SslError,
    };
    TransportError::new(kind, err)
}

fn find_io_error<'e>(err: &'e (dyn StdError + 'static)) -> Option<&'e IoError> {
    let mut source = err.source();
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<IoError>() {
            return Some(io_err);
        }
        source = current.source();
    }
    None
}
