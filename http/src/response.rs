use super::{error::Error, request::RequestParts};
use assert_impl::assert_impl;
use http::{
    header::{HeaderMap, HeaderName, HeaderValue},
    status::StatusCode,
    Version,
};
use std::{
    fmt::Debug,
    io::{Cursor, Read, Result as IoResult},
    result,
};

trait ReadDebug: Read + Debug + Send + Sync {}
impl<T: Read + Debug + Send + Sync> ReadDebug for T {}

/// HTTP 响应体
#[derive(Debug)]
pub struct Body(BodyInner);

#[derive(Debug)]
enum BodyInner {
    Empty,
    Bytes(Cursor<Vec<u8>>),
    Reader(Box<dyn ReadDebug>),
}

impl Body {
    /// 创建空 HTTP 响应体
    #[inline]
    pub fn empty() -> Self {
        Self(BodyInner::Empty)
    }

    /// 通过二进制数据创建 HTTP 响应体
    #[inline]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(BodyInner::Bytes(Cursor::new(bytes)))
    }

    /// 通过数据流创建 HTTP 响应体
    #[inline]
    pub fn from_reader(reader: impl Read + Debug + Send + Sync + 'static) -> Self {
        Self(BodyInner::Reader(Box::new(reader)))
    }

    /// 判定响应体是否为空的哨兵值
    #[inline]
    pub fn is_empty_sentinel(&self) -> bool {
        matches!(&self.0, BodyInner::Empty)
    }

    /// 获取缓冲响应体的字节内容
    ///
    /// 仅当响应体由二进制数据构建时返回内容
    #[inline]
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.0 {
            BodyInner::Bytes(bytes) => Some(bytes.get_ref()),
            _ => None,
        }
    }

    #[allow(dead_code)]
    fn ignore() {
        assert_impl!(Send: Self);
        assert_impl!(Sync: Self);
    }
}

impl Default for Body {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        match &mut self.0 {
            BodyInner::Empty => Ok(0),
            BodyInner::Bytes(bytes) => bytes.read(buf),
            BodyInner::Reader(reader) => reader.read(buf),
        }
    }
}

/// HTTP 响应信息
///
/// 不包含响应体信息
#[derive(Debug)]
pub struct ResponseParts {
    status_code: StatusCode,
    headers: HeaderMap,
    version: Version,
    request: Option<Box<RequestParts>>,
}

impl ResponseParts {
    /// HTTP 状态码
    #[inline]
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    /// 修改 HTTP 状态码
    #[inline]
    pub fn status_code_mut(&mut self) -> &mut StatusCode {
        &mut self.status_code
    }

    /// HTTP Headers
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 修改 HTTP Headers
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// 获取 HTTP 响应 Header
    #[inline]
    pub fn header(&self, header_name: HeaderName) -> Option<&HeaderValue> {
        self.headers.get(&header_name)
    }

    /// HTTP 版本
    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    /// 修改 HTTP 版本
    #[inline]
    pub fn version_mut(&mut self) -> &mut Version {
        &mut self.version
    }

    /// 获取产生该响应的请求信息
    ///
    /// 由模拟执行器填充，便于测试中断言
    #[inline]
    pub fn request(&self) -> Option<&RequestParts> {
        self.request.as_deref()
    }

    /// 获取产生该响应的请求信息的可变引用
    #[inline]
    pub fn request_mut(&mut self) -> &mut Option<Box<RequestParts>> {
        &mut self.request
    }
}

impl Default for ResponseParts {
    #[inline]
    fn default() -> Self {
        Self {
            status_code: StatusCode::OK,
            headers: Default::default(),
            version: Version::HTTP_11,
            request: None,
        }
    }
}

/// HTTP 响应
///
/// 封装 HTTP 响应相关字段
#[derive(Debug, Default)]
pub struct Response<B = Body> {
    parts: ResponseParts,
    body: B,
}

impl<B: Default> Response<B> {
    /// 返回 HTTP 响应构建器
    #[inline]
    pub fn builder() -> ResponseBuilder<B> {
        ResponseBuilder::<B>::default()
    }
}

impl<B> Response<B> {
    /// HTTP 响应体
    #[inline]
    pub fn body(&self) -> &B {
        &self.body
    }

    /// 修改 HTTP 响应体
    #[inline]
    pub fn body_mut(&mut self) -> &mut B {
        &mut self.body
    }

    /// 直接获取 HTTP 响应体
    #[inline]
    pub fn into_body(self) -> B {
        self.body
    }

    /// 获取响应信息
    #[inline]
    pub fn parts(&self) -> &ResponseParts {
        &self.parts
    }

    /// 获取响应信息的可变引用
    #[inline]
    pub fn parts_mut(&mut self) -> &mut ResponseParts {
        &mut self.parts
    }

    /// 转换为响应信息和响应体
    #[inline]
    pub fn into_parts_and_body(self) -> (ResponseParts, B) {
        let Self { parts, body } = self;
        (parts, body)
    }

    /// 通过响应信息和响应体创建 HTTP 响应
    #[inline]
    pub fn from_parts_and_body(parts: ResponseParts, body: B) -> Self {
        Self { parts, body }
    }

    /// 对 HTTP 响应体进行映射
    #[inline]
    pub fn map_body<B2>(self, f: impl FnOnce(B) -> B2) -> Response<B2> {
        let Self { parts, body } = self;
        Response {
            parts,
            body: f(body),
        }
    }

    /// 尝试对 HTTP 响应体进行映射
    #[inline]
    pub fn try_map_body<B2, E>(self, f: impl FnOnce(B) -> result::Result<B2, E>) -> result::Result<Response<B2>, E> {
        let Self { parts, body } = self;
        Ok(Response {
            parts,
            body: f(body)?,
        })
    }
}

impl<B: Send + Sync> Response<B> {
    #[allow(dead_code)]
    fn ignore() {
        assert_impl!(Send: Self);
        assert_impl!(Sync: Self);
    }
}

impl<B> std::ops::Deref for Response<B> {
    type Target = ResponseParts;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.parts
    }
}

impl<B> std::ops::DerefMut for Response<B> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.parts
    }
}

/// HTTP 响应构建器
#[derive(Debug, Default)]
pub struct ResponseBuilder<B> {
    inner: Response<B>,
}

impl<B> ResponseBuilder<B> {
    /// 设置 HTTP 状态码
    #[inline]
    pub fn status_code(mut self, status_code: StatusCode) -> Self {
        *self.inner.status_code_mut() = status_code;
        self
    }

    /// 设置 HTTP Headers
    #[inline]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        *self.inner.headers_mut() = headers;
        self
    }

    /// 添加 HTTP Header
    #[inline]
    pub fn header(mut self, header_name: HeaderName, header_value: HeaderValue) -> Self {
        self.inner.headers_mut().insert(header_name, header_value);
        self
    }

    /// 设置 HTTP 版本
    #[inline]
    pub fn version(mut self, version: Version) -> Self {
        *self.inner.version_mut() = version;
        self
    }

    /// 设置产生该响应的请求信息
    #[inline]
    pub fn request(mut self, request: RequestParts) -> Self {
        *self.inner.request_mut() = Some(Box::new(request));
        self
    }

    /// 构建 HTTP 响应
    #[inline]
    pub fn build(self) -> Response<B> {
        self.inner
    }
}

impl ResponseBuilder<Body> {
    /// 设置数据流为 HTTP 响应体
    #[inline]
    pub fn stream_as_body(mut self, body: impl Read + Debug + Send + Sync + 'static) -> Self {
        *self.inner.body_mut() = Body::from_reader(body);
        self
    }

    /// 设置二进制字节数组为 HTTP 响应体
    #[inline]
    pub fn bytes_as_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        *self.inner.body_mut() = Body::from_bytes(body.into());
        self
    }
}

/// HTTP 响应结果
pub type Result<B = Body> = result::Result<Response<B>, Error>;
