use super::context::Context;
use assert_impl::assert_impl;
use http::{
    header::{HeaderMap, IntoHeaderName},
    method::Method,
    uri::Uri,
    Extensions, HeaderValue,
};
use std::{
    fmt::{self, Debug},
    io::{Cursor, Read, Result as IoResult},
    mem::take,
    sync::Arc,
};

trait ReadDebug: Read + Debug + Send + Sync {}
impl<T: Read + Debug + Send + Sync> ReadDebug for T {}

/// HTTP 请求信息
///
/// 不包含请求体信息
#[derive(Debug)]
pub struct RequestParts {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    trailers: HeaderMap,
    content_length: Option<u64>,
    transfer_encoding: Vec<String>,
    close: bool,
    host: Option<String>,
    extensions: Extensions,
    context: Context,
}

impl RequestParts {
    /// 创建 HTTP 请求信息构建器
    #[inline]
    pub fn builder() -> RequestPartsBuilder {
        RequestPartsBuilder::default()
    }

    /// 获取请求 HTTP 方法
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// 获取请求 HTTP 方法的可变引用
    #[inline]
    pub fn method_mut(&mut self) -> &mut Method {
        &mut self.method
    }

    /// 获取 HTTP 请求 URL
    #[inline]
    pub fn url(&self) -> &Uri {
        &self.uri
    }

    /// 获取 HTTP 请求 URL 的可变引用
    #[inline]
    pub fn url_mut(&mut self) -> &mut Uri {
        &mut self.uri
    }

    /// 获取请求 HTTP Headers
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 获取请求 HTTP Headers 的可变引用
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// 获取请求 HTTP Trailers
    #[inline]
    pub fn trailers(&self) -> &HeaderMap {
        &self.trailers
    }

    /// 获取请求 HTTP Trailers 的可变引用
    #[inline]
    pub fn trailers_mut(&mut self) -> &mut HeaderMap {
        &mut self.trailers
    }

    /// 获取显式指定的请求体长度
    #[inline]
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// 获取显式指定的请求体长度的可变引用
    #[inline]
    pub fn content_length_mut(&mut self) -> &mut Option<u64> {
        &mut self.content_length
    }

    /// 获取请求传输编码
    #[inline]
    pub fn transfer_encoding(&self) -> &[String] {
        &self.transfer_encoding
    }

    /// 获取请求传输编码的可变引用
    #[inline]
    pub fn transfer_encoding_mut(&mut self) -> &mut Vec<String> {
        &mut self.transfer_encoding
    }

    /// 是否要求请求结束后关闭连接
    #[inline]
    pub fn close(&self) -> bool {
        self.close
    }

    /// 修改请求结束后是否关闭连接
    #[inline]
    pub fn close_mut(&mut self) -> &mut bool {
        &mut self.close
    }

    /// 获取覆盖 URL 授权部分的主机名
    #[inline]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// 获取覆盖 URL 授权部分的主机名的可变引用
    #[inline]
    pub fn host_mut(&mut self) -> &mut Option<String> {
        &mut self.host
    }

    /// 获取扩展信息
    #[inline]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// 获取扩展信息的可变引用
    #[inline]
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// 获取请求上下文
    #[inline]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// 获取请求上下文的可变引用
    #[inline]
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }
}

impl Default for RequestParts {
    #[inline]
    fn default() -> Self {
        Self {
            method: Method::GET,
            uri: Default::default(),
            headers: Default::default(),
            trailers: Default::default(),
            content_length: Default::default(),
            transfer_encoding: Default::default(),
            close: false,
            host: Default::default(),
            extensions: Default::default(),
            context: Default::default(),
        }
    }
}

/// HTTP 请求信息构建器
///
/// 不包含请求体信息
#[derive(Debug, Default)]
pub struct RequestPartsBuilder(RequestParts);

impl RequestPartsBuilder {
    /// 创建 HTTP 请求信息构建器
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }

    /// 设置请求 HTTP 方法
    #[inline]
    pub fn method(&mut self, method: Method) -> &mut Self {
        self.0.method = method;
        self
    }

    /// 设置 HTTP 请求 URL
    #[inline]
    pub fn url(&mut self, url: Uri) -> &mut Self {
        self.0.uri = url;
        self
    }

    /// 设置请求 HTTP Headers
    #[inline]
    pub fn headers(&mut self, headers: HeaderMap) -> &mut Self {
        self.0.headers = headers;
        self
    }

    /// 插入请求 HTTP Header
    #[inline]
    pub fn header(&mut self, header_name: impl IntoHeaderName, header_value: impl Into<HeaderValue>) -> &mut Self {
        self.0.headers.insert(header_name, header_value.into());
        self
    }

    /// 设置请求 HTTP Trailers
    #[inline]
    pub fn trailers(&mut self, trailers: HeaderMap) -> &mut Self {
        self.0.trailers = trailers;
        self
    }

    /// 设置显式指定的请求体长度
    #[inline]
    pub fn content_length(&mut self, content_length: u64) -> &mut Self {
        self.0.content_length = Some(content_length);
        self
    }

    /// 设置请求传输编码
    #[inline]
    pub fn transfer_encoding(&mut self, transfer_encoding: impl Into<Vec<String>>) -> &mut Self {
        self.0.transfer_encoding = transfer_encoding.into();
        self
    }

    /// 设置请求结束后是否关闭连接
    #[inline]
    pub fn close(&mut self, close: bool) -> &mut Self {
        self.0.close = close;
        self
    }

    /// 设置覆盖 URL 授权部分的主机名
    #[inline]
    pub fn host(&mut self, host: impl Into<String>) -> &mut Self {
        self.0.host = Some(host.into());
        self
    }

    /// 设置扩展信息
    #[inline]
    pub fn extensions(&mut self, extensions: Extensions) -> &mut Self {
        self.0.extensions = extensions;
        self
    }

    /// 追加扩展信息
    #[inline]
    pub fn add_extension<T: Clone + Send + Sync + 'static>(&mut self, val: T) -> &mut Self {
        self.0.extensions.insert(val);
        self
    }

    /// 设置请求上下文
    #[inline]
    pub fn context(&mut self, context: Context) -> &mut Self {
        self.0.context = context;
        self
    }

    /// 创建 HTTP 请求信息
    #[inline]
    pub fn build(&mut self) -> RequestParts {
        take(&mut self.0)
    }

    /// 创建 HTTP 请求
    #[inline]
    pub fn build_with_body(&mut self, body: RequestBody) -> Request {
        Request {
            parts: self.build(),
            body,
            get_body: None,
        }
    }
}

/// HTTP 请求体
#[derive(Debug)]
pub struct RequestBody(RequestBodyInner);

#[derive(Debug)]
enum RequestBodyInner {
    Empty,
    Bytes(Cursor<Vec<u8>>),
    Reader { reader: Box<dyn ReadDebug>, size: Option<u64> },
}

impl RequestBody {
    /// 创建空 HTTP 请求体
    ///
    /// 空请求体是可重放的哨兵值，与零长度的数据流不同
    #[inline]
    pub fn empty() -> Self {
        Self(RequestBodyInner::Empty)
    }

    /// 通过二进制数据创建 HTTP 请求体
    #[inline]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(RequestBodyInner::Bytes(Cursor::new(bytes)))
    }

    /// 通过输入流创建 HTTP 请求体
    #[inline]
    pub fn from_reader(reader: impl Read + Debug + Send + Sync + 'static, size: Option<u64>) -> Self {
        Self(RequestBodyInner::Reader {
            reader: Box::new(reader),
            size,
        })
    }

    /// 获取请求体大小
    ///
    /// 单位为字节，数据流可能无法给出大小
    #[inline]
    pub fn size(&self) -> Option<u64> {
        match &self.0 {
            RequestBodyInner::Empty => Some(0),
            RequestBodyInner::Bytes(bytes) => Some(bytes.get_ref().len() as u64),
            RequestBodyInner::Reader { size, .. } => *size,
        }
    }

    /// 判定请求体是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            RequestBodyInner::Empty => true,
            RequestBodyInner::Bytes(bytes) => bytes.get_ref().is_empty(),
            RequestBodyInner::Reader { .. } => false,
        }
    }

    /// 获取缓冲请求体的字节内容
    ///
    /// 仅当请求体由二进制数据构建时返回内容
    #[inline]
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.0 {
            RequestBodyInner::Bytes(bytes) => Some(bytes.get_ref()),
            _ => None,
        }
    }

    #[allow(dead_code)]
    fn ignore() {
        assert_impl!(Send: Self);
        assert_impl!(Sync: Self);
    }
}

impl Default for RequestBody {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl Read for RequestBody {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        match &mut self.0 {
            RequestBodyInner::Empty => Ok(0),
            RequestBodyInner::Bytes(bytes) => bytes.read(buf),
            RequestBodyInner::Reader { reader, .. } => reader.read(buf),
        }
    }
}

impl From<Vec<u8>> for RequestBody {
    #[inline]
    fn from(body: Vec<u8>) -> Self {
        Self::from_bytes(body)
    }
}

impl From<String> for RequestBody {
    #[inline]
    fn from(body: String) -> Self {
        Self::from_bytes(body.into_bytes())
    }
}

impl From<&str> for RequestBody {
    #[inline]
    fn from(body: &str) -> Self {
        Self::from_bytes(body.as_bytes().to_vec())
    }
}

impl From<&[u8]> for RequestBody {
    #[inline]
    fn from(body: &[u8]) -> Self {
        Self::from_bytes(body.to_vec())
    }
}

/// HTTP 请求体重放函数
///
/// 每次调用产生一个内容相同的全新请求体，是请求重试的前提
#[derive(Clone)]
pub struct GetBody(Arc<dyn Fn() -> IoResult<RequestBody> + Send + Sync>);

impl GetBody {
    /// 创建 HTTP 请求体重放函数
    #[inline]
    pub fn new(f: impl Fn() -> IoResult<RequestBody> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// 产生一个全新的请求体
    #[inline]
    pub fn produce(&self) -> IoResult<RequestBody> {
        (self.0)()
    }
}

impl Debug for GetBody {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GetBody").finish()
    }
}

/// HTTP 请求
///
/// 封装 HTTP 请求相关字段
#[derive(Debug, Default)]
pub struct Request {
    parts: RequestParts,
    body: RequestBody,
    get_body: Option<GetBody>,
}

impl Request {
    /// 创建 HTTP 请求构建器
    #[inline]
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// 获取请求体
    #[inline]
    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// 获取请求体的可变引用
    #[inline]
    pub fn body_mut(&mut self) -> &mut RequestBody {
        &mut self.body
    }

    /// 转换为 HTTP 请求体
    #[inline]
    pub fn into_body(self) -> RequestBody {
        self.body
    }

    /// 获取请求体重放函数
    #[inline]
    pub fn get_body(&self) -> Option<&GetBody> {
        self.get_body.as_ref()
    }

    /// 获取请求体重放函数的可变引用
    #[inline]
    pub fn get_body_mut(&mut self) -> &mut Option<GetBody> {
        &mut self.get_body
    }

    /// 获取请求信息
    #[inline]
    pub fn parts(&self) -> &RequestParts {
        &self.parts
    }

    /// 获取请求信息的可变引用
    #[inline]
    pub fn parts_mut(&mut self) -> &mut RequestParts {
        &mut self.parts
    }

    /// 转换为请求信息和请求体
    #[inline]
    pub fn into_parts_and_body(self) -> (RequestParts, RequestBody) {
        let Self { parts, body, .. } = self;
        (parts, body)
    }

    /// 通过请求信息和请求体创建 HTTP 请求
    #[inline]
    pub fn from_parts_and_body(parts: RequestParts, body: RequestBody) -> Self {
        Self {
            parts,
            body,
            get_body: None,
        }
    }

    #[allow(dead_code)]
    fn ignore() {
        assert_impl!(Send: Self);
        assert_impl!(Sync: Self);
    }
}

impl std::ops::Deref for Request {
    type Target = RequestParts;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.parts
    }
}

impl std::ops::DerefMut for Request {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.parts
    }
}

/// HTTP 请求构建器
#[derive(Debug, Default)]
pub struct RequestBuilder {
    inner: Request,
}

impl RequestBuilder {
    /// 创建 HTTP 请求构建器
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }

    /// 设置请求 HTTP 方法
    #[inline]
    pub fn method(&mut self, method: Method) -> &mut Self {
        *self.inner.method_mut() = method;
        self
    }

    /// 设置请求 URL
    #[inline]
    pub fn url(&mut self, url: Uri) -> &mut Self {
        *self.inner.url_mut() = url;
        self
    }

    /// 设置请求 HTTP Headers
    #[inline]
    pub fn headers(&mut self, headers: HeaderMap) -> &mut Self {
        *self.inner.headers_mut() = headers;
        self
    }

    /// 插入请求 HTTP Header
    #[inline]
    pub fn header(&mut self, header_name: impl IntoHeaderName, header_value: impl Into<HeaderValue>) -> &mut Self {
        self.inner.headers_mut().insert(header_name, header_value.into());
        self
    }

    /// 设置请求 HTTP 请求体
    #[inline]
    pub fn body(&mut self, body: impl Into<RequestBody>) -> &mut Self {
        *self.inner.body_mut() = body.into();
        self
    }

    /// 设置请求体重放函数
    #[inline]
    pub fn get_body(&mut self, get_body: GetBody) -> &mut Self {
        *self.inner.get_body_mut() = Some(get_body);
        self
    }

    /// 设置请求上下文
    #[inline]
    pub fn context(&mut self, context: Context) -> &mut Self {
        *self.inner.context_mut() = context;
        self
    }

    /// 设置扩展信息
    #[inline]
    pub fn extensions(&mut self, extensions: Extensions) -> &mut Self {
        *self.inner.extensions_mut() = extensions;
        self
    }

    /// 追加扩展信息
    #[inline]
    pub fn add_extension<T: Clone + Send + Sync + 'static>(&mut self, val: T) -> &mut Self {
        self.inner.extensions_mut().insert(val);
        self
    }

    /// 构建 HTTP 请求，同时构建器被重置
    #[inline]
    pub fn build(&mut self) -> Request {
        take(&mut self.inner)
    }

    /// 重置 HTTP 请求构建器
    #[inline]
    pub fn reset(&mut self) {
        self.inner = Default::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_replay() {
        let get_body = GetBody::new(|| Ok(RequestBody::from_bytes(b"payload".to_vec())));
        for _ in 0..3 {
            let mut body = get_body.produce().unwrap();
            let mut buf = Vec::new();
            body.read_to_end(&mut buf).unwrap();
            assert_eq!(buf, b"payload");
        }
    }

    #[test]
    fn test_request_body_size_and_emptiness() {
        assert!(RequestBody::empty().is_empty());
        assert_eq!(RequestBody::empty().size(), Some(0));
        assert!(RequestBody::from_bytes(Vec::new()).is_empty());

        let body = RequestBody::from(b"12345".as_slice());
        assert!(!body.is_empty());
        assert_eq!(body.size(), Some(5));
        assert_eq!(RequestBody::bytes(&body), Some(b"12345".as_slice()));

        let body = RequestBody::from_reader(Cursor::new(b"x".to_vec()), None);
        assert!(!body.is_empty());
        assert_eq!(body.size(), None);
        assert_eq!(RequestBody::bytes(&body), None);
    }

    #[test]
    fn test_request_builder() {
        let mut builder = Request::builder();
        let request = builder
            .method(Method::POST)
            .url("http://localhost/abc".parse().unwrap())
            .header(http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .body("hello")
            .build();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.url().to_string(), "http://localhost/abc");
        assert_eq!(
            request.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
        assert_eq!(request.body().bytes(), Some(b"hello".as_slice()));
    }
}
