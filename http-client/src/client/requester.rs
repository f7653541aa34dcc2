use super::{
    body::BodyValueInner,
    error::{ApiResult, Error, ErrorKind},
    marshaling::{decode_with, ContentTypeUnmarshaler, JsonMarshaler, Marshaler, Unmarshaler},
    middleware::{default_executor, wrap, Executor, Middleware},
    options::RequestOption,
    query::encode_pairs,
    response::read_body,
};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use sling_http::{
    header::CONTENT_TYPE, Context, GetBody, HeaderMap, HeaderValue, Method, Request, RequestBody,
    Response, ResponseBody, Uri,
};
use std::{borrow::Cow, sync::Arc};
use url::Url;

use super::body::BodyValue;

/// HTTP 请求模板
///
/// 积累请求的各项配置，按需物化出具体请求并发送。
/// 克隆产生相互独立的模板：Header、Trailer、URL 和查询参数
/// 深拷贝，编解码器、执行器和中间件以共享引用复用
#[derive(Debug, Clone, Default)]
pub struct Requester {
    pub(super) method: Option<Method>,
    pub(super) url: Option<Url>,
    pub(super) headers: HeaderMap,
    pub(super) trailers: HeaderMap,
    pub(super) query: Vec<(String, String)>,
    pub(super) body: BodyValue,
    pub(super) content_length: Option<u64>,
    pub(super) transfer_encoding: Vec<String>,
    pub(super) close: bool,
    pub(super) host: Option<String>,
    pub(super) get_body: Option<GetBody>,
    pub(super) marshaler: Option<Arc<dyn Marshaler>>,
    pub(super) unmarshaler: Option<Arc<dyn Unmarshaler>>,
    pub(super) executor: Option<Arc<dyn Executor>>,
    pub(super) middleware: Vec<Arc<dyn Middleware>>,
}

fn default_marshaler() -> Arc<dyn Marshaler> {
    static DEFAULT_MARSHALER: Lazy<Arc<dyn Marshaler>> =
        Lazy::new(|| Arc::new(JsonMarshaler::default()));
    DEFAULT_MARSHALER.to_owned()
}

fn default_unmarshaler() -> Arc<dyn Unmarshaler> {
    static DEFAULT_UNMARSHALER: Lazy<Arc<dyn Unmarshaler>> =
        Lazy::new(|| Arc::new(ContentTypeUnmarshaler::new()));
    DEFAULT_UNMARSHALER.to_owned()
}

impl Requester {
    /// 创建请求模板并应用选项
    pub fn new(options: &[RequestOption]) -> ApiResult<Self> {
        let mut requester = Self::default();
        requester.apply(options)?;
        Ok(requester)
    }

    /// 创建请求模板并应用选项，选项应用失败时直接崩溃
    ///
    /// 只适合在构造阶段使用，此时失败意味着编程错误
    pub fn must_new(options: &[RequestOption]) -> Self {
        Self::new(options).expect("failed to apply requester options")
    }

    /// 依次应用选项，遇到第一个失败立即停止并返回错误
    pub fn apply(&mut self, options: &[RequestOption]) -> ApiResult<()> {
        for option in options {
            option.apply(self)?;
        }
        Ok(())
    }

    /// 依次应用选项，选项应用失败时直接崩溃
    pub fn must_apply(&mut self, options: &[RequestOption]) {
        self.apply(options).expect("failed to apply requester options")
    }

    /// 克隆模板并在克隆上应用选项，原模板保持不变
    pub fn with(&self, options: &[RequestOption]) -> ApiResult<Self> {
        let mut cloned = self.to_owned();
        cloned.apply(options)?;
        Ok(cloned)
    }

    /// 克隆模板并在克隆上应用选项，选项应用失败时直接崩溃
    pub fn must_with(&self, options: &[RequestOption]) -> Self {
        self.with(options).expect("failed to apply requester options")
    }

    fn with_opts(&self, options: &[RequestOption]) -> ApiResult<Cow<'_, Self>> {
        if options.is_empty() {
            Ok(Cow::Borrowed(self))
        } else {
            Ok(Cow::Owned(self.with(options)?))
        }
    }

    /// 获取请求 HTTP 方法，未设置时为 GET
    #[inline]
    pub fn method(&self) -> &Method {
        self.method.as_ref().unwrap_or(&Method::GET)
    }

    /// 获取请求 URL
    #[inline]
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
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

    /// 获取查询参数
    #[inline]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// 获取查询参数的可变引用
    #[inline]
    pub fn params_mut(&mut self) -> &mut Vec<(String, String)> {
        &mut self.query
    }

    /// 获取构建模板中的请求体
    #[inline]
    pub fn body_value(&self) -> &BodyValue {
        &self.body
    }

    /// 物化一个 HTTP 请求
    pub fn request(&self, options: &[RequestOption]) -> ApiResult<Request> {
        self.request_with_context(Context::background(), options)
    }

    /// 在给定上下文中物化一个 HTTP 请求
    pub fn request_with_context(&self, context: Context, options: &[RequestOption]) -> ApiResult<Request> {
        self.with_opts(options)?.materialize(context)
    }

    fn materialize(&self, context: Context) -> ApiResult<Request> {
        let (body, content_type_hint, auto_get_body) = self.derive_body()?;

        let uri: Uri = match self.url.as_ref() {
            Some(url) => url.as_str().parse().map_err(|err| {
                Error::new_with_msg(ErrorKind::Config, format!("invalid url {:?}: {}", url.as_str(), err))
            })?,
            None => Uri::default(),
        };

        let mut builder = Request::builder();
        builder
            .method(self.method.to_owned().unwrap_or(Method::GET))
            .url(uri)
            .context(context);
        let mut request = builder.build();

        *request.headers_mut() = self.headers.to_owned();
        *request.trailers_mut() = self.trailers.to_owned();
        *request.transfer_encoding_mut() = self.transfer_encoding.to_owned();
        *request.close_mut() = self.close;
        *request.host_mut() = self.host.to_owned();
        if self.content_length.is_some() {
            *request.content_length_mut() = self.content_length;
        }
        *request.body_mut() = body;
        *request.get_body_mut() = self.get_body.to_owned().or(auto_get_body);

        // 序列化器给出的 Content-Type 只在调用方没有显式设置时生效
        if let Some(hint) = content_type_hint {
            if !request.headers().contains_key(CONTENT_TYPE) {
                let value = HeaderValue::from_str(&hint).map_err(|err| {
                    Error::new_with_msg(ErrorKind::Config, format!("invalid content type {:?}: {}", hint, err))
                })?;
                request.headers_mut().insert(CONTENT_TYPE, value);
            }
        }

        if !self.query.is_empty() {
            let mut url = self.url.to_owned().ok_or_else(|| {
                Error::new_with_msg(ErrorKind::Config, "query parameters require a url to be set")
            })?;
            let encoded = encode_pairs(self.query.iter().map(|(key, value)| (key.as_str(), value.as_str())));
            // 追加到 URL 中已经编码的查询串之后，不覆盖
            let merged = match url.query() {
                None | Some("") => encoded,
                Some(existing) => format!("{}&{}", existing, encoded),
            };
            url.set_query(Some(&merged));
            *request.url_mut() = url.as_str().parse().map_err(|err| {
                Error::new_with_msg(ErrorKind::Config, format!("invalid url {:?}: {}", url.as_str(), err))
            })?;
        }

        Ok(request)
    }

    /// 从模板的请求体配置推导出请求体、Content-Type 提示和重放函数
    fn derive_body(&self) -> ApiResult<(RequestBody, Option<String>, Option<GetBody>)> {
        fn replayable(bytes: Vec<u8>) -> (RequestBody, Option<GetBody>) {
            let shared: Arc<Vec<u8>> = Arc::new(bytes);
            let body = RequestBody::from_bytes(shared.to_vec());
            let get_body = GetBody::new(move || Ok(RequestBody::from_bytes(shared.to_vec())));
            (body, Some(get_body))
        }

        match &self.body.0 {
            BodyValueInner::Empty => Ok((RequestBody::empty(), None, None)),
            BodyValueInner::Text(text) => {
                let (body, get_body) = replayable(text.to_owned().into_bytes());
                Ok((body, None, get_body))
            }
            BodyValueInner::Bytes(bytes) => {
                let (body, get_body) = replayable(bytes.to_owned());
                Ok((body, None, get_body))
            }
            BodyValueInner::Reader(shared) => Ok((shared.take()?, None, None)),
            BodyValueInner::Value(value) => {
                let marshaler = self.marshaler.to_owned().unwrap_or_else(default_marshaler);
                let (data, content_type) = marshaler.marshal(value.as_ref())?;
                let (body, get_body) = replayable(data);
                Ok((body, Some(content_type), get_body))
            }
        }
    }

    /// 物化请求并通过中间件链与执行器发送
    pub fn send(&self, options: &[RequestOption]) -> ApiResult<Response> {
        self.send_with_context(Context::background(), options)
    }

    /// 在给定上下文中物化请求并发送
    pub fn send_with_context(&self, context: Context, options: &[RequestOption]) -> ApiResult<Response> {
        let requester = self.with_opts(options)?;
        let mut request = requester.materialize(context)?;
        requester.execute(&mut request)
    }

    /// 发送请求并完整读出响应体
    pub fn receive_bytes(&self, options: &[RequestOption]) -> ApiResult<Response<Vec<u8>>> {
        self.receive_bytes_with_context(Context::background(), options)
    }

    /// 在给定上下文中发送请求并完整读出响应体
    ///
    /// 中间件返回的错误上携带响应时，响应体同样被完整读出
    /// 并重新附在错误上，调用方总能检查原始内容
    pub fn receive_bytes_with_context(&self, context: Context, options: &[RequestOption]) -> ApiResult<Response<Vec<u8>>> {
        let requester = self.with_opts(options)?;
        match requester.send_with_context(context, &[]) {
            Ok(response) => read_body(response),
            Err(mut err) => {
                if let Some(response) = err.take_response() {
                    if let Ok(buffered) = read_body(response) {
                        err = err.with_response(buffered.map_body(ResponseBody::from_bytes));
                    }
                }
                Err(err)
            }
        }
    }

    /// 发送请求、读出响应体并按响应的 Content-Type 解码
    pub fn receive<T: DeserializeOwned>(&self, options: &[RequestOption]) -> ApiResult<(T, Response<Vec<u8>>)> {
        self.receive_with_context(Context::background(), options)
    }

    /// 在给定上下文中发送请求、读出响应体并解码
    ///
    /// 解码失败时错误上附有已读出的响应，供调用方检查原始负载
    pub fn receive_with_context<T: DeserializeOwned>(
        &self,
        context: Context,
        options: &[RequestOption],
    ) -> ApiResult<(T, Response<Vec<u8>>)> {
        let requester = self.with_opts(options)?;
        let response = requester.receive_bytes_with_context(context, &[])?;

        if response.body().is_empty() {
            return Err(Error::new_with_msg(
                ErrorKind::Unmarshal,
                "cannot unmarshal an empty response body",
            )
            .with_response(response.map_body(ResponseBody::from_bytes)));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let unmarshaler = requester.unmarshaler.to_owned().unwrap_or_else(default_unmarshaler);

        match decode_with(|target| unmarshaler.unmarshal(response.body(), &content_type, target)) {
            Ok(value) => Ok((value, response)),
            Err(err) => Err(err.with_response(response.map_body(ResponseBody::from_bytes))),
        }
    }
}

impl Executor for Requester {
    /// 请求模板本身也是执行器：用自身的执行器与中间件链执行请求
    fn execute(&self, request: &mut Request) -> ApiResult<Response> {
        let executor = match self.executor.to_owned() {
            Some(executor) => executor,
            None => default_executor()?,
        };
        wrap(executor, &self.middleware).execute(request)
    }
}

static DEFAULT_REQUESTER: Lazy<Requester> = Lazy::new(Requester::default);

/// 获取进程级默认请求模板
///
/// 默认模板自身永不改变，所有顶层函数都在它的克隆上应用选项
#[inline]
pub fn default_requester() -> &'static Requester {
    &DEFAULT_REQUESTER
}

/// 用默认模板物化一个 HTTP 请求
pub fn request(options: &[RequestOption]) -> ApiResult<Request> {
    DEFAULT_REQUESTER.request(options)
}

/// 用默认模板在给定上下文中物化一个 HTTP 请求
pub fn request_with_context(context: Context, options: &[RequestOption]) -> ApiResult<Request> {
    DEFAULT_REQUESTER.request_with_context(context, options)
}

/// 用默认模板发送请求
pub fn send(options: &[RequestOption]) -> ApiResult<Response> {
    DEFAULT_REQUESTER.send(options)
}

/// 用默认模板在给定上下文中发送请求
pub fn send_with_context(context: Context, options: &[RequestOption]) -> ApiResult<Response> {
    DEFAULT_REQUESTER.send_with_context(context, options)
}

/// 用默认模板发送请求并完整读出响应体
pub fn receive_bytes(options: &[RequestOption]) -> ApiResult<Response<Vec<u8>>> {
    DEFAULT_REQUESTER.receive_bytes(options)
}

/// 用默认模板在给定上下文中发送请求并完整读出响应体
pub fn receive_bytes_with_context(context: Context, options: &[RequestOption]) -> ApiResult<Response<Vec<u8>>> {
    DEFAULT_REQUESTER.receive_bytes_with_context(context, options)
}

/// 用默认模板发送请求、读出响应体并解码
pub fn receive<T: DeserializeOwned>(options: &[RequestOption]) -> ApiResult<(T, Response<Vec<u8>>)> {
    DEFAULT_REQUESTER.receive(options)
}

/// 用默认模板在给定上下文中发送请求、读出响应体并解码
pub fn receive_with_context<T: DeserializeOwned>(
    context: Context,
    options: &[RequestOption],
) -> ApiResult<(T, Response<Vec<u8>>)> {
    DEFAULT_REQUESTER.receive_with_context(context, options)
}
