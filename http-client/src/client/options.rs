use super::{
    body::BodyValue,
    error::{ApiResult, Error, ErrorKind},
    marshaling::{
        FormMarshaler, JsonMarshaler, Marshaler, Unmarshaler, XmlMarshaler, CONTENT_TYPE_JSON,
        CONTENT_TYPE_JSON_UTF8, CONTENT_TYPE_XML, CONTENT_TYPE_XML_UTF8,
    },
    middleware::{CallerExecutor, Executor, Middleware},
    query::QueryInput,
    requester::Requester,
};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use sling_http::{
    header::{HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, RANGE},
    GetBody, HttpCaller, Method,
};
use std::{
    fmt::{self, Debug},
    io::Read,
    sync::Arc,
};
use url::Url;

const BASIC_AUTH_PREFIX: &str = "Basic ";
const BEARER_AUTH_PREFIX: &str = "Bearer ";

/// 请求模板选项
///
/// 选项是一个可以修改 [`Requester`] 的值，应用时可能失败。
/// 选项可以克隆后反复应用，互不影响
#[derive(Clone)]
pub struct RequestOption(Arc<dyn Fn(&mut Requester) -> ApiResult<()> + Send + Sync>);

impl RequestOption {
    /// 通过函数创建请求模板选项
    #[inline]
    pub fn new(f: impl Fn(&mut Requester) -> ApiResult<()> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// 组合多个选项为一个选项，按给定顺序应用
    pub fn join(options: impl Into<Vec<RequestOption>>) -> Self {
        let options = options.into();
        Self::new(move |requester| {
            for option in options.iter() {
                option.apply(requester)?;
            }
            Ok(())
        })
    }

    pub(super) fn apply(&self, requester: &mut Requester) -> ApiResult<()> {
        (self.0)(requester)
    }
}

impl Debug for RequestOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestOption").finish()
    }
}

/// 设置请求 HTTP 方法
pub fn method(method: Method) -> RequestOption {
    RequestOption::new(move |requester| {
        requester.method = Some(method.to_owned());
        Ok(())
    })
}

fn method_with_path(m: Method, path: String) -> RequestOption {
    RequestOption::new(move |requester| {
        requester.method = Some(m.to_owned());
        if path.is_empty() {
            return Ok(());
        }
        relative_url([path.as_str()]).apply(requester)
    })
}

/// 设置 HTTP 方法为 HEAD，并把路径解析为相对 URL
pub fn head(path: impl Into<String>) -> RequestOption {
    method_with_path(Method::HEAD, path.into())
}

/// 设置 HTTP 方法为 GET，并把路径解析为相对 URL
pub fn get(path: impl Into<String>) -> RequestOption {
    method_with_path(Method::GET, path.into())
}

/// 设置 HTTP 方法为 POST，并把路径解析为相对 URL
pub fn post(path: impl Into<String>) -> RequestOption {
    method_with_path(Method::POST, path.into())
}

/// 设置 HTTP 方法为 PUT，并把路径解析为相对 URL
pub fn put(path: impl Into<String>) -> RequestOption {
    method_with_path(Method::PUT, path.into())
}

/// 设置 HTTP 方法为 PATCH，并把路径解析为相对 URL
pub fn patch(path: impl Into<String>) -> RequestOption {
    method_with_path(Method::PATCH, path.into())
}

/// 设置 HTTP 方法为 DELETE，并把路径解析为相对 URL
pub fn delete(path: impl Into<String>) -> RequestOption {
    method_with_path(Method::DELETE, path.into())
}

/// 替换请求 URL
///
/// 多次应用时最后一次生效
pub fn url(raw_url: impl Into<String>) -> RequestOption {
    let raw_url = raw_url.into();
    RequestOption::new(move |requester| {
        let parsed = Url::parse(&raw_url)
            .map_err(|err| Error::new_with_msg(ErrorKind::Config, format!("invalid url {:?}: {}", raw_url, err)))?;
        requester.url = Some(parsed);
        Ok(())
    })
}

/// 把每个参数作为 URL 引用依次对当前 URL 做引用解析
///
/// 没有当前 URL 时第一个参数成为基准 URL
pub fn relative_url(paths: impl IntoIterator<Item = impl Into<String>>) -> RequestOption {
    let paths: Vec<String> = paths.into_iter().map(Into::into).collect();
    RequestOption::new(move |requester| {
        for path in paths.iter() {
            let resolved = match requester.url.as_ref() {
                None => Url::parse(path),
                Some(base) => base.join(path),
            }
            .map_err(|err| Error::new_with_msg(ErrorKind::Config, format!("invalid url {:?}: {}", path, err)))?;
            requester.url = Some(resolved);
        }
        Ok(())
    })
}

/// 将路径片段追加到当前 URL 路径末尾
///
/// 每个片段去除首尾空白与斜杠后以单个 `/` 连接；
/// 最后一个非空片段以斜杠结尾时结果保留末尾斜杠
pub fn append_path(segments: impl IntoIterator<Item = impl Into<String>>) -> RequestOption {
    let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
    RequestOption::new(move |requester| {
        if segments.is_empty() {
            return Ok(());
        }
        let base = requester.url.as_ref().ok_or_else(|| {
            Error::new_with_msg(ErrorKind::Config, "append_path requires a base url to be set first")
        })?;
        let base_path = base.path().to_owned();

        let mut trailing_slash = base_path.ends_with('/');
        let mut trimmed = Vec::with_capacity(segments.len());
        for segment in segments.iter() {
            if !segment.is_empty() {
                trailing_slash = segment.ends_with('/');
            }
            let cleaned = segment.trim_matches(|c: char| c.is_whitespace() || c == '/');
            if !cleaned.is_empty() {
                trimmed.push(cleaned);
            }
        }

        let mut new_path = base_path.trim_end_matches('/').to_owned();
        for segment in trimmed {
            new_path.push('/');
            new_path.push_str(segment);
        }
        if trailing_slash {
            new_path.push('/');
        }

        relative_url([new_path.as_str()]).apply(requester)
    })
}

fn parse_header(key: &str, value: &str) -> ApiResult<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(key.as_bytes())
        .map_err(|err| Error::new_with_msg(ErrorKind::Config, format!("invalid header name {:?}: {}", key, err)))?;
    let value = HeaderValue::from_str(value)
        .map_err(|err| Error::new_with_msg(ErrorKind::Config, format!("invalid header value {:?}: {}", value, err)))?;
    Ok((name, value))
}

/// 设置请求 HTTP Header，覆盖同名 Header 的现有值
pub fn header(key: impl Into<String>, value: impl Into<String>) -> RequestOption {
    let (key, value) = (key.into(), value.into());
    RequestOption::new(move |requester| {
        let (name, value) = parse_header(&key, &value)?;
        requester.headers.insert(name, value);
        Ok(())
    })
}

/// 追加请求 HTTP Header，保留同名 Header 的现有值
pub fn add_header(key: impl Into<String>, value: impl Into<String>) -> RequestOption {
    let (key, value) = (key.into(), value.into());
    RequestOption::new(move |requester| {
        let (name, value) = parse_header(&key, &value)?;
        requester.headers.append(name, value);
        Ok(())
    })
}

/// 删除请求 HTTP Header
pub fn delete_header(key: impl Into<String>) -> RequestOption {
    let key = key.into();
    RequestOption::new(move |requester| {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|err| Error::new_with_msg(ErrorKind::Config, format!("invalid header name {:?}: {}", key, err)))?;
        requester.headers.remove(name);
        Ok(())
    })
}

/// 设置 Basic 认证
///
/// 用户名和密码都为空时删除 Authorization Header
pub fn basic_auth(username: impl Into<String>, password: impl Into<String>) -> RequestOption {
    let (username, password) = (username.into(), password.into());
    if username.is_empty() && password.is_empty() {
        return delete_header(AUTHORIZATION.as_str());
    }
    let encoded = BASE64_STANDARD.encode(format!("{}:{}", username, password));
    header(AUTHORIZATION.as_str(), format!("{}{}", BASIC_AUTH_PREFIX, encoded))
}

/// 设置 Bearer 认证
///
/// 令牌为空时删除 Authorization Header
pub fn bearer_auth(token: impl Into<String>) -> RequestOption {
    let token = token.into();
    if token.is_empty() {
        return delete_header(AUTHORIZATION.as_str());
    }
    header(AUTHORIZATION.as_str(), format!("{}{}", BEARER_AUTH_PREFIX, token))
}

/// 追加一个查询参数
///
/// 键为空时不做任何事
pub fn query_param(key: impl Into<String>, value: impl Into<String>) -> RequestOption {
    let (key, value) = (key.into(), value.into());
    RequestOption::new(move |requester| {
        if key.is_empty() {
            return Ok(());
        }
        requester.query.push((key.to_owned(), value.to_owned()));
        Ok(())
    })
}

/// 追加一组查询参数
///
/// 接受键值对列表、映射、多值映射或任意可序列化值，
/// 全部追加到模板已有的查询参数之后
pub fn query_params(input: impl Into<QueryInput>) -> RequestOption {
    let input = input.into();
    RequestOption::new(move |requester| {
        requester.query.extend(input.to_owned().into_pairs()?);
        Ok(())
    })
}

/// 设置请求体为可序列化值
///
/// 物化请求时由模板当前的序列化器编码
pub fn body(value: impl serde::Serialize + Send + Sync + 'static) -> RequestOption {
    let body = BodyValue::from_value(value);
    RequestOption::new(move |requester| {
        requester.body = body.to_owned();
        Ok(())
    })
}

/// 设置文本请求体
pub fn body_text(text: impl Into<String>) -> RequestOption {
    let body = BodyValue::from(text.into());
    RequestOption::new(move |requester| {
        requester.body = body.to_owned();
        Ok(())
    })
}

/// 设置二进制请求体
pub fn body_bytes(bytes: impl Into<Vec<u8>>) -> RequestOption {
    let body = BodyValue::from(bytes.into());
    RequestOption::new(move |requester| {
        requester.body = body.to_owned();
        Ok(())
    })
}

/// 设置数据流请求体
///
/// 数据流只能被物化一次，重试这样的请求需要
/// 额外通过 [`with_get_body`] 提供重放函数
pub fn body_reader(reader: impl Read + Send + Sync + 'static, size: Option<u64>) -> RequestOption {
    let body = BodyValue::from_reader(reader, size);
    RequestOption::new(move |requester| {
        requester.body = body.to_owned();
        Ok(())
    })
}

/// 设置请求体序列化器
pub fn with_marshaler(marshaler: impl Marshaler + 'static) -> RequestOption {
    let marshaler: Arc<dyn Marshaler> = Arc::new(marshaler);
    RequestOption::new(move |requester| {
        requester.marshaler = Some(marshaler.to_owned());
        Ok(())
    })
}

/// 设置响应体反序列化器
pub fn with_unmarshaler(unmarshaler: impl Unmarshaler + 'static) -> RequestOption {
    let unmarshaler: Arc<dyn Unmarshaler> = Arc::new(unmarshaler);
    RequestOption::new(move |requester| {
        requester.unmarshaler = Some(unmarshaler.to_owned());
        Ok(())
    })
}

/// 使用 JSON 编解码：设置序列化器以及 Content-Type 和 Accept
pub fn json(indent: bool) -> RequestOption {
    RequestOption::join([
        with_marshaler(JsonMarshaler { indent }),
        content_type(CONTENT_TYPE_JSON_UTF8),
        accept(CONTENT_TYPE_JSON),
    ])
}

/// 使用 XML 编解码：设置序列化器以及 Content-Type 和 Accept
pub fn xml(indent: bool) -> RequestOption {
    RequestOption::join([
        with_marshaler(XmlMarshaler { indent }),
        content_type(CONTENT_TYPE_XML_UTF8),
        accept(CONTENT_TYPE_XML),
    ])
}

/// 使用表单编码：仅设置序列化器，不设置 Header
///
/// 通常与 `body(values)` 搭配使用
pub fn form() -> RequestOption {
    with_marshaler(FormMarshaler)
}

/// 设置 Accept Header
pub fn accept(value: impl Into<String>) -> RequestOption {
    header(ACCEPT.as_str(), value)
}

/// 设置 Content-Type Header
pub fn content_type(value: impl Into<String>) -> RequestOption {
    header(CONTENT_TYPE.as_str(), value)
}

/// 设置 Range Header
pub fn range(value: impl Into<String>) -> RequestOption {
    header(RANGE.as_str(), value)
}

/// 设置覆盖 URL 授权部分的主机名
pub fn host(host: impl Into<String>) -> RequestOption {
    let host = host.into();
    RequestOption::new(move |requester| {
        requester.host = Some(host.to_owned());
        Ok(())
    })
}

/// 显式指定请求体长度
pub fn content_length(length: u64) -> RequestOption {
    RequestOption::new(move |requester| {
        requester.content_length = Some(length);
        Ok(())
    })
}

/// 设置请求传输编码
pub fn transfer_encoding(encodings: impl IntoIterator<Item = impl Into<String>>) -> RequestOption {
    let encodings: Vec<String> = encodings.into_iter().map(Into::into).collect();
    RequestOption::new(move |requester| {
        requester.transfer_encoding = encodings.to_owned();
        Ok(())
    })
}

/// 设置请求结束后是否关闭连接
pub fn close_connection(close: bool) -> RequestOption {
    RequestOption::new(move |requester| {
        requester.close = close;
        Ok(())
    })
}

/// 设置请求体重放函数
///
/// 为数据流请求体提供重试所需的重放能力
pub fn with_get_body(get_body: GetBody) -> RequestOption {
    RequestOption::new(move |requester| {
        requester.get_body = Some(get_body.to_owned());
        Ok(())
    })
}

/// 替换执行器
pub fn with_executor(executor: impl Executor + 'static) -> RequestOption {
    let executor: Arc<dyn Executor> = Arc::new(executor);
    RequestOption::new(move |requester| {
        requester.executor = Some(executor.to_owned());
        Ok(())
    })
}

/// 以 HTTP 传输层调用器作为执行器
pub fn with_caller(caller: impl HttpCaller + 'static) -> RequestOption {
    with_executor(CallerExecutor::new(caller))
}

/// 追加中间件
pub fn with_middleware(middleware: impl Middleware + 'static) -> RequestOption {
    let middleware: Arc<dyn Middleware> = Arc::new(middleware);
    RequestOption::new(move |requester| {
        requester.middleware.push(middleware.to_owned());
        Ok(())
    })
}
