use super::error::{ApiResult, Error, ErrorKind};
use sling_http::RequestBody;
use std::{
    fmt::{self, Debug},
    io::Read,
    sync::{Arc, Mutex},
};

pub(super) type ErasedValue = Arc<dyn erased_serde::Serialize + Send + Sync>;

/// 构建模板中的请求体
///
/// 文本、二进制与序列化值形式的请求体随模板克隆共享，
/// 可以反复物化；数据流形式的请求体只能被物化一次
#[derive(Clone, Default)]
pub struct BodyValue(pub(super) BodyValueInner);

#[derive(Clone, Default)]
pub(super) enum BodyValueInner {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Reader(SharedReader),
    Value(ErasedValue),
}

impl BodyValue {
    /// 创建空请求体
    #[inline]
    pub fn empty() -> Self {
        Self(BodyValueInner::Empty)
    }

    /// 通过数据流创建请求体
    #[inline]
    pub fn from_reader(reader: impl Read + Send + Sync + 'static, size: Option<u64>) -> Self {
        Self(BodyValueInner::Reader(SharedReader::new(reader, size)))
    }

    /// 通过可序列化值创建请求体
    ///
    /// 物化时交给模板当前的序列化器编码
    #[inline]
    pub fn from_value(value: impl serde::Serialize + Send + Sync + 'static) -> Self {
        Self(BodyValueInner::Value(Arc::new(value)))
    }

    /// 判定请求体是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(&self.0, BodyValueInner::Empty)
    }
}

impl From<String> for BodyValue {
    #[inline]
    fn from(body: String) -> Self {
        Self(BodyValueInner::Text(body))
    }
}

impl From<&str> for BodyValue {
    #[inline]
    fn from(body: &str) -> Self {
        Self(BodyValueInner::Text(body.to_owned()))
    }
}

impl From<Vec<u8>> for BodyValue {
    #[inline]
    fn from(body: Vec<u8>) -> Self {
        Self(BodyValueInner::Bytes(body))
    }
}

impl From<&[u8]> for BodyValue {
    #[inline]
    fn from(body: &[u8]) -> Self {
        Self(BodyValueInner::Bytes(body.to_vec()))
    }
}

impl Debug for BodyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            BodyValueInner::Empty => f.write_str("Empty"),
            BodyValueInner::Text(text) => f.debug_tuple("Text").field(text).finish(),
            BodyValueInner::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            BodyValueInner::Reader(_) => f.debug_tuple("Reader").finish(),
            BodyValueInner::Value(_) => f.debug_tuple("Value").finish(),
        }
    }
}

type BoxReader = Box<dyn Read + Send + Sync>;

/// 克隆间共享的一次性数据流
#[derive(Clone)]
pub(super) struct SharedReader {
    inner: Arc<Mutex<Option<(BoxReader, Option<u64>)>>>,
}

impl SharedReader {
    fn new(reader: impl Read + Send + Sync + 'static, size: Option<u64>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some((Box::new(reader), size)))),
        }
    }

    /// 取出数据流，第二次取出报错
    pub(super) fn take(&self) -> ApiResult<RequestBody> {
        let taken = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match taken {
            Some((reader, size)) => Ok(RequestBody::from_reader(ReaderWrapper(reader), size)),
            None => Err(Error::new_with_msg(
                ErrorKind::Config,
                "request body stream was already consumed by an earlier request",
            )),
        }
    }
}

struct ReaderWrapper(BoxReader);

impl Read for ReaderWrapper {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl Debug for ReaderWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReaderWrapper").finish()
    }
}
