use super::{
    error::{ApiResult, Error, ErrorKind},
    query::{encode_pairs, value_pairs},
};
use mime::Mime;
use serde::de::DeserializeOwned;
use std::{
    collections::HashMap,
    fmt::{self, Debug},
    sync::Arc,
};

/// `application/json` 媒体类型
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// 带字符集参数的 `application/json` 媒体类型
pub const CONTENT_TYPE_JSON_UTF8: &str = "application/json;charset=utf-8";
/// `application/xml` 媒体类型
pub const CONTENT_TYPE_XML: &str = "application/xml";
/// 带字符集参数的 `application/xml` 媒体类型
pub const CONTENT_TYPE_XML_UTF8: &str = "application/xml;charset=utf-8";
/// `application/x-www-form-urlencoded` 媒体类型
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// 可被序列化器编码的值
pub type MarshalValue = dyn erased_serde::Serialize + Send + Sync;

/// 请求体序列化接口
///
/// 将值编码为字节数组，并给出建议的 Content-Type
pub trait Marshaler: Debug + Send + Sync {
    /// 编码请求体
    fn marshal(&self, value: &MarshalValue) -> ApiResult<(Vec<u8>, String)>;
}

/// 响应体反序列化接口
pub trait Unmarshaler: Debug + Send + Sync {
    /// 按照媒体类型将字节数组解码到目标位置
    fn unmarshal(&self, data: &[u8], content_type: &str, target: &mut DecodeTarget<'_>) -> ApiResult<()>;
}

trait DecodeSink {
    fn consume(&mut self, deserializer: &mut dyn erased_serde::Deserializer<'_>) -> Result<(), erased_serde::Error>;
}

struct SlotSink<'v, T> {
    slot: &'v mut Option<T>,
}

impl<T: DeserializeOwned> DecodeSink for SlotSink<'_, T> {
    fn consume(&mut self, deserializer: &mut dyn erased_serde::Deserializer<'_>) -> Result<(), erased_serde::Error> {
        *self.slot = Some(erased_serde::deserialize(deserializer)?);
        Ok(())
    }
}

/// 反序列化目标位置
///
/// 对具体目标类型做了擦除，反序列化器通过
/// [`DecodeTarget::deserialize`] 将解码结果写入目标
pub struct DecodeTarget<'a> {
    sink: &'a mut dyn DecodeSink,
}

impl DecodeTarget<'_> {
    /// 从给定的反序列化器中解码出目标值
    pub fn deserialize(&mut self, deserializer: &mut dyn erased_serde::Deserializer<'_>) -> ApiResult<()> {
        self.sink
            .consume(deserializer)
            .map_err(|err| Error::new(ErrorKind::Unmarshal, err))
    }
}

impl Debug for DecodeTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DecodeTarget").finish()
    }
}

/// 驱动反序列化接口解码出具体类型的值
pub fn decode_with<T: DeserializeOwned>(f: impl FnOnce(&mut DecodeTarget<'_>) -> ApiResult<()>) -> ApiResult<T> {
    let mut slot: Option<T> = None;
    {
        let mut sink = SlotSink { slot: &mut slot };
        let mut target = DecodeTarget { sink: &mut sink };
        f(&mut target)?;
    }
    slot.ok_or_else(|| Error::new_with_msg(ErrorKind::Unmarshal, "unmarshaler did not produce a value"))
}

/// JSON 编解码器
#[derive(Debug, Clone, Default)]
pub struct JsonMarshaler {
    /// 是否以两空格缩进输出
    pub indent: bool,
}

impl Marshaler for JsonMarshaler {
    fn marshal(&self, value: &MarshalValue) -> ApiResult<(Vec<u8>, String)> {
        let data = if self.indent {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        }
        .map_err(|err| Error::new(ErrorKind::Marshal, err))?;
        Ok((data, CONTENT_TYPE_JSON_UTF8.to_owned()))
    }
}

impl Unmarshaler for JsonMarshaler {
    fn unmarshal(&self, data: &[u8], _content_type: &str, target: &mut DecodeTarget<'_>) -> ApiResult<()> {
        let mut deserializer = serde_json::Deserializer::from_slice(data);
        let mut erased = <dyn erased_serde::Deserializer>::erase(&mut deserializer);
        target.deserialize(&mut erased)
    }
}

/// XML 编解码器
#[derive(Debug, Clone, Default)]
pub struct XmlMarshaler {
    /// 是否以两空格缩进输出
    pub indent: bool,
}

impl Marshaler for XmlMarshaler {
    fn marshal(&self, value: &MarshalValue) -> ApiResult<(Vec<u8>, String)> {
        let mut out = String::new();
        let mut serializer = quick_xml::se::Serializer::new(&mut out);
        if self.indent {
            serializer.indent(' ', 2);
        }
        let result = erased_serde::serialize(value, serializer);
        result.map_err(|err| Error::new(ErrorKind::Marshal, err))?;
        Ok((out.into_bytes(), CONTENT_TYPE_XML_UTF8.to_owned()))
    }
}

impl Unmarshaler for XmlMarshaler {
    fn unmarshal(&self, data: &[u8], _content_type: &str, target: &mut DecodeTarget<'_>) -> ApiResult<()> {
        let text = std::str::from_utf8(data).map_err(|err| Error::new(ErrorKind::Unmarshal, err))?;
        let mut deserializer = quick_xml::de::Deserializer::from_str(text);
        let mut erased = <dyn erased_serde::Deserializer>::erase(&mut deserializer);
        target.deserialize(&mut erased)
    }
}

/// 表单编码器
///
/// 将映射或结构体编码为 `application/x-www-form-urlencoded`，
/// 键按字典序输出，同键的多个值保持输入顺序
#[derive(Debug, Clone, Default)]
pub struct FormMarshaler;

impl Marshaler for FormMarshaler {
    fn marshal(&self, value: &MarshalValue) -> ApiResult<(Vec<u8>, String)> {
        let pairs = value_pairs(value).map_err(|err| match err.kind() {
            ErrorKind::Config => Error::new_with_msg(ErrorKind::Marshal, err.to_string()),
            _ => err,
        })?;
        let encoded = encode_pairs(pairs.iter().map(|(key, value)| (key.as_str(), value.as_str())));
        Ok((encoded.into_bytes(), CONTENT_TYPE_FORM.to_owned()))
    }
}

/// 函数形式的请求体序列化器
#[derive(Clone)]
pub struct MarshalFn(Arc<dyn Fn(&MarshalValue) -> ApiResult<(Vec<u8>, String)> + Send + Sync>);

impl MarshalFn {
    /// 通过函数创建请求体序列化器
    #[inline]
    pub fn new(f: impl Fn(&MarshalValue) -> ApiResult<(Vec<u8>, String)> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl Marshaler for MarshalFn {
    #[inline]
    fn marshal(&self, value: &MarshalValue) -> ApiResult<(Vec<u8>, String)> {
        (self.0)(value)
    }
}

impl Debug for MarshalFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MarshalFn").finish()
    }
}

/// 函数形式的响应体反序列化器
#[derive(Clone)]
pub struct UnmarshalFn(Arc<dyn Fn(&[u8], &str, &mut DecodeTarget<'_>) -> ApiResult<()> + Send + Sync>);

impl UnmarshalFn {
    /// 通过函数创建响应体反序列化器
    #[inline]
    pub fn new(f: impl Fn(&[u8], &str, &mut DecodeTarget<'_>) -> ApiResult<()> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl Unmarshaler for UnmarshalFn {
    #[inline]
    fn unmarshal(&self, data: &[u8], content_type: &str, target: &mut DecodeTarget<'_>) -> ApiResult<()> {
        (self.0)(data, content_type, target)
    }
}

impl Debug for UnmarshalFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UnmarshalFn").finish()
    }
}

/// 按媒体类型分发的反序列化器注册表
///
/// 默认注册 JSON 与 XML 编解码器；
/// 查找失败时尝试后缀泛化，例如
/// `application/vnd.api+json` 回退到 `application/json`
#[derive(Debug, Clone)]
pub struct ContentTypeUnmarshaler {
    unmarshalers: HashMap<String, Arc<dyn Unmarshaler>>,
}

impl ContentTypeUnmarshaler {
    /// 创建预注册 JSON 与 XML 的反序列化器注册表
    pub fn new() -> Self {
        let json: Arc<dyn Unmarshaler> = Arc::new(JsonMarshaler::default());
        let xml: Arc<dyn Unmarshaler> = Arc::new(XmlMarshaler::default());
        let mut unmarshalers = HashMap::new();
        unmarshalers.insert(CONTENT_TYPE_JSON.to_owned(), json.to_owned());
        unmarshalers.insert(CONTENT_TYPE_JSON_UTF8.to_owned(), json);
        unmarshalers.insert(CONTENT_TYPE_XML.to_owned(), xml.to_owned());
        unmarshalers.insert(CONTENT_TYPE_XML_UTF8.to_owned(), xml);
        Self { unmarshalers }
    }

    /// 注册媒体类型对应的反序列化器
    pub fn register(&mut self, media_type: impl Into<String>, unmarshaler: impl Unmarshaler + 'static) -> &mut Self {
        self.unmarshalers.insert(media_type.into(), Arc::new(unmarshaler));
        self
    }

    fn lookup(&self, media_type: &str) -> Option<&Arc<dyn Unmarshaler>> {
        self.unmarshalers.get(media_type)
    }
}

impl Default for ContentTypeUnmarshaler {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Unmarshaler for ContentTypeUnmarshaler {
    fn unmarshal(&self, data: &[u8], content_type: &str, target: &mut DecodeTarget<'_>) -> ApiResult<()> {
        let mime: Mime = content_type.parse().map_err(|err| {
            Error::new_with_msg(
                ErrorKind::Config,
                format!("invalid media type {:?}: {}", content_type, err),
            )
        })?;
        let media_type = mime.essence_str();

        if let Some(unmarshaler) = self.lookup(media_type) {
            return unmarshaler.unmarshal(data, content_type, target);
        }

        if let Some(general) = general_media_type(&mime) {
            if let Some(unmarshaler) = self.lookup(&general) {
                return unmarshaler.unmarshal(data, content_type, target);
            }
        }

        Err(Error::new_with_msg(
            ErrorKind::UnsupportedContentType,
            format!("unsupported content type: {}", content_type),
        ))
    }
}

/// 计算媒体类型的后缀泛化形式
///
/// `application/vnd.api+json` 泛化为 `application/json`，
/// 没有后缀的媒体类型没有泛化形式
fn general_media_type(mime: &Mime) -> Option<String> {
    mime.suffix()
        .map(|suffix| format!("{}/{}", mime.type_(), suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct FakeModel {
        text: String,
        favorite_count: u32,
    }

    fn fake_model() -> FakeModel {
        FakeModel {
            text: "note".to_owned(),
            favorite_count: 12,
        }
    }

    #[test]
    fn test_json_marshal() {
        let (data, content_type) = JsonMarshaler::default().marshal(&fake_model()).unwrap();
        assert_eq!(data, br#"{"text":"note","favorite_count":12}"#);
        assert_eq!(data.len(), 35);
        assert_eq!(content_type, CONTENT_TYPE_JSON_UTF8);

        let (data, _) = JsonMarshaler { indent: true }.marshal(&fake_model()).unwrap();
        let text = String::from_utf8(data).unwrap();
        assert!(text.contains("\n  \"text\": \"note\""));
    }

    #[test]
    fn test_json_unmarshal() {
        let model: FakeModel = decode_with(|target| {
            JsonMarshaler::default().unmarshal(
                br#"{"text":"note","favorite_count":12}"#,
                CONTENT_TYPE_JSON,
                target,
            )
        })
        .unwrap();
        assert_eq!(model, fake_model());
    }

    #[test]
    fn test_xml_roundtrip() {
        let (data, content_type) = XmlMarshaler::default().marshal(&fake_model()).unwrap();
        let text = String::from_utf8(data.to_owned()).unwrap();
        assert!(text.starts_with("<FakeModel>"));
        assert!(text.contains("<text>note</text>"));
        assert_eq!(content_type, CONTENT_TYPE_XML_UTF8);

        let model: FakeModel =
            decode_with(|target| XmlMarshaler::default().unmarshal(&data, CONTENT_TYPE_XML, target)).unwrap();
        assert_eq!(model, fake_model());
    }

    #[test]
    fn test_form_marshal_shapes() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert("color".to_owned(), "red".to_owned());
        map.insert("count".to_owned(), "30".to_owned());
        let (data, content_type) = FormMarshaler.marshal(&map).unwrap();
        assert_eq!(data, b"color=red&count=30");
        assert_eq!(content_type, CONTENT_TYPE_FORM);

        let mut multi = HashMap::new();
        multi.insert("color".to_owned(), vec!["red".to_owned(), "green".to_owned()]);
        let (data, _) = FormMarshaler.marshal(&multi).unwrap();
        assert_eq!(data, b"color=red&color=green");

        #[derive(Serialize)]
        struct Form {
            color: String,
            count: u32,
        }
        let (data, _) = FormMarshaler
            .marshal(&Form {
                color: "red".to_owned(),
                count: 30,
            })
            .unwrap();
        assert_eq!(data, b"color=red&count=30");

        let err = FormMarshaler.marshal(&"bare string").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Marshal);
    }

    #[test]
    fn test_content_type_dispatch() {
        let registry = ContentTypeUnmarshaler::new();
        let model: FakeModel = decode_with(|target| {
            registry.unmarshal(
                br#"{"text":"note","favorite_count":12}"#,
                "application/json; charset=utf-8",
                target,
            )
        })
        .unwrap();
        assert_eq!(model, fake_model());
    }

    #[test]
    fn test_content_type_suffix_generalization() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Fixture {
            color: String,
            count: u32,
        }

        let registry = ContentTypeUnmarshaler::new();
        let fixture: Fixture = decode_with(|target| {
            registry.unmarshal(
                br#"{"color":"red","count":30}"#,
                "application/vnd.api+json",
                target,
            )
        })
        .unwrap();
        assert_eq!(
            fixture,
            Fixture {
                color: "red".to_owned(),
                count: 30
            }
        );
    }

    #[test]
    fn test_content_type_errors() {
        let registry = ContentTypeUnmarshaler::new();

        let err = decode_with::<FakeModel>(|target| registry.unmarshal(b"{}", "application/msgpack", target))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedContentType);
        assert!(err.to_string().contains("application/msgpack"));

        let err = decode_with::<FakeModel>(|target| registry.unmarshal(b"{}", "not a media type", target))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = ContentTypeUnmarshaler::new();
        registry.register(
            "text/plain",
            UnmarshalFn::new(|data, _content_type, target| {
                let quoted = format!("{:?}", String::from_utf8_lossy(data));
                let mut deserializer = serde_json::Deserializer::from_str(&quoted);
                let mut erased = <dyn erased_serde::Deserializer>::erase(&mut deserializer);
                target.deserialize(&mut erased)
            }),
        );
        let text: String =
            decode_with(|target| registry.unmarshal(b"hello", "text/plain", target)).unwrap();
        assert_eq!(text, "hello");
    }
}
