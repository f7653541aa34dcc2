use super::{
    body::ErasedValue,
    error::{ApiResult, Error, ErrorKind},
};
use serde_json::Value as JsonValue;
use std::{
    collections::{BTreeMap, HashMap},
    fmt::{self, Debug},
    sync::Arc,
};
use url::form_urlencoded;

/// 查询参数输入
///
/// 统一表达可作为查询参数的几种形态：
/// 键值对列表、映射、多值映射，以及任意可序列化值
#[derive(Clone)]
pub struct QueryInput(QueryInputInner);

#[derive(Clone)]
enum QueryInputInner {
    Pairs(Vec<(String, String)>),
    Map(HashMap<String, String>),
    MultiMap(HashMap<String, Vec<String>>),
    Custom(ErasedValue),
}

impl QueryInput {
    /// 通过任意可序列化值创建查询参数输入
    ///
    /// 值先被编码为 JSON 对象，再逐键展开成查询参数，
    /// 数组字段展开为同名的多个参数
    #[inline]
    pub fn from_value(value: impl serde::Serialize + Send + Sync + 'static) -> Self {
        Self(QueryInputInner::Custom(Arc::new(value)))
    }

    /// 展开为键值对列表
    ///
    /// 映射形态按键排序输出，键值对列表保持调用方给定的顺序
    pub fn into_pairs(self) -> ApiResult<Vec<(String, String)>> {
        match self.0 {
            QueryInputInner::Pairs(pairs) => Ok(pairs),
            QueryInputInner::Map(map) => Ok(map
                .into_iter()
                .collect::<BTreeMap<_, _>>()
                .into_iter()
                .collect()),
            QueryInputInner::MultiMap(map) => {
                let mut pairs = Vec::new();
                for (key, values) in map.into_iter().collect::<BTreeMap<_, _>>() {
                    for value in values {
                        pairs.push((key.to_owned(), value));
                    }
                }
                Ok(pairs)
            }
            QueryInputInner::Custom(value) => value_pairs(value.as_ref()),
        }
    }
}

impl Debug for QueryInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            QueryInputInner::Pairs(pairs) => f.debug_tuple("Pairs").field(pairs).finish(),
            QueryInputInner::Map(map) => f.debug_tuple("Map").field(map).finish(),
            QueryInputInner::MultiMap(map) => f.debug_tuple("MultiMap").field(map).finish(),
            QueryInputInner::Custom(_) => f.debug_tuple("Custom").finish(),
        }
    }
}

impl From<Vec<(String, String)>> for QueryInput {
    #[inline]
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self(QueryInputInner::Pairs(pairs))
    }
}

fn owned_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

impl<'p, 'a> From<&'p [(&'a str, &'a str)]> for QueryInput {
    #[inline]
    fn from(pairs: &'p [(&'a str, &'a str)]) -> Self {
        Self(QueryInputInner::Pairs(owned_pairs(pairs)))
    }
}

impl<'a, const N: usize> From<[(&'a str, &'a str); N]> for QueryInput {
    #[inline]
    fn from(pairs: [(&'a str, &'a str); N]) -> Self {
        Self(QueryInputInner::Pairs(owned_pairs(&pairs)))
    }
}

impl From<HashMap<String, String>> for QueryInput {
    #[inline]
    fn from(map: HashMap<String, String>) -> Self {
        Self(QueryInputInner::Map(map))
    }
}

impl From<HashMap<String, Vec<String>>> for QueryInput {
    #[inline]
    fn from(map: HashMap<String, Vec<String>>) -> Self {
        Self(QueryInputInner::MultiMap(map))
    }
}

/// 将可序列化值展开为查询参数键值对
///
/// 对象的键按 JSON 对象的迭代顺序（字典序）输出，
/// 数组字段展开为同名的多个键值对，空值字段被跳过
pub(super) fn value_pairs(value: &(dyn erased_serde::Serialize + Send + Sync)) -> ApiResult<Vec<(String, String)>> {
    let json = serde_json::to_value(value)
        .map_err(|err| Error::new(ErrorKind::Config, err))?;
    let object = match json {
        JsonValue::Object(object) => object,
        JsonValue::Null => return Ok(Vec::new()),
        other => {
            return Err(Error::new_with_msg(
                ErrorKind::Config,
                format!("cannot encode {} as query parameters", json_type_name(&other)),
            ))
        }
    };

    let mut pairs = Vec::new();
    for (key, value) in object {
        match value {
            JsonValue::Null => {}
            JsonValue::Array(items) => {
                for item in items {
                    pairs.push((key.to_owned(), scalar_string(&key, item)?));
                }
            }
            other => pairs.push((key.to_owned(), scalar_string(&key, other)?)),
        }
    }
    Ok(pairs)
}

fn scalar_string(key: &str, value: JsonValue) -> ApiResult<String> {
    match value {
        JsonValue::String(text) => Ok(text),
        JsonValue::Number(number) => Ok(number.to_string()),
        JsonValue::Bool(flag) => Ok(flag.to_string()),
        other => Err(Error::new_with_msg(
            ErrorKind::Config,
            format!(
                "cannot encode nested {} under query parameter {:?}",
                json_type_name(&other),
                key
            ),
        )),
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// 将键值对编码为查询字符串
pub(super) fn encode_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}
