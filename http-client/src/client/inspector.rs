use super::{
    middleware::{buffer_request_body, buffer_response_body, Executor, ExecutorFunc, Middleware},
    requester::Requester,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use sling_http::{HeaderMap, Request, RequestParts, ResponseParts, StatusCode};
use std::{
    fmt::{self, Debug},
    sync::{Arc, Mutex},
};

const DEFAULT_EXCHANGE_CAPACITY: usize = 50;

pub(super) fn snapshot_request_parts(parts: &RequestParts) -> RequestParts {
    let mut builder = RequestParts::builder();
    builder
        .method(parts.method().to_owned())
        .url(parts.url().to_owned())
        .headers(parts.headers().to_owned())
        .trailers(parts.trailers().to_owned())
        .transfer_encoding(parts.transfer_encoding().to_vec())
        .close(parts.close())
        .context(parts.context().to_owned());
    if let Some(content_length) = parts.content_length() {
        builder.content_length(content_length);
    }
    if let Some(host) = parts.host() {
        builder.host(host);
    }
    builder.build()
}

fn snapshot_response_parts(parts: &ResponseParts) -> ResponseParts {
    let mut snapshot = ResponseParts::default();
    *snapshot.status_code_mut() = parts.status_code();
    *snapshot.headers_mut() = parts.headers().to_owned();
    *snapshot.version_mut() = parts.version();
    snapshot
}

/// 捕获最近一次请求 / 响应的中间件
///
/// 请求体与响应体被完整读出后换成等价的缓冲数据流；
/// 多次请求时后写的覆盖先写的，不支持并发请求共用一个实例
#[derive(Clone, Default)]
pub struct Inspector {
    inner: Arc<Mutex<InspectorState>>,
}

#[derive(Debug, Default)]
struct InspectorState {
    request: Option<RequestParts>,
    request_body: Option<Vec<u8>>,
    response: Option<ResponseParts>,
    response_body: Option<Vec<u8>>,
}

impl Inspector {
    /// 创建请求捕获中间件
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }

    /// 把捕获中间件安装到请求模板上并返回捕获句柄
    pub fn install(requester: &mut Requester) -> Self {
        let inspector = Self::new();
        requester.must_apply(&[super::options::with_middleware(inspector.to_owned())]);
        inspector
    }

    fn state(&self) -> std::sync::MutexGuard<'_, InspectorState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 获取最近一次发出的请求信息
    pub fn last_request(&self) -> Option<RequestParts> {
        self.state().request.as_ref().map(snapshot_request_parts)
    }

    /// 获取最近一次发出的请求体
    pub fn last_request_body(&self) -> Option<Vec<u8>> {
        self.state().request_body.to_owned()
    }

    /// 获取最近一次收到的响应信息
    pub fn last_response(&self) -> Option<ResponseParts> {
        self.state().response.as_ref().map(snapshot_response_parts)
    }

    /// 获取最近一次收到的响应体
    pub fn last_response_body(&self) -> Option<Vec<u8>> {
        self.state().response_body.to_owned()
    }

    /// 清空捕获到的内容
    pub fn clear(&self) {
        let mut state = self.state();
        state.request = None;
        state.request_body = None;
        state.response = None;
        state.response_body = None;
    }
}

impl Middleware for Inspector {
    fn wrap(&self, next: Arc<dyn Executor>) -> Arc<dyn Executor> {
        let inspector = self.to_owned();
        Arc::new(ExecutorFunc::new(move |request: &mut Request| {
            let request_body = buffer_request_body(request)?;
            {
                let mut state = inspector.state();
                state.request = Some(snapshot_request_parts(request.parts()));
                state.request_body = Some(request_body);
                state.response = None;
                state.response_body = None;
            }

            let (response, response_body) = buffer_response_body(next.execute(request)?)?;
            {
                let mut state = inspector.state();
                state.response = Some(snapshot_response_parts(response.parts()));
                state.response_body = Some(response_body);
            }
            Ok(response)
        }))
    }
}

impl Debug for Inspector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inspector").finish()
    }
}

/// 一次请求 / 响应交换的快照
#[derive(Debug)]
pub struct Exchange {
    /// 发出的请求信息
    pub request: RequestParts,
    /// 发出的请求体
    pub request_body: Vec<u8>,
    /// 响应状态码
    pub status_code: StatusCode,
    /// 响应 Header
    pub headers: HeaderMap,
    /// 响应体
    pub response_body: Vec<u8>,
}

/// 把每次交换记录进有界通道的中间件
///
/// 通道写满后丢弃新的交换而不是阻塞请求
#[derive(Clone)]
pub struct ExchangeInspector {
    tx: Sender<Exchange>,
    rx: Receiver<Exchange>,
}

impl ExchangeInspector {
    /// 创建交换记录中间件，容量为零时取默认值 50
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_EXCHANGE_CAPACITY
        } else {
            capacity
        };
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// 取出最早的一次交换，没有就绪的交换时返回 `None`
    pub fn next_exchange(&self) -> Option<Exchange> {
        self.rx.try_recv().ok()
    }

    /// 取出最近的一次交换，同时清空更早的交换
    pub fn last_exchange(&self) -> Option<Exchange> {
        let mut last = None;
        while let Ok(exchange) = self.rx.try_recv() {
            last = Some(exchange);
        }
        last
    }

    /// 取出所有已记录的交换
    pub fn drain(&self) -> Vec<Exchange> {
        let mut exchanges = Vec::new();
        while let Ok(exchange) = self.rx.try_recv() {
            exchanges.push(exchange);
        }
        exchanges
    }

    /// 清空已记录的交换
    pub fn clear(&self) {
        self.last_exchange();
    }
}

impl Default for ExchangeInspector {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_EXCHANGE_CAPACITY)
    }
}

impl Middleware for ExchangeInspector {
    fn wrap(&self, next: Arc<dyn Executor>) -> Arc<dyn Executor> {
        let recorder = self.to_owned();
        Arc::new(ExecutorFunc::new(move |request: &mut Request| {
            let request_body = buffer_request_body(request)?;
            let request_parts = snapshot_request_parts(request.parts());

            let (response, response_body) = buffer_response_body(next.execute(request)?)?;

            let exchange = Exchange {
                request: request_parts,
                request_body,
                status_code: response.status_code(),
                headers: response.headers().to_owned(),
                response_body,
            };
            // 通道写满时丢弃，保证请求继续推进
            let _ = recorder.tx.try_send(exchange);
            Ok(response)
        }))
    }
}

impl Debug for ExchangeInspector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeInspector")
            .field("buffered", &self.rx.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        super::{
            mocks::mock_executor,
            options::{body_text, header, post, with_executor},
        },
        *,
    };
    use std::error::Error as StdError;

    #[test]
    fn test_inspector_captures_last_exchange() -> Result<(), Box<dyn StdError>> {
        let mut requester = Requester::default().must_with(&[
            post("http://test.example.com/messages"),
            header("X-Color", "red"),
            body_text("ping"),
            with_executor(mock_executor(201, &[body_text("pong")])),
        ]);
        let inspector = Inspector::install(&mut requester);

        requester.send(&[])?;

        let request = inspector.last_request().unwrap();
        assert_eq!(request.method().as_str(), "POST");
        assert_eq!(request.headers().get("X-Color").unwrap(), "red");
        assert_eq!(inspector.last_request_body().unwrap(), b"ping");

        let response = inspector.last_response().unwrap();
        assert_eq!(response.status_code().as_u16(), 201);
        assert_eq!(inspector.last_response_body().unwrap(), b"pong");

        inspector.clear();
        assert!(inspector.last_request().is_none());
        assert!(inspector.last_response_body().is_none());
        Ok(())
    }

    #[test]
    fn test_exchange_inspector_records_in_order() -> Result<(), Box<dyn StdError>> {
        let recorder = ExchangeInspector::new(0);
        let requester = Requester::default().must_with(&[
            post("http://test.example.com/messages"),
            with_executor(mock_executor(200, &[body_text("reply")])),
            super::super::options::with_middleware(recorder.to_owned()),
        ]);

        requester.send(&[body_text("first")])?;
        requester.send(&[body_text("second")])?;

        let first = recorder.next_exchange().unwrap();
        assert_eq!(first.request_body, b"first");
        assert_eq!(first.status_code.as_u16(), 200);
        assert_eq!(first.response_body, b"reply");

        let second = recorder.next_exchange().unwrap();
        assert_eq!(second.request_body, b"second");
        assert!(recorder.next_exchange().is_none());
        Ok(())
    }

    #[test]
    fn test_exchange_inspector_last_and_drain() -> Result<(), Box<dyn StdError>> {
        let recorder = ExchangeInspector::new(10);
        let requester = Requester::default().must_with(&[
            post("http://test.example.com/messages"),
            with_executor(mock_executor(200, &[])),
            super::super::options::with_middleware(recorder.to_owned()),
        ]);

        for body in ["a", "b", "c"] {
            requester.send(&[body_text(body)])?;
        }
        let last = recorder.last_exchange().unwrap();
        assert_eq!(last.request_body, b"c");
        assert!(recorder.last_exchange().is_none());

        for body in ["d", "e"] {
            requester.send(&[body_text(body)])?;
        }
        let drained = recorder.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].request_body, b"d");
        assert_eq!(drained[1].request_body, b"e");
        Ok(())
    }

    #[test]
    fn test_exchange_inspector_drops_when_full() -> Result<(), Box<dyn StdError>> {
        let recorder = ExchangeInspector::new(2);
        let requester = Requester::default().must_with(&[
            post("http://test.example.com/messages"),
            with_executor(mock_executor(200, &[])),
            super::super::options::with_middleware(recorder.to_owned()),
        ]);

        for body in ["a", "b", "c", "d"] {
            requester.send(&[body_text(body)])?;
        }
        let drained = recorder.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].request_body, b"a");
        assert_eq!(drained[1].request_body, b"b");
        Ok(())
    }
}
