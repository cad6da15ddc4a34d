//! Minimal HTTP stub server for exercising the REST clients

use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A request as the stub saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path plus query string
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

#[derive(Clone)]
struct Route {
    path_suffix: String,
    status: u16,
    body: String,
}

/// Serves canned responses keyed by path suffix; unmatched paths get 404
#[derive(Default)]
pub struct StubServerBuilder {
    routes: Vec<Route>,
}

impl StubServerBuilder {
    pub fn route(mut self, path_suffix: &str, status: u16, body: impl Into<String>) -> Self {
        self.routes.push(Route {
            path_suffix: path_suffix.to_string(),
            status,
            body: body.into(),
        });
        self
    }

    pub async fn start(self) -> StubServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let routes = self.routes;
        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let Some(request) = read_request(&mut stream).await else {
                    continue;
                };

                let route = routes
                    .iter()
                    .find(|r| request.path().ends_with(&r.path_suffix))
                    .cloned()
                    .unwrap_or(Route {
                        path_suffix: String::new(),
                        status: 404,
                        body: r#"{"error":"not found"}"#.to_string(),
                    });

                recorded.lock().unwrap().push(request);
                let _ = write_response(&mut stream, route.status, &route.body).await;
            }
        });

        StubServer { url, requests }
    }
}

pub struct StubServer {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub fn builder() -> StubServerBuilder {
        StubServerBuilder::default()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path_suffix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path().ends_with(path_suffix))
            .collect()
    }
}

/// Base URL on which nothing is listening
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

async fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length: usize = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body_end = buf.len().min(header_end + content_length);
    let body = String::from_utf8_lossy(&buf[header_end..body_end]).to_string();

    Some(RecordedRequest {
        method,
        target,
        headers,
        body,
    })
}

async fn write_response(stream: &mut TcpStream, status: u16, body: &str) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// Two KRW-BTC hourly candles, newest first, as Upbit serves them
pub fn upbit_candles_json() -> String {
    serde_json::json!([
        {
            "market": "KRW-BTC",
            "candle_date_time_utc": "2024-01-01T01:00:00",
            "candle_date_time_kst": "2024-01-01T10:00:00",
            "opening_price": 58000000.0,
            "high_price": 58200000.0,
            "low_price": 57900000.0,
            "trade_price": 58050000.0,
            "timestamp": 1704074399000u64,
            "candle_acc_trade_price": 1.0e10,
            "candle_acc_trade_volume": 172.5,
            "unit": 60
        },
        {
            "market": "KRW-BTC",
            "candle_date_time_utc": "2024-01-01T00:00:00",
            "candle_date_time_kst": "2024-01-01T09:00:00",
            "opening_price": 57500000.0,
            "high_price": 58100000.0,
            "low_price": 57400000.0,
            "trade_price": 58000000.0,
            "timestamp": 1704070799000u64,
            "candle_acc_trade_price": 9.0e9,
            "candle_acc_trade_volume": 155.25,
            "unit": 60
        }
    ])
    .to_string()
}
