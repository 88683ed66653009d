use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct Request {
    pub jsonrpc: String,
    pub id: i32,
    pub method: String,
    pub params: serde_json::Value,
}

impl Request {
    pub fn new(id: i32, method: String, params: serde_json::Value) -> Self {
        Request {
            jsonrpc: "2.0".to_string(),
            id,
            method,
            params,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ResponseMessage {
    pub jsonrpc: String,
    pub id: i32,
    pub result: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ResponseError {
    pub jsonrpc: String,
    pub id: i32,
    pub error: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

impl Notification {
    pub fn new(method: String, params: serde_json::Value) -> Self {
        Notification {
            jsonrpc: "2.0".to_string(),
            method,
            params,
        }
    }
}

/// Incoming message, as classified by `message_parser`.
#[derive(Debug)]
pub enum Message {
    Response(ResponseMessage),
    Error(ResponseError),
    Notification(Notification),
}

/// Outgoing message.
#[derive(Debug)]
pub enum SendMessage {
    Request(Request),
    Notification(Notification),
}

impl SendMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            SendMessage::Request(request) => serde_json::to_string(request),
            SendMessage::Notification(notification) => serde_json::to_string(notification),
        }
    }
}

/// Hands out monotonically increasing request ids.
pub struct MessageFactory {
    id: i32,
}

impl MessageFactory {
    pub fn new() -> Self {
        MessageFactory { id: 0 }
    }

    fn next_id(&mut self) -> i32 {
        self.id += 1;
        self.id
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> Request {
        Request::new(self.next_id(), method.to_string(), params)
    }
}

impl Default for MessageFactory {
    fn default() -> Self {
        Self::new()
    }
}
