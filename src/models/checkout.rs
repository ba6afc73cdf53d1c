use serde::{Deserialize, Serialize};

/// Realtime event joining the kiosk's room
pub const JOIN_EVENT: &str = "join";
/// Realtime event asking the register side to start payment
pub const EXECUTION_EVENT: &str = "request_python_execution";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinRoom {
    pub room: String,
}

/// Payload of the checkout-started event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRequest {
    pub uuid: String,
    pub jan_codes: Vec<String>,
}

/// One corrected box in the audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggedBox {
    pub label: String,
    pub xyxy: [f64; 4],
}

/// Body of `POST /logging`: the photo plus the staff-corrected boxes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingRecord {
    pub image: String,
    pub items: Vec<LoggedBox>,
}

/// `{success}` answer of the admin endpoints
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SuccessResponse {
    pub success: bool,
}
