//! Shared response envelope for API handlers.
//!
//! Every JSON body is wrapped as `{ "data": ... }`. Use [`DataResponse`]
//! instead of ad-hoc `serde_json::json!` so payloads stay typed.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
///
/// ```ignore
/// Ok(Json(DataResponse { data: summaries }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
