// =============================================================================
// HTTP/WebSocket API — sync endpoints and live subscriber endpoints
// =============================================================================

pub mod rest;
pub mod ws;
