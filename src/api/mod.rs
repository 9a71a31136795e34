pub mod live;
pub mod middleware;
pub mod response;
pub mod routes;

// Re-export public types and functions
pub use live::{
    LiveStream, StartLiveRequest, get_live, list_live, serve_hls, start_live,
    start_stream_setting, stop_live, stop_stream_setting,
};
pub use middleware::log_request_errors;
pub use response::ApiResponse;
pub use routes::{
    ValidateRequest, ValidateResponse, create_overlay, create_stream, delete_overlay,
    delete_stream, get_overlay, get_stream, list_overlays, list_streams, probe_stream,
    update_overlay, update_stream, validate_stream,
};
