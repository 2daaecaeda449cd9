pub mod status;

pub use status::{status_router, StatusResponse, StatusServer, StatusState};
