mod handlers;
mod router;

pub use handlers::ErrorResponse;
pub use router::create_router;
