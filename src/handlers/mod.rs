mod health;
mod signed_url;
mod upload;

pub use health::{health_check, metrics_exposition};
pub use signed_url::create_signed_url;
pub use upload::upload_image;
