pub mod banner;
pub mod header;
pub mod utils;

pub use banner::{draw_notices, draw_offline_banner};
pub use header::draw_header;
