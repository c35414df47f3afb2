pub mod partitions;
pub mod status;

pub use partitions::draw_partitions;
pub use status::draw_status;
