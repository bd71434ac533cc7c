//! 核心：错误分类与优雅关闭

pub mod error;
pub mod shutdown;

pub use error::HiveError;
pub use shutdown::{ShutdownManager, ShutdownReason};
