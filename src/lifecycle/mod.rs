//! 远端资源生命周期：create-or-reuse、状态轮询、有界重试、按名称串行化与尽力删除

pub mod locks;
pub mod manager;
pub mod poll;
pub mod report;
pub mod retry;

pub use locks::NameLocks;
pub use manager::{LifecycleConfig, LifecycleManager, Provisioned};
pub use poll::Poller;
pub use report::{StepOutcome, TeardownReport, TeardownStep};
pub use retry::{retry_remote, RetryError, RetryPolicy};
