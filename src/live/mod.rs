pub mod poller;
pub mod scheduler;

pub use poller::LivePoller;
pub use scheduler::{PollScheduler, RankNotifier};
