pub mod guess_engine;
pub mod price_poller;
pub mod resolver;
pub mod session;

pub use guess_engine::GuessEngine;
pub use price_poller::PricePoller;
pub use resolver::{Backoff, ResolutionNotice, ResolutionScheduler};
pub use session::{ApiResponse, Price, SessionService};
