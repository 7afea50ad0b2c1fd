//! Autonomous agent operations — task neutralization, its rate limiter,
//! and summary-grounded chat.

pub mod chat;
pub mod neutralizer;
pub mod quota;

pub use chat::MeetingChat;
pub use neutralizer::Neutralizer;
pub use quota::RateLimiter;
