pub mod backends;
pub mod bridge;
pub mod hosts;
