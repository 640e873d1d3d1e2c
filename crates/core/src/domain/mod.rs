pub mod event;
pub mod message;
pub mod outcome;
