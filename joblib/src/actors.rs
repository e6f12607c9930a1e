pub mod coordinator;
pub mod tailer;
