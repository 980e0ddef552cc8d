//! RoomWatch daemon library - exposes modules for testing.

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod dispatcher;
pub mod frame_buffer;
pub mod hardware;
pub mod monitor;
pub mod status;
pub mod storage;
