pub mod agent;
pub mod preview;
pub mod verify;
