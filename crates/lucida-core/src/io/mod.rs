pub mod preview;
pub mod volume_io;
