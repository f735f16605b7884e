pub mod compute;
pub mod consts;
pub mod deconv;
pub mod error;
pub mod io;
pub mod psf;
pub mod transform;
pub mod volume;
