//! Live portal interaction: layout, driver, and the run session.

pub mod driver;
pub mod portal;
pub mod session;
