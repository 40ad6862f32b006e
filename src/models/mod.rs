pub mod driver;
pub mod review;
pub mod trip;
pub mod user;
