pub mod dispatch;
pub mod lifecycle;
pub mod pricing;
pub mod rating;
