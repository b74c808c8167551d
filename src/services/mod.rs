pub mod analytics;
pub mod audit;
pub mod dates;
pub mod payments;
pub mod pricing;
