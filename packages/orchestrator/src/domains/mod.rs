// Business domains
pub mod automation;
pub mod clients;
