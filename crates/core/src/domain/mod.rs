pub mod report;
pub mod resource;
